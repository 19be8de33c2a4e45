//! Content parsing: file path in, [`ParsedContent`] out.
//!
//! Dispatch is purely extension-driven. Each parsable extension belongs to
//! one [`Category`]; the category decides which capability does the work:
//! plain text is read directly, binary documents go through a
//! [`DocumentExtractor`], and media files go through a [`MediaProber`].
//! Anything outside the known categories parses to [`ParsedContent::None`]
//! and is excluded from the vector index by design.
//!
//! A re-parse always produces a fresh value; parsed content is never merged
//! with an earlier result for the same file.

pub mod document;
pub mod probe;

pub use document::{DocumentExtractor, PdfExtractor};
pub use probe::{FfprobeProber, MediaProber};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binary document formats handed to the [`DocumentExtractor`]. Extraction
/// output is markdown-ish text, so these get the markdown splitter.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "xps", "fb2", "epub", "mobi", "xlsx", "pptx"];

/// Textual formats read directly from disk.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "rtf", "html", "htm", "xml", "css", "js", "py", "rs",
    "c", "cpp", "h", "java", "sh", "rb", "pl", "php", "tex", "toml", "yaml", "yml", "json", "log",
    "diff", "sql", "bat", "asm", "tcl", "sgml",
];

/// Image formats probed for EXIF-style metadata.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic", "svg", "ico", "psd", "raw",
    "cr2", "nef", "arw", "dng", "orf",
];

/// Audio formats probed for stream metadata.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "m4a", "aiff", "aif", "wma", "mid", "midi", "ra", "voc",
];

/// Video formats probed for stream metadata.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "mpeg", "mpg", "webm", "flv", "f4v", "m4v", "ts", "asf", "mng",
    "mjpg",
];

/// Which kind of parsing a file extension calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Document,
    Text,
    Image,
    Audio,
    Video,
}

/// Which splitter profile a file's extracted text should go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterKind {
    Markdown,
    Plain,
}

/// Lowercased extension of a path, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Category for a path, or `None` when the extension is not parsable.
pub fn extension_category(path: &Path) -> Option<Category> {
    let ext = extension_of(path)?;
    let ext = ext.as_str();
    if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(Category::Document)
    } else if TEXT_EXTENSIONS.contains(&ext) {
        Some(Category::Text)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(Category::Image)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(Category::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(Category::Video)
    } else {
        None
    }
}

/// Every extension the pipeline considers indexable. The file catalog
/// restricts its snapshots to this set.
pub fn parsable_extensions() -> impl Iterator<Item = &'static str> {
    DOCUMENT_EXTENSIONS
        .iter()
        .chain(TEXT_EXTENSIONS)
        .chain(IMAGE_EXTENSIONS)
        .chain(AUDIO_EXTENSIONS)
        .chain(VIDEO_EXTENSIONS)
        .copied()
}

/// Splitter profile for a path. Document formats extract to markdown, and
/// markdown sources stay markdown; everything else is split generically.
pub fn splitter_kind(path: &Path) -> SplitterKind {
    match extension_category(path) {
        Some(Category::Document) => SplitterKind::Markdown,
        _ => match extension_of(path).as_deref() {
            Some("md") | Some("markdown") => SplitterKind::Markdown,
            _ => SplitterKind::Plain,
        },
    }
}

/// Parse failure for a single file. Callers treat these as skip-and-log for
/// the affected file; they never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no extractor for {path}")]
    Unsupported { path: PathBuf },

    #[error("document extraction failed for {path}: {message}")]
    Document { path: PathBuf, message: String },

    #[error("media probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("parse task failed: {source}")]
    Task {
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Metadata extracted from an image file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub dimensions: Option<String>,
    pub camera_model: Option<String>,
    pub date_taken: Option<String>,
    pub gps_coordinates: Option<String>,
}

/// Metadata extracted from a video stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub duration: Option<String>,
    pub frame_rate: Option<String>,
    pub dimensions: Option<String>,
    pub director: Option<String>,
}

/// Metadata extracted from an audio stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub duration: Option<String>,
}

/// Combined media metadata; a file can carry either or both streams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub video: Option<VideoMetadata>,
    pub audio: Option<AudioMetadata>,
}

fn push_field(lines: &mut Vec<String>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            lines.push(format!("{key}: {value}"));
        }
    }
}

impl ImageMetadata {
    /// Render present fields as `key: value` lines.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        push_field(&mut lines, "dimensions", &self.dimensions);
        push_field(&mut lines, "camera_model", &self.camera_model);
        push_field(&mut lines, "date_taken", &self.date_taken);
        push_field(&mut lines, "gps_coordinates", &self.gps_coordinates);
        lines.join("\n")
    }
}

impl VideoMetadata {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        push_field(&mut lines, "title", &self.title);
        push_field(&mut lines, "duration", &self.duration);
        push_field(&mut lines, "frame_rate", &self.frame_rate);
        push_field(&mut lines, "dimensions", &self.dimensions);
        push_field(&mut lines, "director", &self.director);
        lines.join("\n")
    }
}

impl AudioMetadata {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        push_field(&mut lines, "title", &self.title);
        push_field(&mut lines, "album", &self.album);
        push_field(&mut lines, "artist", &self.artist);
        push_field(&mut lines, "genre", &self.genre);
        push_field(&mut lines, "duration", &self.duration);
        lines.join("\n")
    }
}

impl MediaMetadata {
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if let Some(video) = &self.video {
            let rendered = video.render();
            if !rendered.is_empty() {
                sections.push(rendered);
            }
        }
        if let Some(audio) = &self.audio {
            let rendered = audio.render();
            if !rendered.is_empty() {
                sections.push(rendered);
            }
        }
        sections.join("\n")
    }
}

/// What parsing a file produced. Exhaustively matched by every consumer, so
/// no unhandled shape can reach storage code.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    PlainText(String),
    Image(ImageMetadata),
    Media(MediaMetadata),
    None,
}

impl ParsedContent {
    /// Text representation suitable for chunking and embedding, or `None`
    /// when the file contributes nothing to the vector index. Metadata
    /// variants render to `key: value` lines so media files remain findable
    /// by content search.
    pub fn into_document_text(self) -> Option<String> {
        match self {
            ParsedContent::PlainText(text) => Some(text),
            ParsedContent::Image(metadata) => Some(metadata.render()),
            ParsedContent::Media(metadata) => Some(metadata.render()),
            ParsedContent::None => None,
        }
    }
}

/// Extension-driven parser dispatch over the capability interfaces.
#[derive(Clone)]
pub struct ContentParser {
    document: Arc<dyn DocumentExtractor>,
    media: Arc<dyn MediaProber>,
}

impl ContentParser {
    pub fn new(document: Arc<dyn DocumentExtractor>, media: Arc<dyn MediaProber>) -> Self {
        Self { document, media }
    }

    /// Parser wired to the production capabilities: `pdf-extract` for
    /// documents and an `ffprobe` subprocess for media.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(PdfExtractor), Arc::new(FfprobeProber::default()))
    }

    /// Parse a file into its content variant.
    ///
    /// Unknown extensions are not an error: they parse to
    /// [`ParsedContent::None`]. Failures reading or extracting a known
    /// format surface as [`ParseError`].
    pub async fn parse(&self, path: &Path) -> Result<ParsedContent, ParseError> {
        match extension_category(path) {
            Option::None => Ok(ParsedContent::None),
            Some(Category::Text) => {
                let bytes = tokio::fs::read(path).await.map_err(|source| ParseError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(ParsedContent::PlainText(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            }
            Some(Category::Document) => {
                let text = self.document.extract(path).await?;
                Ok(ParsedContent::PlainText(text))
            }
            Some(Category::Image) => {
                let metadata = self.media.probe_image(path).await?;
                Ok(ParsedContent::Image(metadata))
            }
            Some(Category::Audio) | Some(Category::Video) => {
                let metadata = self.media.probe_media(path).await?;
                Ok(ParsedContent::Media(metadata))
            }
        }
    }
}
