//! Media metadata probing capability.
//!
//! The production implementation shells out to `ffprobe` and reads its JSON
//! report. Building the metadata structs from that JSON is split into pure
//! functions so the mapping is testable without the binary installed.

use super::{AudioMetadata, ImageMetadata, MediaMetadata, ParseError, VideoMetadata};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Probes media files for stream metadata.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe_image(&self, path: &Path) -> Result<ImageMetadata, ParseError>;
    async fn probe_media(&self, path: &Path) -> Result<MediaMetadata, ParseError>;
}

/// `ffprobe`-backed prober.
pub struct FfprobeProber {
    executable: PathBuf,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProber {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    async fn run(&self, path: &Path) -> Result<Value, ParseError> {
        let output = Command::new(&self.executable)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(path)
            .output()
            .await
            .map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(ParseError::Probe {
                path: path.to_path_buf(),
                message: format!("ffprobe exited with {}", output.status),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ParseError::Probe {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe_image(&self, path: &Path) -> Result<ImageMetadata, ParseError> {
        let report = self.run(path).await?;
        Ok(image_from_report(&report))
    }

    async fn probe_media(&self, path: &Path) -> Result<MediaMetadata, ParseError> {
        let report = self.run(path).await?;
        Ok(media_from_report(&report))
    }
}

/// Case-insensitive lookup in a ffprobe `tags` object.
fn tag(value: &Value, key: &str) -> Option<String> {
    let tags = value.get("tags")?.as_object()?;
    tags.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.as_str())
        .map(|v| v.to_string())
}

fn stream_of_type<'a>(report: &'a Value, codec_type: &str) -> Option<&'a Value> {
    report
        .get("streams")?
        .as_array()?
        .iter()
        .find(|stream| stream.get("codec_type").and_then(Value::as_str) == Some(codec_type))
}

fn dimensions_of(stream: &Value) -> Option<String> {
    let width = stream.get("width").and_then(Value::as_i64)?;
    let height = stream.get("height").and_then(Value::as_i64)?;
    Some(format!("{width}x{height}"))
}

fn duration_of(stream: Option<&Value>, report: &Value) -> Option<String> {
    stream
        .and_then(|s| s.get("duration"))
        .or_else(|| report.get("format").and_then(|f| f.get("duration")))
        .and_then(Value::as_str)
        .map(|d| d.to_string())
}

fn format_tag(report: &Value, key: &str) -> Option<String> {
    report.get("format").and_then(|format| tag(format, key))
}

/// Build image metadata from a ffprobe report.
fn image_from_report(report: &Value) -> ImageMetadata {
    let stream = stream_of_type(report, "video")
        .or_else(|| report.get("streams").and_then(|s| s.as_array()).and_then(|s| s.first()));

    let gps_coordinates = format_tag(report, "location")
        .or_else(|| format_tag(report, "com.apple.quicktime.location.ISO6709"))
        .and_then(|raw| parse_iso6709(&raw))
        .map(|(lat, lon, alt)| format_position(lat, lon, alt));

    ImageMetadata {
        dimensions: stream.and_then(dimensions_of),
        camera_model: format_tag(report, "Model")
            .or_else(|| stream.and_then(|s| tag(s, "Model"))),
        date_taken: format_tag(report, "DateTime")
            .or_else(|| format_tag(report, "creation_time")),
        gps_coordinates,
    }
}

/// Build audio/video metadata from a ffprobe report.
fn media_from_report(report: &Value) -> MediaMetadata {
    let video_stream = stream_of_type(report, "video");
    let audio_stream = stream_of_type(report, "audio");

    let video = video_stream.map(|stream| VideoMetadata {
        title: tag(stream, "title").or_else(|| format_tag(report, "title")),
        duration: duration_of(Some(stream), report),
        frame_rate: stream
            .get("r_frame_rate")
            .and_then(Value::as_str)
            .map(|r| r.to_string()),
        dimensions: dimensions_of(stream),
        director: tag(stream, "director").or_else(|| format_tag(report, "director")),
    });

    let audio = audio_stream.map(|stream| AudioMetadata {
        title: tag(stream, "title").or_else(|| format_tag(report, "title")),
        album: tag(stream, "album").or_else(|| format_tag(report, "album")),
        artist: tag(stream, "artist").or_else(|| format_tag(report, "artist")),
        genre: tag(stream, "genre").or_else(|| format_tag(report, "genre")),
        duration: duration_of(Some(stream), report),
    });

    MediaMetadata { video, audio }
}

/// Parse an ISO 6709 position string like `+40.7128-074.0060+013.0/` into
/// latitude, longitude and optional altitude.
fn parse_iso6709(raw: &str) -> Option<(f64, f64, Option<f64>)> {
    let trimmed = raw.trim().trim_end_matches('/');
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for (i, ch) in trimmed.chars().enumerate() {
        if (ch == '+' || ch == '-') && i != 0 && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.len() < 2 {
        return None;
    }

    let latitude: f64 = parts[0].parse().ok()?;
    let longitude: f64 = parts[1].parse().ok()?;
    let altitude = parts.get(2).and_then(|p| p.parse().ok());
    Some((latitude, longitude, altitude))
}

fn format_position(latitude: f64, longitude: f64, altitude: Option<f64>) -> String {
    match altitude {
        Some(altitude) => {
            format!("Latitude: {latitude}, Longitude: {longitude}, Altitude: {altitude}m")
        }
        None => format!("Latitude: {latitude}, Longitude: {longitude}"),
    }
}
