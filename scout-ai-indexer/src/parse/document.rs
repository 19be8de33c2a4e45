//! Document text extraction capability.

use super::ParseError;
use async_trait::async_trait;
use std::path::Path;

/// Extracts text from binary document formats (PDF and friends).
///
/// Implementations return markdown-ish plain text; the caller decides how to
/// chunk it. A format the extractor cannot handle is reported as
/// [`ParseError::Unsupported`], which the pipeline logs and skips.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ParseError>;
}

/// Production extractor backed by `pdf-extract`.
///
/// Only PDF is handled; the other document extensions stay in the catalog's
/// allowlist but are skipped by the vector store until an extractor for them
/// is wired in.
pub struct PdfExtractor;

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ParseError> {
        let ext = super::extension_of(path);
        if ext.as_deref() != Some("pdf") {
            return Err(ParseError::Unsupported {
                path: path.to_path_buf(),
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // pdf-extract is synchronous and can chew CPU on large files.
        let owned_path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ParseError::Document {
                path: owned_path,
                message: e.to_string(),
            })
        })
        .await??;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_pdf_documents_are_unsupported() {
        let result = PdfExtractor.extract(Path::new("book.epub")).await;
        assert!(matches!(result, Err(ParseError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn missing_pdf_reports_io_error() {
        let result = PdfExtractor.extract(Path::new("/nowhere/missing.pdf")).await;
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }
}
