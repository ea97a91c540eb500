//! Résumé upload → plain text.
//!
//! PDFs go through `pdf-extract` on a blocking thread; anything else must be
//! UTF-8 text. An upload that yields no text is rejected rather than sent to
//! the model empty.

use bytes::Bytes;
use thiserror::Error;
use tracing::info;

/// A résumé file as received from the form.
#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read text from the PDF: {0}")]
    Pdf(String),

    #[error("résumé file is neither a PDF nor UTF-8 text")]
    NotText,

    #[error("résumé contains no readable text")]
    Empty,

    #[error("PDF extraction task failed: {0}")]
    Task(String),
}

impl ResumeUpload {
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
            || self.content_type.as_deref() == Some("application/pdf")
            || self
                .file_name
                .as_deref()
                .is_some_and(|n| n.to_ascii_lowercase().ends_with(".pdf"))
    }
}

/// Extracts the résumé text, trimmed.
pub async fn extract_resume_text(upload: ResumeUpload) -> Result<String, UploadError> {
    let text = if upload.is_pdf() {
        let bytes = upload.bytes.clone();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| UploadError::Task(e.to_string()))?
            .map_err(|e| UploadError::Pdf(format!("{e:?}")))?
    } else {
        String::from_utf8(upload.bytes.to_vec()).map_err(|_| UploadError::NotText)?
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(UploadError::Empty);
    }
    info!(
        "Extracted {} characters of résumé text from {}",
        text.chars().count(),
        upload.file_name.as_deref().unwrap_or("upload")
    );
    Ok(text)
}
