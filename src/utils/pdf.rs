//! PDF payload verification and download.
//!
//! A response is accepted as a PDF when its declared content type mentions
//! `pdf`, or, failing that, when the body starts with the `%PDF-` magic
//! bytes. Anything else is rejected before a file is created.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::http::{HttpClient, HttpError};

/// Leading bytes of every PDF document
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Errors that can occur while fetching a PDF
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Server returned status {0}")]
    Status(StatusCode),

    #[error("Failed to read response body: {0}")]
    Body(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a declared content type claims to be a PDF
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("pdf")
}

/// Whether the bytes start with the PDF magic header
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// The response's `Content-Type` header, or an empty string
pub fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Downloads URLs to disk, keeping only genuine PDFs
#[derive(Debug, Clone)]
pub struct PdfDownloader {
    client: Arc<HttpClient>,
}

impl PdfDownloader {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Download `url` to `destination`.
    ///
    /// Returns `false` for rejected content and for any transport failure;
    /// neither is an error from the caller's point of view.
    pub async fn download(&self, url: &str, destination: &Path) -> bool {
        match self.try_download(url, destination).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::info!("PDF download failed from {}: {}", url, e);
                false
            }
        }
    }

    async fn try_download(&self, url: &str, destination: &Path) -> Result<bool, DownloadError> {
        let response = self.client.get(url).await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let saved = save_pdf_response(response, destination).await?;
        if !saved {
            tracing::info!("Rejected non-PDF content from {}", url);
        }
        Ok(saved)
    }
}

/// Stream a response to `destination` if it is a PDF.
///
/// With a PDF content type the body is written unchecked. Otherwise the
/// first bytes are sniffed; on a match they are written ahead of the rest of
/// the stream, on a mismatch nothing is written and `Ok(false)` is returned.
pub async fn save_pdf_response(
    mut response: Response,
    destination: &Path,
) -> Result<bool, DownloadError> {
    let declared = content_type(&response);
    let mut head = Vec::new();

    if !is_pdf_content_type(&declared) {
        while head.len() < PDF_MAGIC.len() {
            match response.chunk().await? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }
        if !has_pdf_magic(&head) {
            tracing::debug!("Content-Type {:?} without PDF magic bytes", declared);
            return Ok(false);
        }
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let written = write_stream(&mut response, &head, destination).await;
    if written.is_err() {
        let _ = tokio::fs::remove_file(destination).await;
    }
    let bytes = written?;

    tracing::debug!("Wrote {} bytes to {}", bytes, destination.display());
    Ok(true)
}

async fn write_stream(
    response: &mut Response,
    head: &[u8],
    destination: &Path,
) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::create(destination).await?;
    let mut bytes = head.len() as u64;
    file.write_all(head).await?;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(bytes)
}
