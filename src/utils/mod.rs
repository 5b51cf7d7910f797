//! Utility modules supporting the acquisition pipeline.
//!
//! - [`Doi`], [`normalize_doi`], [`extract_doi`], [`clean_doi`], [`is_valid_doi`]:
//!   identifier extraction and cleaning
//! - [`HttpClient`]: shared HTTP session with retries on transient failures
//! - [`RetryConfig`]: exponential backoff policy used by the client
//! - [`PdfDownloader`]: content-verified PDF downloads
//! - [`pdf_filename`], [`find_local_pdf`]: deterministic destination names
//! - [`PaperProgress`]: progress bar for a pipeline run
//!
//! # DOI Normalization
//!
//! ```rust
//! use research_harvest::utils::normalize_doi;
//!
//! assert_eq!(
//!     normalize_doi("https://doi.org/10.1234/example&type=pdf").as_deref(),
//!     Some("10.1234/example")
//! );
//! assert_eq!(normalize_doi("not-a-doi"), None);
//! ```

mod doi;
mod filename;
mod http;
mod pdf;
mod progress;
mod retry;

pub use doi::{clean_doi, extract_doi, is_valid_doi, normalize_doi, Doi};
pub use filename::{find_local_pdf, pdf_filename, sanitize_component};
pub use http::{HttpClient, HttpError};
pub use pdf::{
    content_type, has_pdf_magic, is_pdf_content_type, save_pdf_response, DownloadError,
    PdfDownloader, PDF_MAGIC,
};
pub use progress::PaperProgress;
pub use retry::{is_retryable_method, RetryConfig, TransientError};
