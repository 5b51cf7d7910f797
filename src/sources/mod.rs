//! Search and PDF acquisition sources.
//!
//! Two kinds of source live here:
//!
//! - [`GoogleScholarSource`] pages through Scholar results for a query.
//! - [`PdfSource`] implementations try to place a verified PDF for a DOI on
//!   disk. The [`FetchWaterfall`] runs them strictly in order and stops at the
//!   first one that succeeds: the open-access resolver ([`UnpaywallSource`])
//!   first, then one [`MirrorSource`] per configured mirror host.
//!
//! New acquisition strategies can be added by implementing [`PdfSource`] and
//! handing them to [`FetchWaterfall::with_sources`].

mod google_scholar;
pub mod mirror;
pub mod mock;
mod registry;
pub mod unpaywall;

pub use google_scholar::{
    extract_authors, extract_doi_candidate, extract_year, is_rate_limited, parse_results,
    GoogleScholarSource,
};
pub use mirror::{extract_pdf_link, MirrorSource};
pub use mock::{MockOutcome, MockSource};
pub use registry::FetchWaterfall;
pub use unpaywall::{candidate_urls, UnpaywallResponse, UnpaywallSource};

use async_trait::async_trait;
use std::path::Path;

use crate::models::SourceTag;
use crate::utils::{DownloadError, Doi, HttpError};

/// A single strategy for obtaining the PDF of a paper.
///
/// # Implementing a New Strategy
///
/// 1. Create a struct that implements `PdfSource`
/// 2. Write the PDF to `destination` only after it has been verified
/// 3. Return an error describing why nothing was written otherwise
/// 4. Add it to the waterfall in the position it should be tried
#[async_trait]
pub trait PdfSource: Send + Sync + std::fmt::Debug {
    /// Unique identifier used in logs (e.g., "unpaywall", "mirror:sci-hub.se")
    fn id(&self) -> &str;

    /// The acquisition stage reported when this strategy succeeds
    fn tag(&self) -> SourceTag;

    /// Try to write a verified PDF for `doi` to `destination`
    async fn attempt(&self, doi: &Doi, destination: &Path) -> Result<(), SourceError>;
}

/// Errors that can occur when a source is queried
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source lacks required configuration
    #[error("Source disabled: {0}")]
    Disabled(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing error (JSON, HTML, etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Nothing usable was found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote side answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<HttpError> for SourceError {
    fn from(err: HttpError) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<DownloadError> for SourceError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Io(e) => SourceError::Io(e),
            DownloadError::Status(status) => SourceError::Api(format!("status {}", status)),
            other => SourceError::Network(other.to_string()),
        }
    }
}
