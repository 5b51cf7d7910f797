//! Ordered PDF acquisition waterfall.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{MirrorSource, PdfSource, SourceError, UnpaywallSource};
use crate::config::Config;
use crate::models::FetchOutcome;
use crate::utils::{pdf_filename, Doi, HttpClient};

/// Runs acquisition strategies in priority order until one yields a PDF
///
/// Strategies are attempted one at a time; the first success wins and the
/// remaining ones are never contacted.
#[derive(Debug, Clone)]
pub struct FetchWaterfall {
    sources: Vec<Arc<dyn PdfSource>>,
    download_dir: PathBuf,
}

impl FetchWaterfall {
    /// Create an empty waterfall writing into `download_dir`
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources: Vec::new(),
            download_dir: download_dir.into(),
        }
    }

    /// Create a waterfall from an explicit list of strategies
    pub fn with_sources(
        download_dir: impl Into<PathBuf>,
        sources: Vec<Arc<dyn PdfSource>>,
    ) -> Self {
        Self {
            sources,
            download_dir: download_dir.into(),
        }
    }

    /// The resolver first (when a contact email is configured), then each
    /// mirror host in configured order.
    pub fn from_config(config: &Config, client: Arc<HttpClient>) -> Self {
        let mut waterfall = Self::new(config.downloads.resolved_directory());

        let resolver = UnpaywallSource::new(Arc::clone(&client), &config.resolver);
        if resolver.is_enabled() {
            waterfall.register(Arc::new(resolver));
        } else {
            tracing::warn!("No Unpaywall email configured; skipping the resolver stage");
        }

        for host in config.mirrors.hosts.iter().filter(|h| !h.trim().is_empty()) {
            waterfall.register(Arc::new(MirrorSource::new(Arc::clone(&client), host)));
        }

        waterfall
    }

    /// Append a strategy after the existing ones
    pub fn register(&mut self, source: Arc<dyn PdfSource>) {
        self.sources.push(source);
    }

    /// Registered strategies in attempt order
    pub fn sources(&self) -> &[Arc<dyn PdfSource>] {
        &self.sources
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Normalize `raw_doi` and run the waterfall for it.
    ///
    /// An identifier that fails normalization yields
    /// [`FetchOutcome::InvalidIdentifier`] without any request being made.
    pub async fn fetch(&self, raw_doi: &str, title: &str) -> FetchOutcome {
        match Doi::parse(raw_doi) {
            Some(doi) => self.fetch_doi(&doi, title).await,
            None => {
                tracing::info!("Skipping invalid DOI: {:?}", raw_doi);
                FetchOutcome::InvalidIdentifier
            }
        }
    }

    /// Run the waterfall for an already normalized identifier
    pub async fn fetch_doi(&self, doi: &Doi, title: &str) -> FetchOutcome {
        let destination = self.destination_for(doi, title);

        for source in &self.sources {
            match source.attempt(doi, &destination).await {
                Ok(()) => {
                    tracing::info!("Fetched PDF via {} for DOI {}", source.id(), doi);
                    return FetchOutcome::Fetched {
                        path: destination,
                        source: source.tag(),
                    };
                }
                Err(SourceError::Disabled(reason)) => {
                    tracing::debug!("Skipping {}: {}", source.id(), reason);
                }
                Err(e) => {
                    tracing::info!("{} failed for DOI {}: {}", source.id(), doi, e);
                }
            }
        }

        tracing::info!("All PDF sources failed for DOI {}", doi);
        FetchOutcome::NotFound
    }

    /// Where the PDF for `doi` is written
    pub fn destination_for(&self, doi: &Doi, title: &str) -> PathBuf {
        self.download_dir.join(pdf_filename(title, doi.as_str()))
    }
}
