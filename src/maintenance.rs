//! Maintenance passes over items already in the reference manager.
//!
//! Each pass lists the stored items once, then works through them in order:
//!
//! - [`LibraryMaintenance::retry_missing_pdfs`] runs the waterfall again for
//!   items that have a DOI but no PDF, and links whatever it fetches.
//! - [`LibraryMaintenance::link_local_pdfs`] links PDFs that are already on
//!   disk under the name the waterfall would have given them.
//! - [`LibraryMaintenance::fix_authors`] re-scrapes the search listing by
//!   title for items whose authors are missing or mangled.
//!
//! Only a failure to list the items aborts a pass; a failure on one item is
//! logged and counted.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{FetchOutcome, LibraryItem, SearchQuery};
use crate::sink::{ReferenceSink, SinkError};
use crate::sources::{FetchWaterfall, GoogleScholarSource};
use crate::utils::{find_local_pdf, Doi, PaperProgress};

/// Pause between waterfall runs of the retry pass
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Counts for one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceSummary {
    pub examined: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for MaintenanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} items examined: {} succeeded, {} skipped, {} failed",
            self.examined, self.succeeded, self.skipped, self.failed
        )
    }
}

/// Maintenance over one collection (or the whole library)
#[derive(Debug, Clone)]
pub struct LibraryMaintenance {
    sink: Arc<dyn ReferenceSink>,
    collection: Option<String>,
    pause: Duration,
}

impl LibraryMaintenance {
    pub fn new(sink: Arc<dyn ReferenceSink>, collection: Option<String>) -> Self {
        Self {
            sink,
            collection,
            pause: DEFAULT_RETRY_PAUSE,
        }
    }

    /// Set the pause between waterfall runs
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn items(&self) -> Result<Vec<LibraryItem>, SinkError> {
        let items = self.sink.list_items(self.collection.as_deref()).await?;
        tracing::info!("Found {} items in {}", items.len(), self.sink.name());
        Ok(items)
    }

    /// Fetch and link PDFs for items that have a DOI but no PDF
    pub async fn retry_missing_pdfs(
        &self,
        waterfall: &FetchWaterfall,
        progress: &PaperProgress,
    ) -> Result<MaintenanceSummary, SinkError> {
        let items = self.items().await?;
        let mut summary = MaintenanceSummary {
            examined: items.len(),
            ..Default::default()
        };
        progress.set_total(items.len());

        let mut attempted = false;
        for item in &items {
            progress.start(&item.title);
            let doi = match (&item.doi, item.has_pdf) {
                (Some(doi), false) => doi,
                _ => {
                    summary.skipped += 1;
                    progress.advance();
                    continue;
                }
            };

            if attempted && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            attempted = true;

            match waterfall.fetch(doi, &item.title).await {
                FetchOutcome::Fetched { path, .. } => {
                    match self.sink.link_pdf(&item.key, &item.title, &path).await {
                        Ok(()) => {
                            tracing::info!("Linked fetched PDF to item {}", item.key);
                            summary.succeeded += 1;
                        }
                        Err(e) => {
                            tracing::warn!("PDF fetched but linking to {} failed: {}", item.key, e);
                            summary.failed += 1;
                        }
                    }
                }
                FetchOutcome::NotFound | FetchOutcome::InvalidIdentifier => {
                    tracing::info!("No PDF found for item {} ({})", item.key, doi);
                    summary.failed += 1;
                }
            }
            progress.advance();
        }
        progress.finish();

        tracing::info!("Retry: {}", summary);
        Ok(summary)
    }

    /// Link PDFs already in `pdf_dir` to items without one
    pub async fn link_local_pdfs(&self, pdf_dir: &Path) -> Result<MaintenanceSummary, SinkError> {
        let items = self.items().await?;
        let mut summary = MaintenanceSummary {
            examined: items.len(),
            ..Default::default()
        };

        for item in &items {
            let doi = match (&item.doi, item.has_pdf) {
                (Some(doi), false) => doi,
                _ => {
                    summary.skipped += 1;
                    continue;
                }
            };
            let identifier = Doi::parse(doi)
                .map(|doi| doi.as_str().to_string())
                .unwrap_or_else(|| doi.trim().to_string());

            let pdf = match find_local_pdf(pdf_dir, &identifier)? {
                Some(pdf) => pdf,
                None => {
                    tracing::debug!("No local PDF for {} ({})", item.key, identifier);
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.sink.link_pdf(&item.key, &item.title, &pdf).await {
                Ok(()) => {
                    tracing::info!("Linked {} to item {}", pdf.display(), item.key);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to link {} to {}: {}", pdf.display(), item.key, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!("Link: {}", summary);
        Ok(summary)
    }

    /// Replace missing or implausible authors with those of the top search hit
    pub async fn fix_authors(
        &self,
        search: &GoogleScholarSource,
    ) -> Result<MaintenanceSummary, SinkError> {
        let items = self.items().await?;
        let mut summary = MaintenanceSummary {
            examined: items.len(),
            ..Default::default()
        };

        for item in &items {
            if item.has_valid_authors() {
                tracing::debug!("{} already has valid authors", item.key);
                summary.skipped += 1;
                continue;
            }
            if item.title.trim().is_empty() {
                tracing::warn!("{} has no title to search for", item.key);
                summary.failed += 1;
                continue;
            }

            tracing::info!("Re-scraping authors for {}: {}", item.key, item.title);
            let results = search
                .search(&SearchQuery::new(item.title.as_str()).max_results(1))
                .await;
            let authors = match results.into_iter().next() {
                Some(result) if !result.authors.is_empty() => result.authors,
                Some(_) => {
                    tracing::warn!("Search result for {} lists no authors", item.key);
                    summary.failed += 1;
                    continue;
                }
                None => {
                    tracing::warn!("No search results for '{}'", item.title);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.sink.update_authors(&item.key, &authors).await {
                Ok(()) => {
                    tracing::info!("Updated {} with {} authors", item.key, authors.len());
                    summary.succeeded += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to update {}: {}", item.key, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!("Fix authors: {}", summary);
        Ok(summary)
    }
}
