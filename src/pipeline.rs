//! End-to-end literature run: search, identifier normalization, PDF
//! acquisition and hand-off to the reference manager.
//!
//! Records are processed one at a time in ranking order. A failure on one
//! record (no DOI, no PDF, sink error) never stops the others; it only shows
//! up in the [`RunSummary`] counts.

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{FetchOutcome, ReferenceItem, SearchQuery, SearchResult};
use crate::sink::{ReferenceSink, ZoteroCliSink};
use crate::sources::{FetchWaterfall, GoogleScholarSource};
use crate::utils::{Doi, HttpClient, PaperProgress};

/// Aggregate counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub papers_found: usize,
    pub pdfs_fetched: usize,
    pub references_added: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Summary: {} papers found, {} PDFs fetched, {} added to Zotero",
            self.papers_found, self.pdfs_fetched, self.references_added
        )
    }
}

/// What happened to a single search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub fetch: FetchOutcome,
    pub reference_key: Option<String>,
}

/// The full search → fetch → sink pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    search: GoogleScholarSource,
    waterfall: FetchWaterfall,
    sink: Option<Arc<dyn ReferenceSink>>,
}

impl Pipeline {
    pub fn new(
        search: GoogleScholarSource,
        waterfall: FetchWaterfall,
        sink: Option<Arc<dyn ReferenceSink>>,
    ) -> Self {
        Self {
            search,
            waterfall,
            sink,
        }
    }

    /// Build every stage from configuration, sharing one HTTP session
    pub fn from_config(config: &Config, client: Arc<HttpClient>, with_sink: bool) -> Self {
        let search = GoogleScholarSource::new(Arc::clone(&client), config.search.clone());
        let waterfall = FetchWaterfall::from_config(config, client);
        let sink: Option<Arc<dyn ReferenceSink>> = if with_sink {
            Some(Arc::new(ZoteroCliSink::new(config.zotero.clone())))
        } else {
            None
        };
        Self::new(search, waterfall, sink)
    }

    /// Search and process every result without a visible progress bar
    pub async fn run(
        &self,
        question: &str,
        max_papers: usize,
        collection: Option<&str>,
    ) -> RunSummary {
        let records = self.search(question, max_papers).await;
        self.process_records(&records, collection, &PaperProgress::hidden())
            .await
    }

    /// Ranked search results for `question`
    pub async fn search(&self, question: &str, max_papers: usize) -> Vec<SearchResult> {
        tracing::info!("Searching Google Scholar for query: {}", question);
        let query = SearchQuery::new(question).max_results(max_papers);
        self.search.search(&query).await
    }

    /// Process records in order and count the outcomes
    pub async fn process_records(
        &self,
        records: &[SearchResult],
        collection: Option<&str>,
        progress: &PaperProgress,
    ) -> RunSummary {
        let mut summary = RunSummary {
            papers_found: records.len(),
            ..Default::default()
        };

        for record in records {
            progress.start(&record.title);
            let outcome = self.process_record(record, collection).await;
            if outcome.fetch.is_fetched() {
                summary.pdfs_fetched += 1;
            }
            if outcome.reference_key.is_some() {
                summary.references_added += 1;
            }
            progress.advance();
        }
        progress.finish();

        tracing::info!("{}", summary);
        summary
    }

    /// Fetch the PDF for one record and hand it to the sink
    pub async fn process_record(
        &self,
        record: &SearchResult,
        collection: Option<&str>,
    ) -> RecordOutcome {
        let doi = record.doi.as_deref().and_then(Doi::parse);

        let fetch = match &doi {
            Some(doi) => self.waterfall.fetch_doi(doi, &record.title).await,
            None => {
                tracing::info!(
                    "Skipping PDF retrieval; DOI missing or invalid for '{}'",
                    record.title
                );
                FetchOutcome::InvalidIdentifier
            }
        };

        let mut item = ReferenceItem::from_result(record)
            .collection(collection.map(String::from))
            .pdf_source(fetch.source());
        if let Some(doi) = &doi {
            item.doi = Some(doi.to_string());
        }

        let reference_key = match &self.sink {
            Some(sink) => match sink.add_paper(&item, fetch.path()).await {
                Ok(key) => key,
                Err(e) => {
                    tracing::error!(
                        "Failed adding paper to {} ({}): {}",
                        sink.name(),
                        record.title,
                        e
                    );
                    None
                }
            },
            None => None,
        };

        RecordOutcome {
            fetch,
            reference_key,
        }
    }
}
