//! Scripted acquisition strategy for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::SourceTag;
use crate::sources::{PdfSource, SourceError};
use crate::utils::Doi;

/// What a [`MockSource`] does when attempted
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Write these bytes to the destination and succeed
    Pdf(Vec<u8>),
    /// Fail without touching the filesystem
    NotFound,
    /// Report missing configuration
    Disabled,
}

/// Shared record of which sources were attempted, in order
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A hand-rolled [`PdfSource`] for waterfall and pipeline tests.
///
/// Supports a fixed outcome, call counting via
/// [`call_count()`](MockSource::call_count) and an optional log shared
/// between several mocks to observe attempt order.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    tag: SourceTag,
    outcome: MockOutcome,
    call_count: AtomicUsize,
    log: Option<CallLog>,
}

impl MockSource {
    pub fn new(id: impl Into<String>, tag: SourceTag, outcome: MockOutcome) -> Self {
        Self {
            id: id.into(),
            tag,
            outcome,
            call_count: AtomicUsize::new(0),
            log: None,
        }
    }

    /// A source that always produces a small valid PDF
    pub fn succeeding(id: impl Into<String>, tag: SourceTag) -> Self {
        Self::new(id, tag, MockOutcome::Pdf(b"%PDF-1.4\n% mock\n".to_vec()))
    }

    /// A source that never finds anything
    pub fn failing(id: impl Into<String>, tag: SourceTag) -> Self {
        Self::new(id, tag, MockOutcome::NotFound)
    }

    /// Append this source's id to `log` on every attempt
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// How many times `attempt()` has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfSource for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn tag(&self) -> SourceTag {
        self.tag
    }

    async fn attempt(&self, doi: &Doi, destination: &Path) -> Result<(), SourceError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            if let Ok(mut entries) = log.lock() {
                entries.push(self.id.clone());
            }
        }

        match &self.outcome {
            MockOutcome::Pdf(bytes) => {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(destination, bytes).await?;
                Ok(())
            }
            MockOutcome::NotFound => Err(SourceError::NotFound(format!(
                "{} has nothing for {}",
                self.id, doi
            ))),
            MockOutcome::Disabled => Err(SourceError::Disabled(self.id.clone())),
        }
    }
}
