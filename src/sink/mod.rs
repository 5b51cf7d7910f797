//! Reference-manager sinks.
//!
//! A sink receives one [`ReferenceItem`] per processed search result, along
//! with the path of its PDF when one was fetched. It also lists what is
//! already stored, so maintenance passes can link PDFs to existing items and
//! repair their authors. [`ZoteroCliSink`] drives the external `zotero-cli`
//! tool; [`MemorySink`] keeps items in memory.

mod zotero;

pub use zotero::{
    attachment_payload, author_creators, extract_item_key, find_collection_key, item_payload,
    parse_library_items, ZoteroCliSink,
};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::{Creator, LibraryItem, ReferenceItem};

/// Destination for paper metadata
#[async_trait]
pub trait ReferenceSink: Send + Sync + std::fmt::Debug {
    /// Human-readable name used in logs and the run summary
    fn name(&self) -> &str;

    /// Store `item`, linking `pdf_path` when present.
    ///
    /// Returns the key assigned by the reference manager, or `None` when the
    /// item was submitted but no key could be read back.
    async fn add_paper(
        &self,
        item: &ReferenceItem,
        pdf_path: Option<&Path>,
    ) -> Result<Option<String>, SinkError>;

    /// Top-level items, restricted to the named collection when given
    async fn list_items(&self, collection: Option<&str>) -> Result<Vec<LibraryItem>, SinkError>;

    /// Link a local PDF to an existing item
    async fn link_pdf(&self, item_key: &str, title: &str, pdf_path: &Path)
        -> Result<(), SinkError>;

    /// Replace the authors of an existing item
    async fn update_authors(&self, item_key: &str, authors: &[String]) -> Result<(), SinkError>;
}

/// Errors raised by a sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed: {message}")]
    CommandFailed { program: String, message: String },

    #[error("Unexpected {program} output: {message}")]
    UnexpectedOutput { program: String, message: String },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("PDF not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to encode payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored item and the PDF linked to it
pub type StoredPaper = (ReferenceItem, Option<PathBuf>);

/// Sink that records every item it receives
///
/// Keys are `MEM0001`, `MEM0002`, ... in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<StoredPaper>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items received so far, in arrival order
    pub fn items(&self) -> Vec<StoredPaper> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<StoredPaper>>, SinkError> {
        self.items
            .lock()
            .map_err(|_| std::io::Error::other("memory sink lock poisoned").into())
    }

    fn index_of(key: &str) -> Option<usize> {
        key.strip_prefix("MEM")?
            .parse::<usize>()
            .ok()?
            .checked_sub(1)
    }
}

fn memory_key(index: usize) -> String {
    format!("MEM{:04}", index + 1)
}

#[async_trait]
impl ReferenceSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add_paper(
        &self,
        item: &ReferenceItem,
        pdf_path: Option<&Path>,
    ) -> Result<Option<String>, SinkError> {
        let mut items = self.lock()?;
        items.push((item.clone(), pdf_path.map(Path::to_path_buf)));
        Ok(Some(memory_key(items.len() - 1)))
    }

    async fn list_items(&self, collection: Option<&str>) -> Result<Vec<LibraryItem>, SinkError> {
        let items = self.lock()?;
        if let Some(name) = collection {
            if !items.iter().any(|(item, _)| item.collection.as_deref() == Some(name)) {
                return Err(SinkError::CollectionNotFound(name.to_string()));
            }
        }

        Ok(items
            .iter()
            .enumerate()
            .filter(|(_, (item, _))| collection.is_none() || item.collection.as_deref() == collection)
            .map(|(index, (item, pdf))| LibraryItem {
                key: memory_key(index),
                title: item.title.clone(),
                doi: item.doi.clone(),
                creators: item.authors.iter().filter_map(|a| Creator::author(a)).collect(),
                has_pdf: pdf.is_some(),
            })
            .collect())
    }

    async fn link_pdf(
        &self,
        item_key: &str,
        _title: &str,
        pdf_path: &Path,
    ) -> Result<(), SinkError> {
        if !pdf_path.is_file() {
            return Err(SinkError::MissingFile(pdf_path.to_path_buf()));
        }
        let mut items = self.lock()?;
        let stored = Self::index_of(item_key)
            .and_then(|index| items.get_mut(index))
            .ok_or_else(|| SinkError::ItemNotFound(item_key.to_string()))?;
        stored.1 = Some(pdf_path.to_path_buf());
        Ok(())
    }

    async fn update_authors(&self, item_key: &str, authors: &[String]) -> Result<(), SinkError> {
        let mut items = self.lock()?;
        let stored = Self::index_of(item_key)
            .and_then(|index| items.get_mut(index))
            .ok_or_else(|| SinkError::ItemNotFound(item_key.to_string()))?;
        stored.0.authors = authors.to_vec();
        Ok(())
    }
}
