//! Data models shared across the pipeline.

mod fetch;
mod library;
mod paper;
mod search;

pub use fetch::{FetchOutcome, SourceTag};
pub use library::{Creator, LibraryItem};
pub use paper::{ReferenceItem, SearchResult, SearchResultBuilder};
pub use search::SearchQuery;
