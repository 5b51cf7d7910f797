//! # Research Harvest
//!
//! Literature discovery and PDF acquisition: search Google Scholar for a
//! research question, normalize the DOIs found in the results, fetch each
//! paper's PDF through an ordered waterfall of sources, and file the
//! metadata in a reference manager.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (SearchResult, FetchOutcome, ReferenceItem)
//! - [`sources`]: The Scholar paginator and the PDF acquisition strategies
//! - [`sink`]: Reference-manager hand-off (zotero-cli)
//! - [`pipeline`]: The end-to-end run
//! - [`maintenance`]: Retry, link and author-repair passes over stored items
//! - [`utils`]: DOI normalization, HTTP client, PDF verification
//! - [`config`]: Configuration management

pub mod config;
pub mod maintenance;
pub mod models;
pub mod pipeline;
pub mod sink;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{FetchOutcome, SearchResult, SourceTag};
pub use maintenance::{LibraryMaintenance, MaintenanceSummary};
pub use pipeline::{Pipeline, RunSummary};
pub use sources::{FetchWaterfall, GoogleScholarSource, PdfSource};
