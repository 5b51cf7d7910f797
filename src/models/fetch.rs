//! Outcome of a PDF acquisition attempt.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The acquisition stage that produced a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Open-access metadata resolver (Unpaywall)
    Resolver,
    /// Fallback mirror site
    Mirror,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Resolver => "resolver",
            SourceTag::Mirror => "mirror",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the acquisition waterfall for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// A verified PDF was written to `path`
    Fetched { path: PathBuf, source: SourceTag },
    /// The identifier did not validate; no request was made
    InvalidIdentifier,
    /// Every stage was tried without success
    NotFound,
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Fetched { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<SourceTag> {
        match self {
            FetchOutcome::Fetched { source, .. } => Some(*source),
            _ => None,
        }
    }
}
