//! Records produced by the search paginator and handed to the reference manager.

use serde::{Deserialize, Serialize};

use super::SourceTag;

/// One scraped search result
///
/// Produced once per fetched page and never mutated afterwards. The DOI is
/// a best-effort candidate and still has to pass normalization before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Paper title
    pub title: String,

    /// Author display names in listing order
    pub authors: Vec<String>,

    /// Publication year, if one was found in the metadata line
    pub year: Option<u16>,

    /// DOI candidate found in the title, URL or snippet
    pub doi: Option<String>,

    /// Landing page URL
    pub url: String,

    /// Abstract-like snippet
    pub snippet: String,

    /// "Cited by" count, zero when absent
    pub citations: u32,
}

impl SearchResult {
    /// Create a result with only a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            doi: None,
            url: String::new(),
            snippet: String::new(),
            citations: 0,
        }
    }
}

/// Builder for constructing SearchResult objects
#[derive(Debug, Clone)]
pub struct SearchResultBuilder {
    result: SearchResult,
}

impl SearchResultBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            result: SearchResult::new(title),
        }
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.result.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn year(mut self, year: Option<u16>) -> Self {
        self.result.year = year;
        self
    }

    pub fn doi(mut self, doi: Option<String>) -> Self {
        self.result.doi = doi;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.result.url = url.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.result.snippet = snippet.into();
        self
    }

    pub fn citations(mut self, count: u32) -> Self {
        self.result.citations = count;
        self
    }

    pub fn build(self) -> SearchResult {
        self.result
    }
}

/// Metadata record handed to the reference manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<u16>,
    /// Normalized DOI when available, else the raw candidate
    pub doi: Option<String>,
    pub url: String,
    pub snippet: String,
    /// Target collection name
    pub collection: Option<String>,
    /// Which acquisition stage produced the attached PDF
    pub pdf_source: Option<SourceTag>,
}

impl ReferenceItem {
    /// Build an item from a search result
    pub fn from_result(result: &SearchResult) -> Self {
        Self {
            title: result.title.clone(),
            authors: result.authors.clone(),
            year: result.year,
            doi: result.doi.clone(),
            url: result.url.clone(),
            snippet: result.snippet.clone(),
            collection: None,
            pdf_source: None,
        }
    }

    pub fn collection(mut self, collection: Option<String>) -> Self {
        self.collection = collection;
        self
    }

    pub fn pdf_source(mut self, source: Option<SourceTag>) -> Self {
        self.pdf_source = source;
        self
    }

    /// Free-text annotation recording the PDF source, if any
    pub fn extra(&self) -> String {
        self.pdf_source
            .map(|source| format!("PDF source: {}", source))
            .unwrap_or_default()
    }
}
