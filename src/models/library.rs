//! Items already stored in the reference manager.

use serde::{Deserialize, Serialize};

/// Longest plausible author name; anything longer is scraped debris
const MAX_AUTHOR_CHARS: usize = 100;

/// A Zotero creator entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default = "default_creator_type")]
    pub creator_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Single-field name, used for mononyms and organisations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_creator_type() -> String {
    "author".to_string()
}

impl Creator {
    /// Split a display name into an author entry.
    ///
    /// A single-token name is kept whole; otherwise the last token is the
    /// surname and everything before it the given names.
    pub fn author(display_name: &str) -> Option<Self> {
        let parts: Vec<&str> = display_name.split_whitespace().collect();
        let (first_name, last_name, name) = match parts.as_slice() {
            [] => return None,
            [name] => (None, None, Some(name.to_string())),
            [given @ .., last] => (Some(given.join(" ")), Some(last.to_string()), None),
        };
        Some(Self {
            creator_type: default_creator_type(),
            first_name,
            last_name,
            name,
        })
    }

    /// Every name field concatenated
    fn combined_name(&self) -> String {
        [&self.last_name, &self.first_name, &self.name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Whether the name looks like a real person or organisation rather than
    /// a fragment of the listing's metadata line
    pub fn is_plausible(&self) -> bool {
        let combined = self.combined_name();
        let name = combined.trim();
        !name.is_empty()
            && !name.chars().all(|c| c.is_ascii_digit())
            && !name.contains('…')
            && !name.contains(" - ")
            && name.chars().count() <= MAX_AUTHOR_CHARS
    }
}

/// A top-level item listed from the reference manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub key: String,
    pub title: String,
    /// DOI as stored, not yet normalized
    pub doi: Option<String>,
    pub creators: Vec<Creator>,
    /// Whether a PDF attachment already exists
    pub has_pdf: bool,
}

impl LibraryItem {
    /// Non-empty creators, each with a plausible name
    pub fn has_valid_authors(&self) -> bool {
        !self.creators.is_empty() && self.creators.iter().all(Creator::is_plausible)
    }
}
