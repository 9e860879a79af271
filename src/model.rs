use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, query-defined subset of the corpus. The name doubles as the OAI `setSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing)]
    pub deleted: bool,
}

/// Immutable membership snapshot produced by one export of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetContent {
    pub set_name: String,
    /// Record identifiers, ascending.
    pub identifiers: Vec<String>,
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
}

impl SetContent {
    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers
            .binary_search_by(|probe| probe.as_str().cmp(identifier))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: String, // e.g., "doi:10.5072/FK2/ABC123"
    pub datestamp: DateTime<Utc>,
    pub metadata: CanonicalMetadata,
}

/// Repository-internal description of a published dataset version.
///
/// Only `persistent_id` and `title` are structurally present; every crosswalk
/// decides for itself which of the remaining fields it cannot do without.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    pub persistent_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>, // "Family, Given"
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>, // "YYYY-MM-DD" or "YYYY"
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

impl CanonicalMetadata {
    /// Resolver URL form of the persistent id, used where a schema wants a link.
    pub fn resolver_url(&self) -> String {
        if let Some(rest) = self.persistent_id.strip_prefix("doi:") {
            format!("https://doi.org/{rest}")
        } else if let Some(rest) = self.persistent_id.strip_prefix("hdl:") {
            format!("https://hdl.handle.net/{rest}")
        } else {
            self.persistent_id.clone()
        }
    }

    /// Four-digit year from `publication_date`, if there is one.
    pub fn publication_year(&self) -> Option<&str> {
        self.publication_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
    }
}
