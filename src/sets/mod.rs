//! Sets - named queries over the corpus and their exported snapshots.
//!
//! - [`SetRegistry`]: CRUD over set definitions
//! - [`SnapshotStore`]: the latest completed membership snapshot per set
//! - [`SetExporter`]: rebuilds snapshots from the record store

pub mod exporter;
pub mod registry;
pub mod snapshot;

use thiserror::Error;

use crate::query::QueryError;
use crate::traits::StoreError;

pub use exporter::{ExportSummary, SetExporter};
pub use registry::SetRegistry;
pub use snapshot::{ContentState, ExportFailure, SetSlot, SnapshotStore};

/// Errors from set management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// Name is empty, too long or not URL-safe
    #[error("Invalid set name: '{0}' (allowed: letters, digits, '-', '_', '.', '~')")]
    InvalidName(String),

    /// Definition is empty or does not parse
    #[error("Invalid set definition '{definition}': {source}")]
    InvalidDefinition {
        definition: String,
        #[source]
        source: QueryError,
    },

    /// A set with this name (ignoring case) already exists
    #[error("Set already exists: {0}")]
    DuplicateSet(String),

    /// No live set with this name
    #[error("Set not found: {0}")]
    NotFound(String),
}

/// Errors from exporting a set.
#[derive(Error, Debug)]
pub enum ExportError {
    /// No live set with this name
    #[error("Set not found: {0}")]
    NotFound(String),

    /// The set was deleted while the export was pending
    #[error("Set was deleted during export: {0}")]
    Deleted(String),

    /// The stored definition no longer parses
    #[error("Export failed: {0}")]
    Definition(#[from] SetError),

    /// The record store could not be read
    #[error("Export of set '{set}' failed: {source}")]
    Store {
        set: String,
        #[source]
        source: StoreError,
    },

    /// The export task did not run to completion
    #[error("Export task failed: {0}")]
    Task(String),
}
