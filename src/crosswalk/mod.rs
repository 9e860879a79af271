//! Metadata crosswalks - canonical record metadata to per-format XML.
//!
//! This module provides:
//! - The [`Crosswalk`] trait: a pure, deterministic transform for one format
//! - [`MetadataFormat`]: prefix, schema and namespace advertised to harvesters
//! - [`CrosswalkRegistry`]: the table of formats keyed by `metadataPrefix`
//! - Built-in formats in [`formats`]
//!
//! The registry is populated once at startup and then shared immutably
//! (`Arc<CrosswalkRegistry>`) with every component that renders records.

pub mod formats;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::model::CanonicalMetadata;
use crate::xml::Element;

pub use formats::default_registry;

// ============================================================================
// Crosswalk Trait
// ============================================================================

/// Transform from canonical metadata to one external schema.
///
/// Implementations must be pure: the same metadata always yields the same
/// tree, and nothing outside the input is consulted. Optional fields that are
/// absent are left out of the output; a field the format cannot do without
/// yields [`RenderingError::MissingField`].
///
/// Plain functions and closures with the right signature implement this trait,
/// which keeps ad-hoc formats (and test doubles) one-liners.
pub trait Crosswalk: Send + Sync {
    fn render(&self, metadata: &CanonicalMetadata) -> Result<Element, RenderingError>;
}

impl<F> Crosswalk for F
where
    F: Fn(&CanonicalMetadata) -> Result<Element, RenderingError> + Send + Sync,
{
    fn render(&self, metadata: &CanonicalMetadata) -> Result<Element, RenderingError> {
        self(metadata)
    }
}

// ============================================================================
// Format Table
// ============================================================================

/// A metadata format as listed by `ListMetadataFormats`.
#[derive(Clone)]
pub struct MetadataFormat {
    /// `metadataPrefix` harvesters use to request this format
    pub prefix: String,

    /// URL of the XML schema for the format
    pub schema: String,

    /// XML namespace of the format's root element
    pub namespace: String,

    /// Transform producing the `<metadata>` payload
    pub transform: Arc<dyn Crosswalk>,
}

impl fmt::Debug for MetadataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataFormat")
            .field("prefix", &self.prefix)
            .field("schema", &self.schema)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Table of metadata formats, keyed by prefix.
///
/// Listing order is registration order.
#[derive(Debug, Default)]
pub struct CrosswalkRegistry {
    formats: Vec<MetadataFormat>,
    by_prefix: HashMap<String, usize>,
}

impl CrosswalkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a format.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::DuplicatePrefix`] if the prefix is already taken,
    /// and [`FormatError::InvalidPrefix`] for a blank prefix.
    pub fn register(
        &mut self,
        prefix: &str,
        schema: &str,
        namespace: &str,
        transform: impl Crosswalk + 'static,
    ) -> Result<(), FormatError> {
        if prefix.trim().is_empty() {
            return Err(FormatError::InvalidPrefix(prefix.to_string()));
        }
        if self.by_prefix.contains_key(prefix) {
            return Err(FormatError::DuplicatePrefix(prefix.to_string()));
        }

        self.by_prefix.insert(prefix.to_string(), self.formats.len());
        self.formats.push(MetadataFormat {
            prefix: prefix.to_string(),
            schema: schema.to_string(),
            namespace: namespace.to_string(),
            transform: Arc::new(transform),
        });
        Ok(())
    }

    pub fn get(&self, prefix: &str) -> Option<&MetadataFormat> {
        self.by_prefix.get(prefix).map(|&i| &self.formats[i])
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.by_prefix.contains_key(prefix)
    }

    pub fn formats(&self) -> &[MetadataFormat] {
        &self.formats
    }

    /// Renders `metadata` in the format registered under `prefix`.
    pub fn render(
        &self,
        metadata: &CanonicalMetadata,
        prefix: &str,
    ) -> Result<Element, RenderingError> {
        let format = self
            .get(prefix)
            .ok_or_else(|| RenderingError::UnknownFormat(prefix.to_string()))?;
        format.transform.render(metadata)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while building the format table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Another format already uses this prefix
    #[error("Duplicate metadata prefix: {0}")]
    DuplicatePrefix(String),

    /// Prefix is blank
    #[error("Invalid metadata prefix: '{0}'")]
    InvalidPrefix(String),
}

/// Errors raised while rendering a single record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderingError {
    /// A field the format cannot do without is absent
    #[error("{prefix}: missing mandatory field '{field}'")]
    MissingField { prefix: String, field: &'static str },

    /// No format with this prefix is registered
    #[error("Unknown metadata prefix: {0}")]
    UnknownFormat(String),

    /// The format's serializer failed
    #[error("{prefix}: serialization failed: {message}")]
    Serialization { prefix: String, message: String },

    /// The rendering task did not complete
    #[error("Rendering task failed: {0}")]
    Task(String),
}

impl RenderingError {
    pub(crate) fn missing(prefix: &str, field: &'static str) -> Self {
        RenderingError::MissingField {
            prefix: prefix.to_string(),
            field,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_title(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
        Ok(Element::new("t").text(md.title.clone()))
    }

    #[test]
    fn test_register_rejects_duplicate_prefix() {
        let mut registry = CrosswalkRegistry::new();
        registry.register("x", "s", "n", echo_title).unwrap();
        assert_eq!(
            registry.register("x", "s2", "n2", echo_title),
            Err(FormatError::DuplicatePrefix("x".to_string()))
        );
        assert_eq!(registry.formats().len(), 1);
        assert_eq!(registry.get("x").unwrap().schema, "s");
    }

    #[test]
    fn test_register_rejects_blank_prefix() {
        let mut registry = CrosswalkRegistry::new();
        assert!(matches!(
            registry.register(" ", "s", "n", echo_title),
            Err(FormatError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_render_dispatches_by_prefix() {
        let mut registry = CrosswalkRegistry::new();
        registry.register("x", "s", "n", echo_title).unwrap();
        let md = CanonicalMetadata {
            title: "Hello".to_string(),
            ..Default::default()
        };
        assert_eq!(registry.render(&md, "x").unwrap().to_fragment(), "<t>Hello</t>");
        assert_eq!(
            registry.render(&md, "nope"),
            Err(RenderingError::UnknownFormat("nope".to_string()))
        );
    }
}
