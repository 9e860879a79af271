//! Built-in metadata formats.
//!
//! - `dc` - Dublin Core (`oai_dc`)
//! - `datacite` - DataCite kernel 4, bare (`Datacite`) and OAI-wrapped (`oai_datacite`)
//! - `ddi` - DDI Codebook 2.5 (`oai_ddi`)
//! - `json` - native JSON carried as text (`dataverse_json`)

pub mod datacite;
pub mod dc;
pub mod ddi;
pub mod json;

use super::{CrosswalkRegistry, FormatError};

/// Registry with every built-in format, in `ListMetadataFormats` order.
pub fn default_registry() -> Result<CrosswalkRegistry, FormatError> {
    let mut registry = CrosswalkRegistry::new();
    registry.register(
        datacite::PREFIX,
        datacite::SCHEMA,
        datacite::NAMESPACE,
        datacite::render,
    )?;
    registry.register(json::PREFIX, json::SCHEMA, json::NAMESPACE, json::render)?;
    registry.register(
        datacite::OAI_PREFIX,
        datacite::OAI_SCHEMA,
        datacite::OAI_NAMESPACE,
        datacite::render_oai,
    )?;
    registry.register(dc::PREFIX, dc::SCHEMA, dc::NAMESPACE, dc::render)?;
    registry.register(ddi::PREFIX, ddi::SCHEMA, ddi::NAMESPACE, ddi::render)?;
    Ok(registry)
}
