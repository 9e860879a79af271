//! Native JSON (`dataverse_json`), carried as escaped text inside one element.

use crate::crosswalk::RenderingError;
use crate::model::CanonicalMetadata;
use crate::xml::Element;

pub const PREFIX: &str = "dataverse_json";
pub const SCHEMA: &str = "https://guides.dataverse.org/en/latest/_static/api/dataset-schema.json";
pub const NAMESPACE: &str = "https://dataverse.org/schema/dataverse_json";

pub fn render(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
    if md.persistent_id.trim().is_empty() {
        return Err(RenderingError::missing(PREFIX, "persistentId"));
    }
    let json = serde_json::to_string(md).map_err(|e| RenderingError::Serialization {
        prefix: PREFIX.to_string(),
        message: e.to_string(),
    })?;
    Ok(Element::new("dataverse_json")
        .attr("xmlns", NAMESPACE)
        .text(json))
}
