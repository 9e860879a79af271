//! Dublin Core (`oai_dc`).

use crate::crosswalk::RenderingError;
use crate::model::CanonicalMetadata;
use crate::xml::Element;

pub const PREFIX: &str = "oai_dc";
pub const SCHEMA: &str = "http://www.openarchives.org/OAI/2.0/oai_dc.xsd";
pub const NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Title and identifier are mandatory; everything else is optional and
/// repeatable the way DC allows.
pub fn render(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
    if md.title.trim().is_empty() {
        return Err(RenderingError::missing(PREFIX, "title"));
    }
    if md.persistent_id.trim().is_empty() {
        return Err(RenderingError::missing(PREFIX, "identifier"));
    }

    let mut dc = Element::new("oai_dc:dc")
        .attr("xmlns:oai_dc", NAMESPACE)
        .attr("xmlns:dc", DC_NAMESPACE)
        .attr("xmlns:xsi", XSI_NAMESPACE)
        .attr("xsi:schemaLocation", format!("{NAMESPACE} {SCHEMA}"));

    dc.push(Element::new("dc:title").text(md.title.clone()));
    dc.push(Element::new("dc:identifier").text(md.resolver_url()));
    for author in &md.authors {
        dc.push(Element::new("dc:creator").text(author.clone()));
    }
    dc.push_text_opt("dc:publisher", md.publisher.as_deref());
    dc.push_text_opt("dc:description", md.description.as_deref());
    for subject in md.subjects.iter().chain(&md.keywords) {
        dc.push(Element::new("dc:subject").text(subject.clone()));
    }
    dc.push_text_opt("dc:date", md.publication_date.as_deref());
    dc.push_text_opt("dc:language", md.language.as_deref());
    dc.push_text_opt("dc:type", md.resource_type.as_deref());

    Ok(dc)
}
