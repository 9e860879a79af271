//! DataCite kernel 4.
//!
//! `Datacite` serves the bare `<resource>`; `oai_datacite` wraps the same
//! resource in the DataCite OAI envelope.

use crate::crosswalk::RenderingError;
use crate::model::CanonicalMetadata;
use crate::xml::Element;

pub const PREFIX: &str = "Datacite";
pub const SCHEMA: &str = "http://schema.datacite.org/meta/kernel-4/metadata.xsd";
pub const NAMESPACE: &str = "http://datacite.org/schema/kernel-4";

pub const OAI_PREFIX: &str = "oai_datacite";
pub const OAI_SCHEMA: &str = "http://schema.datacite.org/oai/oai-1.1/oai.xsd";
pub const OAI_NAMESPACE: &str = "http://schema.datacite.org/oai/oai-1.1/";

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub fn render(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
    resource(md, PREFIX)
}

pub fn render_oai(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
    let resource = resource(md, OAI_PREFIX)?;
    Ok(Element::new("oai_datacite")
        .attr("xmlns", OAI_NAMESPACE)
        .attr("xmlns:xsi", XSI_NAMESPACE)
        .attr("xsi:schemaLocation", format!("{OAI_NAMESPACE} {OAI_SCHEMA}"))
        .child(Element::new("schemaVersion").text("4"))
        .child(Element::new("datacentreSymbol").text(datacentre_symbol(md)))
        .child(Element::new("payload").child(resource)))
}

/// Identifier, creator, title, publisher and publication year are mandatory
/// in the kernel.
fn resource(md: &CanonicalMetadata, prefix: &str) -> Result<Element, RenderingError> {
    if md.persistent_id.trim().is_empty() {
        return Err(RenderingError::missing(prefix, "identifier"));
    }
    if md.authors.iter().all(|a| a.trim().is_empty()) {
        return Err(RenderingError::missing(prefix, "creator"));
    }
    if md.title.trim().is_empty() {
        return Err(RenderingError::missing(prefix, "title"));
    }
    let publisher = md
        .publisher
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| RenderingError::missing(prefix, "publisher"))?;
    let year = md
        .publication_year()
        .ok_or_else(|| RenderingError::missing(prefix, "publicationYear"))?;

    let (id_type, id_value) = identifier(&md.persistent_id);

    let mut creators = Element::new("creators");
    for author in md.authors.iter().filter(|a| !a.trim().is_empty()) {
        creators.push(Element::new("creator").child(Element::new("creatorName").text(author.clone())));
    }

    let mut resource = Element::new("resource")
        .attr("xmlns", NAMESPACE)
        .attr("xmlns:xsi", XSI_NAMESPACE)
        .attr("xsi:schemaLocation", format!("{NAMESPACE} {SCHEMA}"))
        .child(
            Element::new("identifier")
                .attr("identifierType", id_type)
                .text(id_value),
        )
        .child(creators)
        .child(Element::new("titles").child(Element::new("title").text(md.title.clone())))
        .child(Element::new("publisher").text(publisher))
        .child(Element::new("publicationYear").text(year));

    let subjects: Vec<&String> = md.subjects.iter().chain(&md.keywords).collect();
    if !subjects.is_empty() {
        let mut el = Element::new("subjects");
        for subject in subjects {
            el.push(Element::new("subject").text(subject.clone()));
        }
        resource.push(el);
    }
    resource.push_text_opt("language", md.language.as_deref());
    resource.push(
        Element::new("resourceType")
            .attr("resourceTypeGeneral", "Dataset")
            .text(md.resource_type.clone().unwrap_or_default()),
    );
    if let Some(description) = md.description.as_deref().filter(|d| !d.trim().is_empty()) {
        resource.push(
            Element::new("descriptions").child(
                Element::new("description")
                    .attr("descriptionType", "Abstract")
                    .text(description),
            ),
        );
    }

    Ok(resource)
}

fn identifier(pid: &str) -> (&'static str, &str) {
    if let Some(rest) = pid.strip_prefix("doi:") {
        ("DOI", rest)
    } else if let Some(rest) = pid.strip_prefix("hdl:") {
        ("Handle", rest)
    } else {
        ("URL", pid)
    }
}

/// DOI prefix (`10.5072`) standing in for the datacentre symbol.
fn datacentre_symbol(md: &CanonicalMetadata) -> String {
    let (_, value) = identifier(&md.persistent_id);
    value.split('/').next().unwrap_or_default().to_string()
}
