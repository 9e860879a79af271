//! DDI Codebook 2.5 (`oai_ddi`), study-level description only.

use crate::crosswalk::RenderingError;
use crate::model::CanonicalMetadata;
use crate::xml::Element;

pub const PREFIX: &str = "oai_ddi";
pub const SCHEMA: &str =
    "https://ddialliance.org/Specification/DDI-Codebook/2.5/XMLSchema/codebook.xsd";
pub const NAMESPACE: &str = "ddi:codebook:2_5";

pub fn render(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
    if md.title.trim().is_empty() {
        return Err(RenderingError::missing(PREFIX, "titl"));
    }

    let agency = match md.persistent_id.split_once(':') {
        Some(("doi", _)) => "DOI",
        Some(("hdl", _)) => "Handle",
        _ => "URL",
    };
    let id_value = md
        .persistent_id
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(&md.persistent_id);

    let mut titl_stmt = Element::new("titlStmt").child(Element::new("titl").text(md.title.clone()));
    if !id_value.is_empty() {
        titl_stmt.push(Element::new("IDNo").attr("agency", agency).text(id_value));
    }

    let mut citation = Element::new("citation").child(titl_stmt);
    if !md.authors.is_empty() {
        let mut rsp = Element::new("rspStmt");
        for author in &md.authors {
            rsp.push(Element::new("AuthEnty").text(author.clone()));
        }
        citation.push(rsp);
    }
    if let Some(publisher) = md.publisher.as_deref() {
        citation.push(Element::new("distStmt").child(Element::new("distrbtr").text(publisher)));
    }
    if let Some(date) = md.publication_date.as_deref() {
        citation.push(
            Element::new("prodStmt").child(Element::new("prodDate").attr("date", date).text(date)),
        );
    }

    let mut stdy_info = Element::new("stdyInfo");
    if !md.subjects.is_empty() || !md.keywords.is_empty() {
        let mut subject = Element::new("subject");
        for keyword in &md.keywords {
            subject.push(Element::new("keyword").text(keyword.clone()));
        }
        for topic in &md.subjects {
            subject.push(Element::new("topcClas").text(topic.clone()));
        }
        stdy_info.push(subject);
    }
    stdy_info.push_text_opt("abstract", md.description.as_deref());

    let mut stdy_dscr = Element::new("stdyDscr").child(citation);
    if !stdy_info.children.is_empty() {
        stdy_dscr.push(stdy_info);
    }

    Ok(Element::new("codeBook")
        .attr("xmlns", NAMESPACE)
        .attr("version", "2.5")
        .child(stdy_dscr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_codebook() {
        let md = CanonicalMetadata {
            persistent_id: "doi:10.5072/FK2/X".to_string(),
            title: "T".to_string(),
            ..Default::default()
        };
        let xml = render(&md).unwrap().to_fragment();
        assert_eq!(
            xml,
            "<codeBook xmlns=\"ddi:codebook:2_5\" version=\"2.5\"><stdyDscr><citation>\
             <titlStmt><titl>T</titl><IDNo agency=\"DOI\">10.5072/FK2/X</IDNo></titlStmt>\
             </citation></stdyDscr></codeBook>"
        );
    }

    #[test]
    fn test_keywords_and_abstract() {
        let md = CanonicalMetadata {
            persistent_id: "doi:10.5072/FK2/X".to_string(),
            title: "T".to_string(),
            keywords: vec!["birds".to_string()],
            description: Some("About birds".to_string()),
            ..Default::default()
        };
        let xml = render(&md).unwrap().to_fragment();
        assert!(xml.contains("<stdyInfo><subject><keyword>birds</keyword></subject><abstract>About birds</abstract></stdyInfo>"));
    }
}
