use chrono::{DateTime, Utc};

use super::request::{format_datestamp, OaiRequest};
use super::{OaiError, OAI_NAMESPACE, OAI_SCHEMA};
use crate::xml::Element;

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The verb's element, e.g. `<ListRecords>`.
    Verb(Element),
    Errors(Vec<OaiError>),
}

/// One enveloped protocol response.
#[derive(Debug, Clone, PartialEq)]
pub struct OaiResponse {
    pub response_date: DateTime<Utc>,
    pub base_url: String,
    /// Attributes of the `<request>` echo.
    pub echo: Vec<(String, String)>,
    pub payload: Payload,
}

impl OaiResponse {
    pub fn ok(base_url: &str, request: &OaiRequest, body: Element) -> Self {
        Self {
            response_date: Utc::now(),
            base_url: base_url.to_string(),
            echo: request.pairs().to_vec(),
            payload: Payload::Verb(body),
        }
    }

    /// Error response. Requests rejected as `badVerb` or `badArgument` echo
    /// only the base URL.
    pub fn error(base_url: &str, request: &OaiRequest, error: OaiError) -> Self {
        let echo = if error.hides_request() {
            Vec::new()
        } else {
            request.pairs().to_vec()
        };
        Self {
            response_date: Utc::now(),
            base_url: base_url.to_string(),
            echo,
            payload: Payload::Errors(vec![error]),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Errors(_))
    }

    pub fn errors(&self) -> &[OaiError] {
        match &self.payload {
            Payload::Errors(errors) => errors,
            Payload::Verb(_) => &[],
        }
    }

    pub fn body(&self) -> Option<&Element> {
        match &self.payload {
            Payload::Verb(body) => Some(body),
            Payload::Errors(_) => None,
        }
    }

    /// The full response document, prolog included.
    pub fn to_xml(&self) -> String {
        let mut request = Element::new("request");
        for (name, value) in &self.echo {
            request = request.attr(name.as_str(), value.as_str());
        }
        let request = request.text(self.base_url.as_str());

        let mut root = Element::new("OAI-PMH")
            .attr("xmlns", OAI_NAMESPACE)
            .attr("xmlns:xsi", XSI_NAMESPACE)
            .attr(
                "xsi:schemaLocation",
                format!("{OAI_NAMESPACE} {OAI_SCHEMA}"),
            )
            .child(Element::new("responseDate").text(format_datestamp(&self.response_date)))
            .child(request);

        match &self.payload {
            Payload::Verb(body) => root.push(body.clone()),
            Payload::Errors(errors) => {
                for error in errors {
                    root.push(
                        Element::new("error")
                            .attr("code", error.code.as_str())
                            .text(error.message.as_str()),
                    );
                }
            }
        }
        root.to_document()
    }
}
