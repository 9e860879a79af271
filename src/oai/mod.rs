//! OAI-PMH 2.0 protocol surface.
//!
//! - [`OaiRequest`]: raw request arguments, repeated names preserved
//! - [`Dispatcher`]: validates a request and produces an [`OaiResponse`]
//! - [`HarvestFilter`]: set and date-range selection over snapshots
//! - [`TokenCodec`]: self-contained resumption tokens

pub mod dispatcher;
pub mod filter;
pub mod request;
pub mod response;
pub mod token;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::traits::StoreError;

pub use dispatcher::Dispatcher;
pub use filter::{HarvestFilter, Selection};
pub use request::OaiRequest;
pub use response::OaiResponse;
pub use token::{ResumptionToken, TokenCodec, TokenError};

pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";
pub const OAI_SCHEMA: &str = "http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Verb {
    Identify,
    ListMetadataFormats,
    ListSets,
    ListIdentifiers,
    ListRecords,
    GetRecord,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Identify => "Identify",
            Verb::ListMetadataFormats => "ListMetadataFormats",
            Verb::ListSets => "ListSets",
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::ListRecords => "ListRecords",
            Verb::GetRecord => "GetRecord",
        }
    }

    /// Arguments the verb accepts besides `verb` itself.
    pub fn allowed_arguments(&self) -> &'static [&'static str] {
        match self {
            Verb::Identify => &[],
            Verb::ListMetadataFormats => &["identifier"],
            Verb::ListSets => &["resumptionToken"],
            Verb::ListIdentifiers | Verb::ListRecords => {
                &["metadataPrefix", "set", "from", "until", "resumptionToken"]
            }
            Verb::GetRecord => &["identifier", "metadataPrefix"],
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = OaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Identify" => Verb::Identify,
            "ListMetadataFormats" => Verb::ListMetadataFormats,
            "ListSets" => Verb::ListSets,
            "ListIdentifiers" => Verb::ListIdentifiers,
            "ListRecords" => Verb::ListRecords,
            "GetRecord" => Verb::GetRecord,
            other => {
                return Err(OaiError::new(
                    ErrorCode::BadVerb,
                    format!("Illegal OAI verb: {other}"),
                ))
            }
        })
    }
}

/// OAI-PMH error codes. These are payload-level errors (HTTP 200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadArgument,
    BadVerb,
    BadResumptionToken,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoSetHierarchy,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadArgument => "badArgument",
            ErrorCode::BadVerb => "badVerb",
            ErrorCode::BadResumptionToken => "badResumptionToken",
            ErrorCode::CannotDisseminateFormat => "cannotDisseminateFormat",
            ErrorCode::IdDoesNotExist => "idDoesNotExist",
            ErrorCode::NoRecordsMatch => "noRecordsMatch",
            ErrorCode::NoSetHierarchy => "noSetHierarchy",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `<error code="...">` payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct OaiError {
    pub code: ErrorCode,
    pub message: String,
}

impl OaiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArgument, message)
    }

    /// Whether the request echo must omit the verb and arguments.
    pub fn hides_request(&self) -> bool {
        matches!(self.code, ErrorCode::BadVerb | ErrorCode::BadArgument)
    }
}

impl From<TokenError> for OaiError {
    fn from(e: TokenError) -> Self {
        OaiError::new(ErrorCode::BadResumptionToken, e.to_string())
    }
}

/// Failures that are not protocol errors: the request could not be served.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}
