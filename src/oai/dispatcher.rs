//! Protocol verb dispatch.
//!
//! Each request is validated in a fixed order: the verb first, then argument
//! names and repeats, then per-verb requirements. Protocol failures become
//! `<error>` payloads; a record store failure is returned as [`ServerError`]
//! so the transport can answer with a 5xx instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument, warn};

use super::filter::HarvestFilter;
use super::request::{format_datestamp, parse_datestamp, Bound, OaiRequest};
use super::response::OaiResponse;
use super::token::{ResumptionToken, TokenCodec, TokenError};
use super::{ErrorCode, OaiError, ServerError, Verb};
use crate::cache::RenderCache;
use crate::config::{ServerConfig, DELETED_RECORD_POLICY, GRANULARITY, PROTOCOL_VERSION};
use crate::crosswalk::CrosswalkRegistry;
use crate::model::Record;
use crate::sets::SetRegistry;
use crate::traits::{RecordStore, StoreError};
use crate::xml::Element;

/// Namespace of the `setDescription` metadata block.
const SET_DESCRIPTION_NAMESPACE: &str = "http://www.lyncode.com/xoai";

const EPOCH_DATESTAMP: &str = "1970-01-01T00:00:00Z";

enum Failure {
    Protocol(OaiError),
    Server(ServerError),
}

impl From<OaiError> for Failure {
    fn from(e: OaiError) -> Self {
        Failure::Protocol(e)
    }
}

impl From<TokenError> for Failure {
    fn from(e: TokenError) -> Self {
        Failure::Protocol(e.into())
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        Failure::Server(e.into())
    }
}

type Outcome = Result<Element, Failure>;

/// Parameters of one list page, from request arguments or a token.
#[derive(Debug)]
struct ListArgs {
    prefix: String,
    set: Option<String>,
    from: Option<String>,
    until: Option<String>,
    cursor: usize,
    last: Option<String>,
    generation: Option<u64>,
    resumed: bool,
}

pub struct Dispatcher {
    config: Arc<ServerConfig>,
    store: Arc<dyn RecordStore>,
    registry: Arc<SetRegistry>,
    crosswalks: Arc<CrosswalkRegistry>,
    cache: Arc<RenderCache>,
    filter: HarvestFilter,
    tokens: TokenCodec,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn RecordStore>,
        registry: Arc<SetRegistry>,
        crosswalks: Arc<CrosswalkRegistry>,
        cache: Arc<RenderCache>,
    ) -> Self {
        let snapshots = Arc::clone(registry.snapshots());
        Self {
            filter: HarvestFilter::new(Arc::clone(&store), Arc::clone(&snapshots)),
            tokens: TokenCodec::new(config.token_ttl, snapshots),
            config,
            store,
            registry,
            crosswalks,
            cache,
        }
    }

    #[instrument(skip_all, fields(verb = ?request.get("verb")))]
    pub async fn handle(&self, request: &OaiRequest) -> Result<OaiResponse, ServerError> {
        let base_url = self.config.base_url.as_str();
        match self.dispatch(request).await {
            Ok(body) => Ok(OaiResponse::ok(base_url, request, body)),
            Err(Failure::Protocol(e)) => {
                debug!(code = %e.code, message = %e.message, "protocol error");
                Ok(OaiResponse::error(base_url, request, e))
            }
            Err(Failure::Server(e)) => {
                error!(error = %e, "request failed");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, request: &OaiRequest) -> Outcome {
        let verb = request.verb()?;
        request.check_arguments(verb)?;

        match verb {
            Verb::Identify => self.identify().await,
            Verb::ListMetadataFormats => self.list_metadata_formats(request).await,
            Verb::ListSets => self.list_sets(request),
            Verb::ListIdentifiers | Verb::ListRecords => self.list(verb, request).await,
            Verb::GetRecord => self.get_record(request).await,
        }
    }

    async fn identify(&self) -> Outcome {
        let earliest = self
            .store
            .all_records()
            .await?
            .iter()
            .map(|r| r.datestamp)
            .min()
            .map(|d| format_datestamp(&d))
            .unwrap_or_else(|| EPOCH_DATESTAMP.to_string());

        Ok(Element::new("Identify")
            .child(Element::new("repositoryName").text(self.config.repository_name.as_str()))
            .child(Element::new("baseURL").text(self.config.base_url.as_str()))
            .child(Element::new("protocolVersion").text(PROTOCOL_VERSION))
            .child(Element::new("adminEmail").text(self.config.admin_email.as_str()))
            .child(Element::new("earliestDatestamp").text(earliest))
            .child(Element::new("deletedRecord").text(DELETED_RECORD_POLICY))
            .child(Element::new("granularity").text(GRANULARITY)))
    }

    async fn list_metadata_formats(&self, request: &OaiRequest) -> Outcome {
        if let Some(identifier) = request.get("identifier") {
            if self.store.get(identifier).await?.is_none() {
                return Err(id_does_not_exist(identifier).into());
            }
        }

        let mut body = Element::new("ListMetadataFormats");
        for format in self.crosswalks.formats() {
            body.push(
                Element::new("metadataFormat")
                    .child(Element::new("metadataPrefix").text(format.prefix.as_str()))
                    .child(Element::new("schema").text(format.schema.as_str()))
                    .child(Element::new("metadataNamespace").text(format.namespace.as_str())),
            );
        }
        Ok(body)
    }

    fn list_sets(&self, request: &OaiRequest) -> Outcome {
        if request.get("resumptionToken").is_some() {
            return Err(OaiError::new(
                ErrorCode::BadResumptionToken,
                "ListSets is never paged; no resumptionToken was issued",
            )
            .into());
        }
        let sets = self.registry.list();
        if sets.is_empty() {
            return Err(no_set_hierarchy().into());
        }

        let mut body = Element::new("ListSets");
        for set in sets {
            let mut entry = Element::new("set")
                .child(Element::new("setSpec").text(set.name.as_str()))
                .child(Element::new("setName").text(set.name.as_str()));
            if !set.description.trim().is_empty() {
                entry.push(
                    Element::new("setDescription").child(
                        Element::new("metadata")
                            .attr("xmlns", SET_DESCRIPTION_NAMESPACE)
                            .child(
                                Element::new("element").attr("name", "description").child(
                                    Element::new("field")
                                        .attr("name", "value")
                                        .text(set.description.as_str()),
                                ),
                            ),
                    ),
                );
            }
            body.push(entry);
        }
        Ok(body)
    }

    async fn get_record(&self, request: &OaiRequest) -> Outcome {
        let identifier = request.required("identifier")?;
        let prefix = request.required("metadataPrefix")?;

        let record = self
            .store
            .get(identifier)
            .await?
            .ok_or_else(|| id_does_not_exist(identifier))?;
        if !self.crosswalks.contains(prefix) {
            return Err(unknown_format(prefix).into());
        }

        let metadata = self
            .cache
            .get_rendering(&record, prefix)
            .await
            .map_err(|e| {
                OaiError::new(
                    ErrorCode::CannotDisseminateFormat,
                    format!("Record {identifier} cannot be disseminated as {prefix}: {e}"),
                )
            })?;

        Ok(Element::new("GetRecord").child(
            Element::new("record")
                .child(self.header(&record))
                .child(Element::new("metadata").raw(&*metadata)),
        ))
    }

    async fn list(&self, verb: Verb, request: &OaiRequest) -> Outcome {
        let now = Utc::now();
        let args = match request.get("resumptionToken") {
            Some(raw) => self.resume(verb, raw, now)?,
            None => self.fresh_args(request)?,
        };
        let (from, until) = parse_range(args.from.as_deref(), args.until.as_deref())?;

        let selection = self
            .filter
            .filter(args.set.as_deref(), from, until)
            .await?;
        if args.resumed && args.set.is_some() && selection.generation != args.generation {
            // Re-exported between decoding the token and loading the snapshot.
            return Err(TokenError::GenerationMismatch.into());
        }

        let records = selection.records;
        let total = records.len();
        if total == 0 {
            return Err(no_records_match().into());
        }

        let start = match &args.last {
            Some(last) => records.partition_point(|r| r.identifier.as_str() <= last.as_str()),
            None => 0,
        };
        let end = start.saturating_add(self.config.page_size).min(total);
        let page = &records[start..end];
        let more = end < total;

        let mut body = Element::new(verb.as_str());
        for record in page {
            match verb {
                Verb::ListIdentifiers => body.push(self.header(record)),
                _ => match self.cache.get_rendering(record, &args.prefix).await {
                    Ok(metadata) => body.push(
                        Element::new("record")
                            .child(self.header(record))
                            .child(Element::new("metadata").raw(&*metadata)),
                    ),
                    Err(e) => {
                        warn!(
                            identifier = %record.identifier,
                            prefix = %args.prefix,
                            error = %e,
                            "skipping record that cannot be rendered"
                        );
                    }
                },
            }
        }

        if body.children.is_empty() && !more && !args.resumed {
            return Err(no_records_match().into());
        }

        match page.last().filter(|_| more) {
            Some(last) => {
                let token = ResumptionToken {
                    verb,
                    set: args.set.clone(),
                    from: args.from.clone(),
                    until: args.until.clone(),
                    prefix: args.prefix.clone(),
                    cursor: args.cursor.saturating_add(page.len()),
                    last: last.identifier.clone(),
                    generation: selection.generation,
                    expires_at: self.tokens.expiry(now),
                };
                body.push(
                    Element::new("resumptionToken")
                        .attr("cursor", args.cursor.to_string())
                        .attr("completeListSize", total.to_string())
                        .attr("expirationDate", format_datestamp(&token.expires_at))
                        .text(self.tokens.encode(&token)),
                );
            }
            None if args.resumed => body.push(
                Element::new("resumptionToken")
                    .attr("cursor", args.cursor.to_string())
                    .attr("completeListSize", total.to_string()),
            ),
            None => {}
        }

        debug!(
            verb = %verb,
            delivered = page.len(),
            total,
            more,
            "list page built"
        );
        Ok(body)
    }

    fn resume(&self, verb: Verb, raw: &str, now: DateTime<Utc>) -> Result<ListArgs, OaiError> {
        let token = self.tokens.decode(raw, verb, now)?;
        Ok(ListArgs {
            prefix: token.prefix,
            set: token.set,
            from: token.from,
            until: token.until,
            cursor: token.cursor,
            last: Some(token.last),
            generation: token.generation,
            resumed: true,
        })
    }

    fn fresh_args(&self, request: &OaiRequest) -> Result<ListArgs, OaiError> {
        let prefix = request.required("metadataPrefix")?;
        let from = request.get("from").map(str::to_string);
        let until = request.get("until").map(str::to_string);
        // Dates are checked before the format and set, as argument syntax.
        parse_range(from.as_deref(), until.as_deref())?;

        if !self.crosswalks.contains(prefix) {
            return Err(unknown_format(prefix));
        }

        let set = request.get("set").map(str::to_string);
        if let Some(name) = &set {
            if self.registry.is_empty() {
                return Err(no_set_hierarchy());
            }
            if !self.registry.contains(name) {
                return Err(OaiError::bad_argument(format!("Unknown set: {name}")));
            }
        }

        Ok(ListArgs {
            prefix: prefix.to_string(),
            set,
            from,
            until,
            cursor: 0,
            last: None,
            generation: None,
            resumed: false,
        })
    }

    fn header(&self, record: &Record) -> Element {
        let mut header = Element::new("header")
            .child(Element::new("identifier").text(record.identifier.as_str()))
            .child(Element::new("datestamp").text(format_datestamp(&record.datestamp)));
        for set in self.registry.snapshots().sets_containing(&record.identifier) {
            header.push(Element::new("setSpec").text(set));
        }
        header
    }
}

/// Parses optional `from`/`until`, requiring equal granularity and order.
fn parse_range(
    from: Option<&str>,
    until: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), OaiError> {
    let from = from.map(|v| parse_datestamp(v, Bound::From)).transpose()?;
    let until = until.map(|v| parse_datestamp(v, Bound::Until)).transpose()?;

    if let (Some((f, fg)), Some((u, ug))) = (from, until) {
        if fg != ug {
            return Err(OaiError::bad_argument(
                "from and until must have the same granularity",
            ));
        }
        if f > u {
            return Err(OaiError::bad_argument("from must not be later than until"));
        }
    }
    Ok((from.map(|(d, _)| d), until.map(|(d, _)| d)))
}

fn id_does_not_exist(identifier: &str) -> OaiError {
    OaiError::new(
        ErrorCode::IdDoesNotExist,
        format!("No matching identifier in this repository: {identifier}"),
    )
}

fn unknown_format(prefix: &str) -> OaiError {
    OaiError::new(
        ErrorCode::CannotDisseminateFormat,
        format!("Metadata format not supported by this repository: {prefix}"),
    )
}

fn no_records_match() -> OaiError {
    OaiError::new(
        ErrorCode::NoRecordsMatch,
        "The combination of the values of the from, until, set and metadataPrefix arguments results in an empty list",
    )
}

fn no_set_hierarchy() -> OaiError {
    OaiError::new(
        ErrorCode::NoSetHierarchy,
        "This repository does not support sets",
    )
}
