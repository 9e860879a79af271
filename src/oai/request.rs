use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use super::{ErrorCode, OaiError, Verb};

/// The arguments of one protocol request, in the order they were sent.
///
/// Kept as a list rather than a map so repeated arguments can be rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaiRequest {
    args: Vec<(String, String)>,
}

impl OaiRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            args: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses an `application/x-www-form-urlencoded` query string. A leading
    /// `?` is ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn count(&self, name: &str) -> usize {
        self.args.iter().filter(|(k, _)| k == name).count()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.args
    }

    /// Resolves the single `verb` argument.
    pub fn verb(&self) -> Result<Verb, OaiError> {
        match self.count("verb") {
            0 => Err(OaiError::new(ErrorCode::BadVerb, "Missing OAI verb")),
            1 => self.get("verb").unwrap_or_default().parse(),
            _ => Err(OaiError::new(ErrorCode::BadVerb, "Repeated OAI verb")),
        }
    }

    /// Checks argument names and multiplicity against what `verb` accepts.
    pub fn check_arguments(&self, verb: Verb) -> Result<(), OaiError> {
        let allowed = verb.allowed_arguments();
        for (name, _) in &self.args {
            if name == "verb" {
                continue;
            }
            if !allowed.contains(&name.as_str()) {
                return Err(OaiError::bad_argument(format!(
                    "Illegal argument for {verb}: {name}"
                )));
            }
            if self.count(name) > 1 {
                return Err(OaiError::bad_argument(format!(
                    "Repeated argument: {name}"
                )));
            }
        }
        if self.get("resumptionToken").is_some() && self.args.len() > 2 {
            return Err(OaiError::bad_argument(
                "resumptionToken is an exclusive argument",
            ));
        }
        Ok(())
    }

    /// Non-empty value of a required argument.
    pub fn required(&self, name: &str) -> Result<&str, OaiError> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OaiError::bad_argument(format!("Missing required argument: {name}")))
    }
}

/// Datestamp granularity of a `from`/`until` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Second,
}

/// Which end of a range a datestamp bounds. A day-granularity `until`
/// covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    From,
    Until,
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DDThh:mm:ssZ`.
pub fn parse_datestamp(
    value: &str,
    bound: Bound,
) -> Result<(DateTime<Utc>, Granularity), OaiError> {
    let invalid = || OaiError::bad_argument(format!("Illegal datestamp: {value}"));

    match value.len() {
        10 => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
            let time = match bound {
                Bound::From => NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(invalid)?,
                Bound::Until => NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(invalid)?,
            };
            Ok((Utc.from_utc_datetime(&date.and_time(time)), Granularity::Day))
        }
        20 => {
            let stamp = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ")
                .map_err(|_| invalid())?;
            Ok((Utc.from_utc_datetime(&stamp), Granularity::Second))
        }
        _ => Err(invalid()),
    }
}

/// Formats a datestamp at the repository's granularity.
pub fn format_datestamp(stamp: &DateTime<Utc>) -> String {
    stamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
