//! Resumption tokens.
//!
//! A token is the JSON form of [`ResumptionToken`] in URL-safe base64 with no
//! padding. Everything needed to resume a listing travels in the token; the
//! server keeps no session. A token for a set listing pins the snapshot
//! generation it was cut from and stops decoding once that set is re-exported
//! or deleted.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Verb;
use crate::sets::SnapshotStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not base64, not JSON, or not a token at all
    #[error("The value of the resumptionToken argument is invalid")]
    Malformed,

    #[error("The resumptionToken has expired")]
    Expired,

    /// The set was re-exported or deleted since the token was issued
    #[error("The resumptionToken refers to a set that has changed since it was issued")]
    GenerationMismatch,

    /// Issued for a different verb than the one it was presented with
    #[error("The resumptionToken was not issued for {0}")]
    WrongVerb(Verb),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionToken {
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    /// `from` and `until` are kept as sent so their granularity survives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    pub prefix: String,
    /// Records delivered before the page this token resumes.
    pub cursor: usize,
    /// Identifier of the last record delivered.
    pub last: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks resumption tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    ttl: Duration,
    snapshots: Arc<SnapshotStore>,
}

impl TokenCodec {
    pub fn new(ttl: Duration, snapshots: Arc<SnapshotStore>) -> Self {
        Self { ttl, snapshots }
    }

    /// Expiration time for a token issued at `now`.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        now.checked_add_signed(ttl).unwrap_or(now)
    }

    pub fn encode(&self, token: &ResumptionToken) -> String {
        // Serializing a plain struct of strings and integers cannot fail.
        let json = serde_json::to_vec(token).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes `raw`, presented with `verb` at time `now`.
    pub fn decode(
        &self,
        raw: &str,
        verb: Verb,
        now: DateTime<Utc>,
    ) -> Result<ResumptionToken, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| TokenError::Malformed)?;
        let token: ResumptionToken =
            serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

        if token.verb != verb {
            return Err(TokenError::WrongVerb(verb));
        }
        if token.expires_at <= now {
            return Err(TokenError::Expired);
        }
        self.check_generation(&token)?;
        Ok(token)
    }

    /// Whether `token` still refers to the snapshot it was cut from.
    pub fn check_generation(&self, token: &ResumptionToken) -> Result<(), TokenError> {
        match &token.set {
            Some(set) => {
                let current = self.snapshots.generation(set);
                if current.is_none() || current != token.generation {
                    return Err(TokenError::GenerationMismatch);
                }
                Ok(())
            }
            None if token.generation.is_some() => Err(TokenError::GenerationMismatch),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetContent;

    fn codec() -> (TokenCodec, Arc<SnapshotStore>) {
        let snapshots = Arc::new(SnapshotStore::new());
        (
            TokenCodec::new(Duration::from_secs(60), Arc::clone(&snapshots)),
            snapshots,
        )
    }

    fn publish(snapshots: &SnapshotStore, set: &str) -> u64 {
        let generation = snapshots.next_generation();
        snapshots.slot_or_create(set).publish(SetContent {
            set_name: set.to_string(),
            identifiers: vec!["doi:1".to_string()],
            generation,
            generated_at: Utc::now(),
        });
        generation
    }

    fn token(codec: &TokenCodec, set: Option<&str>, generation: Option<u64>) -> ResumptionToken {
        ResumptionToken {
            verb: Verb::ListRecords,
            set: set.map(str::to_string),
            from: Some("2024-01-01".to_string()),
            until: None,
            prefix: "oai_dc".to_string(),
            cursor: 10,
            last: "doi:10.5072/FK2/J".to_string(),
            generation,
            expires_at: codec.expiry(Utc::now()),
        }
    }

    #[test]
    fn test_decode_restores_token() {
        let (codec, snapshots) = codec();
        let generation = publish(&snapshots, "finches");
        let original = token(&codec, Some("finches"), Some(generation));

        let raw = codec.encode(&original);
        assert!(raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = codec.decode(&raw, Verb::ListRecords, Utc::now()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (codec, _) = codec();
        assert_eq!(
            codec.decode("not a token!", Verb::ListRecords, Utc::now()),
            Err(TokenError::Malformed)
        );
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert_eq!(
            codec.decode(&not_json, Verb::ListRecords, Utc::now()),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (codec, _) = codec();
        let raw = codec.encode(&token(&codec, None, None));
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(
            codec.decode(&raw, Verb::ListRecords, later),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_reexport_invalidates_set_token() {
        let (codec, snapshots) = codec();
        let generation = publish(&snapshots, "finches");
        let raw = codec.encode(&token(&codec, Some("finches"), Some(generation)));

        publish(&snapshots, "finches");
        assert_eq!(
            codec.decode(&raw, Verb::ListRecords, Utc::now()),
            Err(TokenError::GenerationMismatch)
        );
    }

    #[tokio::test]
    async fn test_deleted_set_invalidates_token() {
        let (codec, snapshots) = codec();
        let generation = publish(&snapshots, "finches");
        let raw = codec.encode(&token(&codec, Some("finches"), Some(generation)));

        snapshots.purge("finches").await;
        assert_eq!(
            codec.decode(&raw, Verb::ListRecords, Utc::now()),
            Err(TokenError::GenerationMismatch)
        );
    }

    #[test]
    fn test_token_is_bound_to_its_verb() {
        let (codec, _) = codec();
        let raw = codec.encode(&token(&codec, None, None));
        assert_eq!(
            codec.decode(&raw, Verb::ListIdentifiers, Utc::now()),
            Err(TokenError::WrongVerb(Verb::ListIdentifiers))
        );
    }
}
