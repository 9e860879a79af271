use crate::model::Record;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Read access to the repository's published records.
///
/// The dataset/version storage and publishing workflow live outside this crate;
/// the harvesting engine only ever reads through this seam.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every currently published record. Retracted records are simply absent.
    async fn all_records(&self) -> Result<Vec<Record>, StoreError>;

    /// The published record with this persistent identifier, if any.
    async fn get(&self, identifier: &str) -> Result<Option<Record>, StoreError>;

    /// Looks up several identifiers at once, skipping the ones that are gone.
    async fn get_many(&self, identifiers: &[String]) -> Result<Vec<Record>, StoreError> {
        let mut out = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            if let Some(record) = self.get(id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
