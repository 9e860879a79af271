//! In-memory [`RecordStore`] used by the demo binary and the test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::model::Record;
use crate::traits::{RecordStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
    offline: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// Publishes a record or a new version of it. A stale datestamp is ignored.
    pub fn upsert(&self, record: Record) {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match records.get(&record.identifier) {
            Some(existing) if existing.datestamp > record.datestamp => {
                tracing::warn!(
                    identifier = %record.identifier,
                    "ignoring record update with an older datestamp"
                );
            }
            _ => {
                records.insert(record.identifier.clone(), record);
            }
        }
    }

    /// Retracts a record. Returns whether it was present.
    pub fn remove(&self, identifier: &str) -> bool {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.remove(identifier).is_some()
    }

    /// Simulates the backing storage going away (and coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Record>> {
        match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn all_records(&self) -> Result<Vec<Record>, StoreError> {
        self.check_online()?;
        Ok(self.read().values().cloned().collect())
    }

    async fn get(&self, identifier: &str) -> Result<Option<Record>, StoreError> {
        self.check_online()?;
        Ok(self.read().get(identifier).cloned())
    }

    async fn get_many(&self, identifiers: &[String]) -> Result<Vec<Record>, StoreError> {
        self.check_online()?;
        let records = self.read();
        Ok(identifiers
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }
}
