use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use crate::model::Record;
use crate::sets::SnapshotStore;
use crate::traits::{RecordStore, StoreError};

/// Records selected for a listing, in ascending identifier order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub records: Vec<Record>,
    /// Snapshot generation the set membership was read from. `None` for
    /// whole-corpus listings and for sets that were never exported.
    pub generation: Option<u64>,
}

/// Selective harvesting: set membership intersected with a datestamp range.
#[derive(Clone)]
pub struct HarvestFilter {
    store: Arc<dyn RecordStore>,
    snapshots: Arc<SnapshotStore>,
}

impl HarvestFilter {
    pub fn new(store: Arc<dyn RecordStore>, snapshots: Arc<SnapshotStore>) -> Self {
        Self { store, snapshots }
    }

    /// Both bounds are inclusive. Datestamps are compared at the one-second
    /// granularity they are published with. The caller checks that `set`
    /// exists.
    pub async fn filter(
        &self,
        set: Option<&str>,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Selection, StoreError> {
        let (mut records, generation) = match set {
            Some(name) => match self.snapshots.current(name) {
                // The snapshot is loaded once so the whole listing reads
                // one generation.
                Some(content) => (
                    self.store.get_many(&content.identifiers).await?,
                    Some(content.generation),
                ),
                None => (Vec::new(), None),
            },
            None => (self.store.all_records().await?, None),
        };

        records.retain(|r| {
            let stamp = r.datestamp.trunc_subsecs(0);
            from.map_or(true, |from| stamp >= from) && until.map_or(true, |until| stamp <= until)
        });
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        records.dedup_by(|a, b| a.identifier == b.identifier);

        debug!(set = ?set, matched = records.len(), "filtered records");
        Ok(Selection {
            records,
            generation,
        })
    }
}
