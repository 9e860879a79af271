use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::registry::SetRegistry;
use super::snapshot::SnapshotStore;
use super::{ExportError, SetError};
use crate::model::SetContent;
use crate::traits::RecordStore;

/// Outcome of re-exporting every set.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportSummary {
    pub exported: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Materializes set definitions into membership snapshots.
pub struct SetExporter {
    registry: Arc<SetRegistry>,
    store: Arc<dyn RecordStore>,
}

impl SetExporter {
    pub fn new(registry: Arc<SetRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    fn snapshots(&self) -> &Arc<SnapshotStore> {
        self.registry.snapshots()
    }

    /// Names of all live sets.
    pub fn set_names(&self) -> Vec<String> {
        self.registry.list().into_iter().map(|s| s.name).collect()
    }

    /// Live sets whose most recent export failed.
    pub fn failed_sets(&self) -> Vec<String> {
        self.snapshots()
            .failed_sets()
            .into_iter()
            .filter(|name| self.registry.contains(name))
            .collect()
    }

    /// Rebuilds one set's snapshot from the current corpus and swaps it in.
    ///
    /// Exports of the same set run one at a time; the definition is read after
    /// the set's export lock is taken so the newest definition always wins.
    /// On failure the previous snapshot stays in place and the failure is
    /// recorded on the set for a later retry.
    #[instrument(skip(self))]
    pub async fn export(&self, set_name: &str) -> Result<Arc<SetContent>, ExportError> {
        if !self.registry.contains(set_name) {
            return Err(ExportError::NotFound(set_name.to_string()));
        }

        let slot = self.snapshots().slot_or_create(set_name);
        let _guard = slot.export_lock.lock().await;

        if slot.is_purged() {
            return Err(ExportError::Deleted(set_name.to_string()));
        }
        let query = match self.registry.query(set_name) {
            Ok(query) => query,
            Err(SetError::NotFound(_)) => {
                // Deleted between the check above and taking the lock.
                self.snapshots().remove_slot(set_name, &slot);
                return Err(ExportError::Deleted(set_name.to_string()));
            }
            Err(e) => {
                let failure = slot.record_failure(e.to_string());
                warn!(set = %set_name, attempts = failure.attempts, error = %e, "set export failed");
                return Err(ExportError::Definition(e));
            }
        };
        slot.clear_stale();

        let started = std::time::Instant::now();
        let records = match self.store.all_records().await {
            Ok(records) => records,
            Err(e) => {
                let failure = slot.record_failure(e.to_string());
                warn!(
                    set = %set_name,
                    attempts = failure.attempts,
                    error = %e,
                    "set export failed, previous snapshot keeps serving"
                );
                return Err(ExportError::Store {
                    set: set_name.to_string(),
                    source: e,
                });
            }
        };

        let mut identifiers: Vec<String> = records
            .into_iter()
            .filter(|r| query.matches(&r.metadata))
            .map(|r| r.identifier)
            .collect();
        identifiers.sort();
        identifiers.dedup();

        let content = slot.publish(SetContent {
            set_name: set_name.to_string(),
            identifiers,
            generation: self.snapshots().next_generation(),
            generated_at: Utc::now(),
        });

        info!(
            set = %set_name,
            generation = content.generation,
            records = content.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "set exported"
        );
        Ok(content)
    }

    /// Re-exports every set. A failing set is reported and skipped.
    #[instrument(skip(self))]
    pub async fn export_all(&self) -> ExportSummary {
        let mut summary = ExportSummary::default();
        for set in self.registry.list() {
            match self.export(&set.name).await {
                Ok(_) => summary.exported.push(set.name),
                Err(e) => summary.failed.push((set.name, e.to_string())),
            }
        }
        info!(
            exported = summary.exported.len(),
            failed = summary.failed.len(),
            "export of all sets finished"
        );
        summary
    }
}
