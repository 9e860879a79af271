use crate::model::SetContent;
use crate::sets::{ExportError, ExportSummary, SetExporter};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, instrument, warn};

/// Handle to a submitted export. Dropping it does not cancel the export.
#[derive(Debug)]
pub struct ExportHandle<T> {
    task: JoinHandle<Result<T, ExportError>>,
}

impl<T> ExportHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<T, ExportError> {
        self.task
            .await
            .map_err(|e| ExportError::Task(format!("Join error: {}", e)))?
    }
}

/// Runs set exports in the background, at most `concurrency_limit` at a time.
///
/// Callers get a handle back immediately; nothing on the request path waits
/// for an export.
#[derive(Clone)]
pub struct ExportQueue {
    exporter: Arc<SetExporter>,
    semaphore: Arc<Semaphore>,
}

impl ExportQueue {
    pub fn new(exporter: Arc<SetExporter>, concurrency_limit: usize) -> Self {
        Self {
            exporter,
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    #[instrument(skip(self))]
    pub fn submit(&self, set_name: &str) -> ExportHandle<Arc<SetContent>> {
        let exporter = Arc::clone(&self.exporter);
        let semaphore = Arc::clone(&self.semaphore);
        let set_name = set_name.to_string();

        info!("Queued export for set: {}", set_name);
        let task = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExportError::Task(format!("Semaphore error: {}", e)))?;
            exporter.export(&set_name).await
        });
        ExportHandle { task }
    }

    /// Exports every set, independently and concurrently (within the limit).
    #[instrument(skip(self))]
    pub fn submit_all(&self) -> ExportHandle<ExportSummary> {
        let queue = self.clone();
        let task = tokio::spawn(async move {
            let mut set = JoinSet::new();
            for name in queue.exporter.set_names() {
                let handle = queue.submit(&name);
                set.spawn(async move { (name, handle.wait().await) });
            }

            let mut summary = ExportSummary::default();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((name, Ok(_))) => summary.exported.push(name),
                    Ok((name, Err(e))) => summary.failed.push((name, e.to_string())),
                    Err(e) => warn!(error = %e, "export task panicked"),
                }
            }
            summary.exported.sort();
            summary.failed.sort();
            info!(
                exported = summary.exported.len(),
                failed = summary.failed.len(),
                "Finished export of all sets"
            );
            Ok(summary)
        });
        ExportHandle { task }
    }

    /// Resubmits every set whose last export failed.
    pub fn retry_failed(&self) -> Vec<(String, ExportHandle<Arc<SetContent>>)> {
        self.exporter
            .failed_sets()
            .into_iter()
            .map(|name| {
                let handle = self.submit(&name);
                (name, handle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalMetadata, Record};
    use crate::sets::{SetRegistry, SnapshotStore};
    use crate::store::InMemoryRecordStore;
    use chrono::Utc;

    fn setup() -> (Arc<SetRegistry>, Arc<InMemoryRecordStore>, ExportQueue) {
        let registry = Arc::new(SetRegistry::new(Arc::new(SnapshotStore::new())));
        let store = Arc::new(InMemoryRecordStore::with_records([Record {
            identifier: "doi:1".to_string(),
            datestamp: Utc::now(),
            metadata: CanonicalMetadata {
                persistent_id: "doi:1".to_string(),
                title: "One".to_string(),
                ..Default::default()
            },
        }]));
        let exporter = Arc::new(SetExporter::new(Arc::clone(&registry), store.clone()));
        (registry, store, ExportQueue::new(exporter, 2))
    }

    #[tokio::test]
    async fn test_submit_returns_pollable_handle() {
        let (registry, _store, queue) = setup();
        registry.create("s", "*", None).unwrap();

        let handle = queue.submit("s");
        let content = handle.wait().await.unwrap();
        assert_eq!(content.identifiers, vec!["doi:1"]);
        assert_eq!(registry.snapshots().generation("s"), Some(content.generation));
    }

    #[tokio::test]
    async fn test_submit_all_exports_every_set() {
        let (registry, _store, queue) = setup();
        for name in ["a", "b", "c"] {
            registry.create(name, "*", None).unwrap();
        }
        let summary = queue.submit_all().wait().await.unwrap();
        assert_eq!(summary.exported, vec!["a", "b", "c"]);
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_retry_failed_resubmits() {
        let (registry, store, queue) = setup();
        registry.create("s", "*", None).unwrap();

        store.set_offline(true);
        assert!(queue.submit("s").wait().await.is_err());

        store.set_offline(false);
        let retries = queue.retry_failed();
        assert_eq!(retries.len(), 1);
        for (_, handle) in retries {
            handle.wait().await.unwrap();
        }
        assert!(queue.retry_failed().is_empty());
    }
}
