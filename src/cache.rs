//! Rendered-record cache.
//!
//! Renderings are keyed by (identifier, prefix) and tagged with the datestamp
//! they were rendered from; a record whose datestamp has advanced misses and is
//! re-rendered. Each entry is a `tokio::sync::OnceCell`, so concurrent requests
//! for the same missing entry wait on a single computation. Failed renderings
//! are kept as negative entries for a short TTL. Stored renderings are XML
//! fragments and never carry a prolog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::crosswalk::{CrosswalkRegistry, RenderingError};
use crate::model::Record;

#[derive(Debug, Clone)]
enum Outcome {
    Rendered(Arc<str>),
    Failed { error: RenderingError, at: Instant },
}

#[derive(Debug)]
struct Entry {
    datestamp: DateTime<Utc>,
    cell: OnceCell<Outcome>,
}

impl Entry {
    fn new(datestamp: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            datestamp,
            cell: OnceCell::new(),
        })
    }

    fn failure_expired(&self, ttl: Duration) -> bool {
        matches!(self.cell.get(), Some(Outcome::Failed { at, .. }) if at.elapsed() >= ttl)
    }
}

type Key = (String, String);

#[derive(Debug)]
pub struct RenderCache {
    crosswalks: Arc<CrosswalkRegistry>,
    failure_ttl: Duration,
    entries: Mutex<HashMap<Key, Arc<Entry>>>,
    computations: AtomicU64,
}

impl RenderCache {
    pub fn new(crosswalks: Arc<CrosswalkRegistry>, failure_ttl: Duration) -> Self {
        Self {
            crosswalks,
            failure_ttl,
            entries: Mutex::new(HashMap::new()),
            computations: AtomicU64::new(0),
        }
    }

    /// Serialized `<metadata>` payload of `record` in `prefix`, without prolog.
    #[instrument(skip(self, record), fields(identifier = %record.identifier))]
    pub async fn get_rendering(
        &self,
        record: &Record,
        prefix: &str,
    ) -> Result<Arc<str>, RenderingError> {
        let entry = self.entry_for(record, prefix);

        let outcome = entry
            .cell
            .get_or_init(|| self.compute(record.clone(), prefix.to_string()))
            .await;

        match outcome {
            Outcome::Rendered(xml) => Ok(Arc::clone(xml)),
            Outcome::Failed { error, .. } => Err(error.clone()),
        }
    }

    /// Drops every rendering of a retracted record.
    pub fn purge(&self, identifier: &str) {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(id, _), _| id != identifier);
        debug!(identifier, dropped = before - entries.len(), "purged cached renderings");
    }

    /// Number of crosswalk computations performed so far.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn entry_for(&self, record: &Record, prefix: &str) -> Arc<Entry> {
        let key = (record.identifier.clone(), prefix.to_string());
        let mut entries = self.lock();

        if let Some(entry) = entries.get(&key) {
            // Caller holds an older version than the one cached; render it
            // on the side without disturbing the newer entry.
            if entry.datestamp > record.datestamp {
                return Entry::new(record.datestamp);
            }
            if entry.datestamp == record.datestamp && !entry.failure_expired(self.failure_ttl) {
                return Arc::clone(entry);
            }
        }

        let fresh = Entry::new(record.datestamp);
        entries.insert(key, Arc::clone(&fresh));
        fresh
    }

    async fn compute(&self, record: Record, prefix: String) -> Outcome {
        self.computations.fetch_add(1, Ordering::SeqCst);
        debug!(identifier = %record.identifier, prefix = %prefix, "rendering record");

        let crosswalks = Arc::clone(&self.crosswalks);
        let identifier = record.identifier.clone();
        let task_prefix = prefix.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            crosswalks
                .render(&record.metadata, &task_prefix)
                .map(|el| el.to_fragment())
        })
        .await
        .map_err(|e| RenderingError::Task(e.to_string()))
        .and_then(|r| r);

        match rendered {
            Ok(fragment) => Outcome::Rendered(Arc::from(fragment)),
            Err(error) => {
                warn!(identifier = %identifier, prefix = %prefix, error = %error, "rendering failed");
                Outcome::Failed {
                    error,
                    at: Instant::now(),
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Arc<Entry>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosswalk::Crosswalk;
    use crate::model::CanonicalMetadata;
    use crate::xml::Element;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    /// Counts its invocations and takes a while, so concurrent callers overlap.
    struct SlowCounting {
        calls: Arc<AtomicUsize>,
    }

    impl Crosswalk for SlowCounting {
        fn render(&self, md: &CanonicalMetadata) -> Result<Element, RenderingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            if md.title.is_empty() {
                return Err(RenderingError::missing("slow", "title"));
            }
            Ok(Element::new("slow").text(md.title.clone()))
        }
    }

    fn plain(md: &CanonicalMetadata) -> Result<Element, RenderingError> {
        Ok(Element::new("plain").text(md.title.clone()))
    }

    fn record(title: &str, day: u32) -> Record {
        Record {
            identifier: "doi:10.5072/FK2/A".to_string(),
            datestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            metadata: CanonicalMetadata {
                persistent_id: "doi:10.5072/FK2/A".to_string(),
                title: title.to_string(),
                ..Default::default()
            },
        }
    }

    fn cache(ttl: Duration) -> (Arc<RenderCache>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = CrosswalkRegistry::new();
        registry
            .register(
                "slow",
                "s",
                "n",
                SlowCounting {
                    calls: Arc::clone(&calls),
                },
            )
            .unwrap();
        registry.register("plain", "s", "n", plain).unwrap();
        (Arc::new(RenderCache::new(Arc::new(registry), ttl)), calls)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_computation() {
        let (cache, calls) = cache(Duration::from_secs(60));
        let rec = record("Finches", 1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let rec = rec.clone();
            handles.push(tokio::spawn(async move {
                cache.get_rendering(&rec, "slow").await
            }));
        }
        for handle in handles {
            assert_eq!(&*handle.await.unwrap().unwrap(), "<slow>Finches</slow>");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.computations(), 1);
    }

    #[tokio::test]
    async fn test_datestamp_advance_invalidates() {
        let (cache, calls) = cache(Duration::from_secs(60));
        cache.get_rendering(&record("Old", 1), "slow").await.unwrap();
        cache.get_rendering(&record("Old", 1), "slow").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let newer = cache.get_rendering(&record("New", 2), "slow").await.unwrap();
        assert_eq!(&*newer, "<slow>New</slow>");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_cached_for_ttl_only() {
        let (cache, calls) = cache(Duration::from_millis(100));
        let broken = record("", 1);

        assert!(cache.get_rendering(&broken, "slow").await.is_err());
        assert!(cache.get_rendering(&broken, "slow").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get_rendering(&broken, "slow").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_purge_drops_all_prefixes() {
        let (cache, calls) = cache(Duration::from_secs(60));
        let rec = record("T", 1);
        cache.get_rendering(&rec, "slow").await.unwrap();
        cache.get_rendering(&rec, "plain").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.purge(&rec.identifier);
        assert!(cache.is_empty());
        cache.get_rendering(&rec, "slow").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_rendering_error() {
        let (cache, _) = cache(Duration::from_secs(60));
        assert_eq!(
            cache.get_rendering(&record("T", 1), "nope").await,
            Err(RenderingError::UnknownFormat("nope".to_string()))
        );
    }
}
