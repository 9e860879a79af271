//! Wiring of the harvesting engine.
//!
//! [`HarvestingServer`] owns one instance of every component and hands out
//! the two surfaces: protocol requests and set management. Corpus changes are
//! fed in through [`HarvestingServer::on_corpus_event`].

use std::sync::Arc;

use tracing::info;

use crate::cache::RenderCache;
use crate::config::ServerConfig;
use crate::crosswalk::{default_registry, CrosswalkRegistry, FormatError};
use crate::executor::{ExportHandle, ExportQueue};
use crate::management::ManagementApi;
use crate::oai::{Dispatcher, OaiRequest, OaiResponse, ServerError};
use crate::sets::{ExportSummary, SetExporter, SetRegistry, SnapshotStore};
use crate::traits::RecordStore;

/// A change to the published corpus, reported by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusEvent {
    Published(String),
    Updated(String),
    Retracted(String),
}

pub struct HarvestingServer {
    config: Arc<ServerConfig>,
    registry: Arc<SetRegistry>,
    cache: Arc<RenderCache>,
    queue: ExportQueue,
    dispatcher: Dispatcher,
    management: ManagementApi,
}

impl HarvestingServer {
    /// Server with the built-in metadata formats.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Result<Self, FormatError> {
        Ok(Self::with_crosswalks(config, store, default_registry()?))
    }

    pub fn with_crosswalks(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        crosswalks: CrosswalkRegistry,
    ) -> Self {
        let config = Arc::new(config);
        let crosswalks = Arc::new(crosswalks);
        let registry = Arc::new(SetRegistry::new(Arc::new(SnapshotStore::new())));
        let cache = Arc::new(RenderCache::new(
            Arc::clone(&crosswalks),
            config.render_failure_ttl,
        ));
        let exporter = Arc::new(SetExporter::new(Arc::clone(&registry), Arc::clone(&store)));
        let queue = ExportQueue::new(exporter, config.export_concurrency);

        let dispatcher = Dispatcher::new(
            Arc::clone(&config),
            store,
            Arc::clone(&registry),
            Arc::clone(&crosswalks),
            Arc::clone(&cache),
        );
        let management = ManagementApi::new(Arc::clone(&registry), queue.clone());

        info!(
            base_url = %config.base_url,
            formats = crosswalks.formats().len(),
            page_size = config.page_size,
            "harvesting server ready"
        );
        Self {
            config,
            registry,
            cache,
            queue,
            dispatcher,
            management,
        }
    }

    pub async fn handle(&self, request: &OaiRequest) -> Result<OaiResponse, ServerError> {
        self.dispatcher.handle(request).await
    }

    /// Answers a raw `application/x-www-form-urlencoded` query string.
    pub async fn handle_query(&self, query: &str) -> Result<OaiResponse, ServerError> {
        self.handle(&OaiRequest::from_query(query)).await
    }

    pub fn management(&self) -> &ManagementApi {
        &self.management
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SetRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    pub fn exports(&self) -> &ExportQueue {
        &self.queue
    }

    /// Reacts to a corpus change: drops stale renderings of a retracted
    /// record and queues a re-export of every set.
    pub fn on_corpus_event(&self, event: CorpusEvent) -> ExportHandle<ExportSummary> {
        match &event {
            CorpusEvent::Retracted(identifier) => self.cache.purge(identifier),
            // Newer datestamps already miss the cache.
            CorpusEvent::Published(_) | CorpusEvent::Updated(_) => {}
        }
        info!(event = ?event, "corpus changed, re-exporting sets");
        self.queue.submit_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalMetadata, Record};
    use crate::store::InMemoryRecordStore;
    use chrono::Utc;

    fn record(id: &str) -> Record {
        Record {
            identifier: id.to_string(),
            datestamp: Utc::now(),
            metadata: CanonicalMetadata {
                persistent_id: id.to_string(),
                title: "Finches".to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_retraction_purges_cache_and_reexports() {
        let store = Arc::new(InMemoryRecordStore::with_records([record("doi:1"), record("doi:2")]));
        let server = HarvestingServer::new(ServerConfig::default(), store.clone()).unwrap();
        server.registry().create("all", "*", None).unwrap();
        server.exports().submit("all").wait().await.unwrap();

        let resp = server
            .handle_query("verb=GetRecord&identifier=doi:1&metadataPrefix=oai_dc")
            .await
            .unwrap();
        assert!(!resp.is_error());
        assert_eq!(server.cache().len(), 1);

        store.remove("doi:1");
        let summary = server
            .on_corpus_event(CorpusEvent::Retracted("doi:1".to_string()))
            .wait()
            .await
            .unwrap();
        assert_eq!(summary.exported, vec!["all"]);
        assert!(server.cache().is_empty());
        assert_eq!(
            server.registry().snapshots().current("all").unwrap().identifiers,
            vec!["doi:2"]
        );
    }
}
