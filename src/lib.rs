pub mod cache;
pub mod config;
pub mod crosswalk;
pub mod executor;
pub mod management;
pub mod model;
pub mod oai;
pub mod query;
pub mod server;
pub mod sets;
pub mod store;
pub mod traits;
pub mod xml;

// Re-export common types for convenience
pub use cache::RenderCache;
pub use config::ServerConfig;
pub use crosswalk::{default_registry, Crosswalk, CrosswalkRegistry, RenderingError};
pub use executor::*;
pub use management::{ApiError, ApiResponse, ManagementApi, Requester, SetRequest};
pub use model::*;
pub use oai::{ErrorCode, OaiError, OaiRequest, OaiResponse, ServerError};
pub use server::{CorpusEvent, HarvestingServer};
pub use sets::{ExportError, SetError, SetRegistry};
pub use store::InMemoryRecordStore;
pub use traits::*;
