//! Server configuration.
//!
//! Defaults are usable as-is; [`ServerConfig::from_env`] overrides them from
//! `OAI_*` environment variables for the binary.

use std::time::Duration;

/// OAI-PMH protocol version served.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Deleted-record policy advertised in `Identify`.
pub const DELETED_RECORD_POLICY: &str = "transient";

/// Finest datestamp granularity supported.
pub const GRANULARITY: &str = "YYYY-MM-DDThh:mm:ssZ";

/// Default number of headers/records per list page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default resumption token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Default lifetime of a cached rendering failure.
pub const DEFAULT_RENDER_FAILURE_TTL_SECS: u64 = 60;

/// Default number of set exports allowed to run at once.
pub const DEFAULT_EXPORT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    pub repository_name: String,
    pub admin_email: String,
    pub page_size: usize,
    pub token_ttl: Duration,
    pub render_failure_ttl: Duration,
    pub export_concurrency: usize,
}

impl ServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            repository_name: "Dataverse OAI Archive".to_string(),
            admin_email: "support@localhost".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            render_failure_ttl: Duration::from_secs(DEFAULT_RENDER_FAILURE_TTL_SECS),
            export_concurrency: DEFAULT_EXPORT_CONCURRENCY,
        }
    }

    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OAI_BASE_URL").unwrap_or_else(|_| "http://localhost:8080/oai".into());

        let mut config = Self::new(base_url);

        if let Ok(name) = std::env::var("OAI_REPOSITORY_NAME") {
            config.repository_name = name;
        }
        if let Ok(email) = std::env::var("OAI_ADMIN_EMAIL") {
            config.admin_email = email;
        }

        let page_size = std::env::var("OAI_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let token_ttl_secs: u64 = std::env::var("OAI_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        let render_failure_ttl_secs: u64 = std::env::var("OAI_RENDER_FAILURE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RENDER_FAILURE_TTL_SECS);

        let export_concurrency = std::env::var("OAI_EXPORT_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_EXPORT_CONCURRENCY);

        config.page_size = page_size;
        config.token_ttl = Duration::from_secs(token_ttl_secs);
        config.render_failure_ttl = Duration::from_secs(render_failure_ttl_secs);
        config.export_concurrency = export_concurrency;
        config
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_render_failure_ttl(mut self, ttl: Duration) -> Self {
        self.render_failure_ttl = ttl;
        self
    }

    pub fn with_export_concurrency(mut self, concurrency: usize) -> Self {
        self.export_concurrency = concurrency.max(1);
        self
    }

    pub fn with_repository_name(mut self, name: impl Into<String>) -> Self {
        self.repository_name = name.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/oai")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_zero_page_size() {
        let config = ServerConfig::new("http://example.org/oai").with_page_size(0);
        assert_eq!(config.page_size, 1);
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.base_url, "http://localhost:8080/oai");
    }
}
