//! HTTP Client Factory
//!
//! Central place that builds HTTP clients with the configured timeouts and a
//! standard user agent, so providers never construct reqwest clients ad hoc.

use std::time::Duration;

use tracing::debug;

use crate::config::HttpConfig;
use crate::errors::AppResult;
use crate::utils::StandardHttpClient;

#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    connect_timeout: Duration,
    request_timeout: Duration,
    user_agent: String,
}

impl HttpClientFactory {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.connect_timeout, config.request_timeout)
    }

    /// Create an HTTP client for a named upstream service
    pub fn create_client_for_service(&self, service_name: &str) -> AppResult<StandardHttpClient> {
        debug!(
            "Creating HTTP client for service: {} (connect timeout {:?}, request timeout {:?})",
            service_name, self.connect_timeout, self.request_timeout
        );
        StandardHttpClient::new(self.connect_timeout, self.request_timeout, &self.user_agent)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}
