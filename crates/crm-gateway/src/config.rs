//! Configuration types for crm-gateway.

use std::env;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Default timeout for request/response calls. The push channel has none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for connecting to the CRM backend.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the REST API (e.g., "http://localhost:3000/api").
    pub base_url: String,
    /// Timeout applied to every request/response call.
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `CRM_API_URL` - API base URL (default: http://localhost:3000/api)
    /// - `CRM_REQUEST_TIMEOUT_SECS` - Request timeout (default: 30)
    pub fn from_env() -> Self {
        let base_url = env::var("CRM_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout = env::var("CRM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Self::new(base_url).with_timeout(timeout)
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Customer list URL, with an optional search query.
    pub fn customers_url(&self, search: Option<&str>) -> String {
        match search.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => format!(
                "{}/customers?search={}",
                self.base_url,
                urlencoding::encode(query)
            ),
            None => format!("{}/customers", self.base_url),
        }
    }

    /// Single customer URL (detail fetch and PATCH).
    pub fn customer_url(&self, customer_id: &str) -> String {
        format!("{}/customers/{}", self.base_url, urlencoding::encode(customer_id))
    }

    /// Conversation history URL for a customer.
    pub fn messages_url(&self, customer_id: &str) -> String {
        format!("{}/messages", self.customer_url(customer_id))
    }

    /// Mark-read URL for a customer.
    pub fn read_url(&self, customer_id: &str) -> String {
        format!("{}/read", self.customer_url(customer_id))
    }

    /// Send message URL.
    pub fn send_url(&self) -> String {
        format!("{}/messages/send", self.base_url)
    }

    /// Pipeline stages URL.
    pub fn stages_url(&self) -> String {
        format!("{}/pipeline/stages", self.base_url)
    }

    /// Push events (SSE) URL.
    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
