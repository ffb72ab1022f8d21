//! CRM REST client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::CrmApi;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::sse::EventStream;
use crate::token::TokenProvider;
use crate::types::{
    CustomerDetail, CustomerPatch, CustomerSummary, Message, SendReceipt, SendRequest, Stage,
};

/// Client for the CRM operator API.
#[derive(Clone)]
pub struct CrmClient {
    http: Client,
    /// Separate client for the push channel: SSE connections are
    /// long-lived and must not inherit the request timeout.
    sse_http: Client,
    config: GatewayConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl CrmClient {
    /// Build a client. No request is made until the first call.
    pub fn new(
        config: GatewayConfig,
        tokens: impl TokenProvider + 'static,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(GatewayError::Http)?;
        let sse_http = Client::builder().build().map_err(GatewayError::Http)?;

        Ok(Self {
            http,
            sse_http,
            config,
            tokens: Arc::new(tokens),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current bearer credential, or `Unauthenticated` when signed out.
    fn bearer(&self) -> Result<String, GatewayError> {
        self.tokens.token().ok_or(GatewayError::Unauthenticated)
    }

    /// List customers, optionally filtered by a search query.
    pub async fn list_customers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CustomerSummary>, GatewayError> {
        let url = self.config.customers_url(search);
        self.fetch_json(self.http.get(&url)).await
    }

    /// Fetch the full record for a customer.
    pub async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError> {
        let url = self.config.customer_url(customer_id);
        self.fetch_json(self.http.get(&url)).await
    }

    /// Fetch the conversation history for a customer.
    pub async fn conversation_history(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Message>, GatewayError> {
        let url = self.config.messages_url(customer_id);
        self.fetch_json(self.http.get(&url)).await
    }

    /// List pipeline stages.
    pub async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        let url = self.config.stages_url();
        self.fetch_json(self.http.get(&url)).await
    }

    /// Send a message.
    pub async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        let url = self.config.send_url();
        let response = self.execute(self.http.post(&url).json(request)).await?;

        // Some backends answer 204 or an empty body.
        let body = response.text().await.map_err(GatewayError::Http)?;
        if body.trim().is_empty() {
            return Ok(SendReceipt::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Mark a customer's conversation as read.
    pub async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError> {
        let url = self.config.read_url(customer_id);
        self.execute(self.http.post(&url)).await?;
        Ok(())
    }

    /// Patch editable customer fields.
    pub async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError> {
        let url = self.config.customer_url(customer_id);
        self.fetch_json(self.http.patch(&url).json(patch)).await
    }

    /// Open the push-event subscription.
    pub fn subscribe(&self) -> Result<EventStream, GatewayError> {
        let token = self.bearer()?;
        EventStream::open(&self.sse_http, &self.config.events_url(), &token)
    }

    async fn fetch_json<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, GatewayError> {
        let response = self.execute(request).await?;
        response.json().await.map_err(GatewayError::Http)
    }

    /// Attach the credential, send, and classify non-success statuses.
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let token = self.bearer()?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(GatewayError::Http)?;

        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl CrmApi for CrmClient {
    async fn list_customers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CustomerSummary>, GatewayError> {
        CrmClient::list_customers(self, search).await
    }

    async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError> {
        CrmClient::customer_detail(self, customer_id).await
    }

    async fn conversation_history(&self, customer_id: &str) -> Result<Vec<Message>, GatewayError> {
        CrmClient::conversation_history(self, customer_id).await
    }

    async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        CrmClient::pipeline_stages(self).await
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        CrmClient::send_message(self, request).await
    }

    async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError> {
        CrmClient::mark_read(self, customer_id).await
    }

    async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError> {
        CrmClient::patch_customer(self, customer_id, patch).await
    }
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("config", &self.config)
            .field("authenticated", &self.tokens.token().is_some())
            .finish()
    }
}
