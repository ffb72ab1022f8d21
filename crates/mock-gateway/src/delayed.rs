//! Delayed backend - wraps another backend with artificial latency.

use std::time::Duration;

use async_trait::async_trait;
use crm_gateway::{
    CrmApi, CustomerDetail, CustomerPatch, CustomerSummary, GatewayError, Message, SendReceipt,
    SendRequest, Stage,
};
use tokio::time::sleep;

/// A backend that wraps another backend and delays every call.
///
/// Useful for keeping a send in flight long enough to observe the
/// optimistic state, or for simulating a slow network.
pub struct DelayedApi<A: CrmApi> {
    inner: A,
    delay: Duration,
}

impl<A: CrmApi> DelayedApi<A> {
    /// Create a new DelayedApi wrapping the given backend with the specified delay.
    pub fn new(inner: A, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Create a backend with a delay in milliseconds.
    pub fn with_millis(inner: A, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    /// Get a reference to the wrapped backend.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: CrmApi> CrmApi for DelayedApi<A> {
    async fn list_customers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CustomerSummary>, GatewayError> {
        sleep(self.delay).await;
        self.inner.list_customers(search).await
    }

    async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError> {
        sleep(self.delay).await;
        self.inner.customer_detail(customer_id).await
    }

    async fn conversation_history(&self, customer_id: &str) -> Result<Vec<Message>, GatewayError> {
        sleep(self.delay).await;
        self.inner.conversation_history(customer_id).await
    }

    async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        sleep(self.delay).await;
        self.inner.pipeline_stages().await
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        sleep(self.delay).await;
        self.inner.send_message(request).await
    }

    async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError> {
        sleep(self.delay).await;
        self.inner.mark_read(customer_id).await
    }

    async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError> {
        sleep(self.delay).await;
        self.inner.patch_customer(customer_id, patch).await
    }
}
