//! The request/response surface the sync engine depends on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{
    CustomerDetail, CustomerPatch, CustomerSummary, Message, SendReceipt, SendRequest, Stage,
};

/// Request/response operations against the CRM backend.
///
/// Abstracted so the sync engine can run against the real [`CrmClient`]
/// or a scripted implementation in tests.
///
/// [`CrmClient`]: crate::CrmClient
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// List customer summaries in server (most recent first) order.
    async fn list_customers(&self, search: Option<&str>)
        -> Result<Vec<CustomerSummary>, GatewayError>;

    /// Fetch the full record for one customer.
    async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError>;

    /// Fetch the conversation with one customer, oldest first.
    async fn conversation_history(&self, customer_id: &str) -> Result<Vec<Message>, GatewayError>;

    /// List pipeline stages.
    async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError>;

    /// Send an outbound message.
    async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError>;

    /// Mark a customer's conversation as read.
    async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError>;

    /// Update editable customer fields, returning the new record.
    async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError>;
}

#[async_trait]
impl<T: CrmApi + ?Sized> CrmApi for Arc<T> {
    async fn list_customers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CustomerSummary>, GatewayError> {
        (**self).list_customers(search).await
    }

    async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError> {
        (**self).customer_detail(customer_id).await
    }

    async fn conversation_history(&self, customer_id: &str) -> Result<Vec<Message>, GatewayError> {
        (**self).conversation_history(customer_id).await
    }

    async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        (**self).pipeline_stages().await
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        (**self).send_message(request).await
    }

    async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError> {
        (**self).mark_read(customer_id).await
    }

    async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError> {
        (**self).patch_customer(customer_id, patch).await
    }
}
