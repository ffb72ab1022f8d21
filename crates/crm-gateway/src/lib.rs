//! CRM operator API client library.
//!
//! This crate provides a Rust client for the operator-facing CRM backend.
//! It supports:
//!
//! - Listing customers, fetching customer detail and conversation history
//! - Sending messages, marking conversations read and patching customers
//! - Receiving push events via Server-Sent Events (SSE)
//!
//! Everything the sync engine needs is expressed by the [`CrmApi`] trait so
//! that tests can substitute scripted implementations.
//!
//! # Example
//!
//! ```no_run
//! use crm_gateway::{CrmClient, GatewayConfig, StaticToken};
//!
//! # async fn example() -> Result<(), crm_gateway::GatewayError> {
//! let client = CrmClient::new(GatewayConfig::default(), StaticToken::new("secret"))?;
//!
//! // Load the inbox
//! for customer in client.list_customers(None).await? {
//!     println!("{} ({} unread)", customer.display_name, customer.unread_count);
//! }
//!
//! // Subscribe to push events
//! use futures::StreamExt;
//! let mut events = client.subscribe()?;
//! while let Some(result) = events.next().await {
//!     match result {
//!         Ok(envelope) => println!("tenant {}: {:?}", envelope.tenant_id, envelope.event),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod sse;
pub mod token;
pub mod types;

pub use api::CrmApi;
pub use client::CrmClient;
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use sse::EventStream;
pub use token::{EnvToken, StaticToken, TokenProvider};
pub use types::*;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
