//! Mock CRM backends for testing inbox synchronization.
//!
//! This crate provides implementations of the `CrmApi` trait for testing:
//! - `ScriptedApi` - In-memory backend with failure switches and gated
//!   history responses for driving races deterministically
//! - `DelayedApi` - Wraps another backend with artificial latency
//!
//! # Example
//!
//! ```rust
//! use mock_gateway::{fixtures, CrmApi, ScriptedApi};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), mock_gateway::GatewayError> {
//!     let api = ScriptedApi::new();
//!     api.add_customer(fixtures::customer("c1", "Ana"));
//!
//!     let roster = api.list_customers(None).await?;
//!     assert_eq!(roster.len(), 1);
//!     Ok(())
//! }
//! ```

mod delayed;
pub mod fixtures;
mod scripted;

// Re-export gateway types for convenience
pub use crm_gateway::{CrmApi, GatewayError};

pub use delayed::DelayedApi;
pub use scripted::{HistoryGate, ScriptedApi};
