//! Live conversation synchronization for the CRM operator inbox.
//!
//! This crate keeps an operator's customer roster and open conversation
//! consistent while three sources change them at once:
//!
//! - Push events from the server (`customer_update`, `inbound_message`,
//!   `message_seen`), possibly duplicated or out of order
//! - Optimistic local edits (sending a message, marking a conversation read)
//! - Explicit re-fetches of the roster and of the open conversation
//!
//! All state lives in a [`SyncStore`]. Push events reach it through the
//! consumer in [`consumer`], and an [`InboxSession`] ties the two together
//! for the lifetime of a sign-in.
//!
//! # Example
//!
//! ```no_run
//! use crm_gateway::{CrmClient, EnvToken, GatewayConfig};
//! use inbox_sync::{connect, EventEffect, SyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CrmClient::new(GatewayConfig::from_env(), EnvToken::default())?;
//! let session = connect(client, SyncConfig::from_env()?, |effect| {
//!     if let EventEffect::InboundMessage { customer_id, .. } = effect {
//!         println!("new message from {}", customer_id);
//!     }
//! })
//! .await?;
//!
//! let store = session.store();
//! store.select("42").await?;
//! store.send("Hello!", None).await?;
//!
//! for notice in store.take_notices().await {
//!     eprintln!("{}", notice);
//! }
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod conversation;
pub mod error;
pub mod notice;
pub mod roster;
pub mod selection;
pub mod send;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use consumer::{run_consumer, spawn_consumer, ConsumerHandle};
pub use conversation::{AppendOutcome, ConversationCache, ConversationEntry, EntryState};
pub use error::SyncError;
pub use notice::Notice;
pub use roster::{RosterCache, RosterChange};
pub use selection::{
    ScrollCommand, SelectKind, SelectTicket, SelectionController, SelectionPhase, SelectionState,
};
pub use send::{PendingSend, ProvisionalIds, SendOutcome, SendPhase};
pub use session::{connect, InboxSession};
pub use store::{EventEffect, InboxSnapshot, SelectOutcome, SyncStore};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
