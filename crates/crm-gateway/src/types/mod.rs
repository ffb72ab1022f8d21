//! Wire types exchanged with the CRM backend.

mod customer;
pub(crate) mod de;
mod event;
mod message;

pub use customer::{CustomerDetail, CustomerPatch, CustomerSummary, CustomerUpdate, Stage};
pub use event::{EventEnvelope, SyncEvent};
pub use message::{AckState, Channel, Direction, Message, SendReceipt, SendRequest};
