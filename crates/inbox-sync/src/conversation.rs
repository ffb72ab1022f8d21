//! The open conversation: an ordered message list merging server history,
//! optimistic sends and pushed messages.

use std::collections::HashSet;

use crm_gateway::{Message, SendReceipt};
use tracing::{debug, warn};

/// Where an entry stands relative to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Known to the server under its id.
    Confirmed,
    /// Inserted locally, send in flight.
    Pending,
    /// The server accepted the send but returned no id; the canonical copy
    /// arrives with the next history load.
    Sent,
    /// The send failed. Kept visible so the operator knows it may not have
    /// been delivered.
    Failed { reason: String },
}

/// One row of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub message: Message,
    pub state: EntryState,
}

impl ConversationEntry {
    pub fn confirmed(message: Message) -> Self {
        Self {
            message,
            state: EntryState::Confirmed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, EntryState::Failed { .. })
    }
}

/// Result of offering a pushed message to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Already present by id; only its ack state was merged.
    Duplicate,
    /// The message belongs to a conversation that is not open.
    NotOpen,
}

/// Messages of the currently open conversation.
///
/// Entries are ordered by timestamp with ties in insertion order. Once
/// inserted an entry never moves, except when a history load replaces the
/// whole list.
#[derive(Debug, Default)]
pub struct ConversationCache {
    customer_id: Option<String>,
    entries: Vec<ConversationEntry>,
    issued_loads: u64,
    applied_load: u64,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the cache at a customer, emptying it if that is a different
    /// customer than before.
    pub fn open(&mut self, customer_id: &str) {
        if self.is_open_for(customer_id) {
            return;
        }
        debug!("Opening conversation {}", customer_id);
        self.customer_id = Some(customer_id.to_string());
        self.entries.clear();
    }

    pub fn close(&mut self) {
        self.customer_id = None;
        self.entries.clear();
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    pub fn is_open_for(&self, customer_id: &str) -> bool {
        self.customer_id.as_deref() == Some(customer_id)
    }

    /// Start a history load and return its ticket.
    pub fn begin_load(&mut self) -> u64 {
        self.issued_loads += 1;
        self.issued_loads
    }

    /// Replace the conversation with a fetched history.
    ///
    /// The server's order is kept as is. On top of it:
    /// - confirmed messages already held never lose ack progress;
    /// - confirmed messages newer than the whole result (pushed after the
    ///   request went out) are carried over;
    /// - failed sends stay visible;
    /// - pending and sent-without-id entries are dropped.
    ///
    /// Returns false without touching anything when the result is for a
    /// conversation that is no longer open or a newer load already landed.
    pub fn load_history(&mut self, customer_id: &str, ticket: u64, fetched: Vec<Message>) -> bool {
        if !self.is_open_for(customer_id) {
            debug!("Discarding history for {}: not open", customer_id);
            return false;
        }
        if ticket <= self.applied_load {
            debug!(
                "Discarding history load {} for {} (already applied {})",
                ticket, customer_id, self.applied_load
            );
            return false;
        }
        self.applied_load = ticket;

        let mut seen = HashSet::new();
        let mut merged: Vec<ConversationEntry> = Vec::with_capacity(fetched.len());
        for mut message in fetched {
            if message.customer_id.is_empty() {
                message.customer_id = customer_id.to_string();
            } else if message.customer_id != customer_id {
                warn!(
                    "History for {} contained message {} of {}",
                    customer_id, message.id, message.customer_id
                );
                continue;
            }

            if !seen.insert(message.id) {
                if let Some(first) = merged.iter_mut().find(|e| e.message.id == message.id) {
                    first.message.ack_state = first.message.ack_state.max(message.ack_state);
                }
                continue;
            }

            if let Some(known) = self.confirmed(message.id) {
                message.ack_state = message.ack_state.max(known.ack_state);
            }
            merged.push(ConversationEntry::confirmed(message));
        }

        let newest = merged.iter().map(|e| e.message.timestamp).max();
        let previous = std::mem::replace(&mut self.entries, merged);

        let mut dropped = 0usize;
        for entry in previous {
            let keep = match entry.state {
                EntryState::Confirmed => {
                    !seen.contains(&entry.message.id)
                        && newest.map_or(true, |n| entry.message.timestamp >= n)
                }
                EntryState::Failed { .. } => true,
                EntryState::Pending | EntryState::Sent => false,
            };
            if keep {
                self.insert_ordered(entry);
            } else if entry.state != EntryState::Confirmed {
                dropped += 1;
            }
        }

        debug!(
            "Loaded {} messages for {} ({} unconfirmed dropped)",
            self.entries.len(),
            customer_id,
            dropped
        );
        true
    }

    /// Insert a locally created outbound message at the tail.
    pub fn append_optimistic(&mut self, message: Message) -> bool {
        if !self.is_open_for(&message.customer_id) {
            return false;
        }
        self.insert_ordered(ConversationEntry {
            message,
            state: EntryState::Pending,
        });
        true
    }

    /// Offer a pushed message. Appends if it belongs to the open
    /// conversation and is not already present by id.
    pub fn append_inbound(&mut self, message: Message) -> AppendOutcome {
        if !self.is_open_for(&message.customer_id) {
            return AppendOutcome::NotOpen;
        }

        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.message.id == message.id)
        {
            existing.message.ack_state = existing.message.ack_state.max(message.ack_state);
            debug!("Duplicate message {} ignored", message.id);
            return AppendOutcome::Duplicate;
        }

        self.insert_ordered(ConversationEntry::confirmed(message));
        AppendOutcome::Appended
    }

    /// Record a successful send against its provisional entry.
    ///
    /// The entry stays where it is. If the server returned an id it takes
    /// that id, unless a pushed copy with the same id is already present, in
    /// which case the provisional entry is removed.
    pub fn confirm_send(&mut self, provisional_id: i64, receipt: &SendReceipt) -> bool {
        let Some(pos) = self.position(provisional_id) else {
            return false;
        };

        let Some(server_id) = receipt.id else {
            self.entries[pos].state = EntryState::Sent;
            return true;
        };

        if self.position(server_id).is_some() {
            self.entries.remove(pos);
            return true;
        }

        let entry = &mut self.entries[pos];
        entry.message.id = server_id;
        if let Some(ack) = receipt.ack_state {
            entry.message.ack_state = entry.message.ack_state.max(ack);
        }
        entry.state = EntryState::Confirmed;
        true
    }

    /// Flag a provisional entry as failed. It stays visible.
    pub fn mark_failed(&mut self, provisional_id: i64, reason: impl Into<String>) -> bool {
        match self.position(provisional_id) {
            Some(pos) => {
                self.entries[pos].state = EntryState::Failed {
                    reason: reason.into(),
                };
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn get(&self, message_id: i64) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.message.id == message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn confirmed(&self, message_id: i64) -> Option<&Message> {
        self.get(message_id)
            .filter(|e| e.state == EntryState::Confirmed)
            .map(|e| &e.message)
    }

    fn position(&self, message_id: i64) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == message_id)
    }

    /// Insert after the last entry whose timestamp is not later.
    fn insert_ordered(&mut self, entry: ConversationEntry) {
        let pos = self
            .entries
            .iter()
            .rposition(|e| e.message.timestamp <= entry.message.timestamp)
            .map_or(0, |p| p + 1);
        self.entries.insert(pos, entry);
    }
}
