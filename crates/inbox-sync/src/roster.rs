//! The inbox roster: an ordered, deduplicated working set of customer
//! summaries.
//!
//! Entries are ordered by recency of the last relevant fetch or event. A
//! full load re-establishes server order; after that, events only ever move
//! an entry to the head.

use std::collections::HashSet;

use crm_gateway::{CustomerSummary, CustomerUpdate, Message};
use indexmap::IndexMap;
use tracing::debug;

/// What an `inbound_message` did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    /// A customer not seen before was inserted at the head.
    Inserted,
    /// An existing customer was moved to the head.
    Moved,
    /// The event is older than what the roster already shows; only the
    /// open-conversation unread rule was applied.
    Stale,
}

/// Ordered customer summaries.
#[derive(Debug, Default)]
pub struct RosterCache {
    /// Oldest first: the head of the roster is the last entry, so moving a
    /// customer to the head is remove + re-insert.
    entries: IndexMap<String, CustomerSummary>,
    /// Tickets handed to loads, so only the newest load may land.
    issued_loads: u64,
    applied_load: u64,
}

impl RosterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load and return its ticket.
    pub fn begin_load(&mut self) -> u64 {
        self.issued_loads += 1;
        self.issued_loads
    }

    /// Replace the working set with a fetch result, given in server order
    /// (head first). Returns false, leaving the roster untouched, when a
    /// newer load has already landed.
    pub fn finish_load(&mut self, ticket: u64, customers: Vec<CustomerSummary>) -> bool {
        if ticket <= self.applied_load {
            debug!(
                "Discarding roster load {} (already applied {})",
                ticket, self.applied_load
            );
            return false;
        }
        self.applied_load = ticket;
        self.replace(customers);
        true
    }

    /// Replace the working set entirely. Fetch truth wins: no local state is
    /// preserved. Duplicate ids keep their first (most recent) occurrence.
    pub fn replace(&mut self, customers: Vec<CustomerSummary>) {
        let mut seen = HashSet::new();
        let unique: Vec<CustomerSummary> = customers
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();

        self.entries.clear();
        for customer in unique.into_iter().rev() {
            self.entries.insert(customer.id.clone(), customer);
        }
        debug!("Roster replaced with {} customers", self.entries.len());
    }

    /// Shallow-merge a partial update into an existing entry without moving
    /// it. Updates for unknown customers are dropped.
    ///
    /// `open_customer` is the conversation the operator is viewing; its
    /// unread count stays at zero whatever the update says.
    pub fn apply_customer_update(
        &mut self,
        update: &CustomerUpdate,
        open_customer: Option<&str>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(&update.id) else {
            debug!("Dropping update for unknown customer {}", update.id);
            return false;
        };

        update.apply_to(entry);
        if open_customer == Some(update.id.as_str()) {
            entry.unread_count = 0;
        }
        true
    }

    /// Merge the customer record carried by an `inbound_message` event and
    /// move it to the head.
    ///
    /// Preview and timestamp come from the record when it carries them and
    /// from `message` otherwise. The unread count is taken from the event
    /// unless `is_open` is set, in which case it is forced to zero. Applying
    /// the same event twice leaves the roster as applying it once.
    pub fn apply_inbound_message(
        &mut self,
        customer: &CustomerSummary,
        message: &Message,
        is_open: bool,
    ) -> RosterChange {
        let record = with_message_fallback(customer, message);

        if let Some(existing) = self.entries.get_mut(&record.id) {
            if record.last_message_timestamp < existing.last_message_timestamp {
                if is_open {
                    existing.unread_count = 0;
                }
                debug!(
                    "Stale inbound event for {} ({} < {})",
                    record.id, record.last_message_timestamp, existing.last_message_timestamp
                );
                return RosterChange::Stale;
            }
        }

        let (mut entry, change) = match self.entries.shift_remove(&record.id) {
            Some(existing) => (existing, RosterChange::Moved),
            None => (record.clone(), RosterChange::Inserted),
        };

        merge_event_record(&mut entry, &record);
        entry.unread_count = if is_open { 0 } else { record.unread_count };

        self.entries.insert(entry.id.clone(), entry);
        change
    }

    /// Optimistically clear the unread count of the customer being opened.
    pub fn mark_selected(&mut self, customer_id: &str) -> bool {
        self.clear_unread(customer_id)
    }

    /// Apply a `message_seen` event.
    pub fn mark_seen(&mut self, customer_id: &str) -> bool {
        self.clear_unread(customer_id)
    }

    fn clear_unread(&mut self, customer_id: &str) -> bool {
        match self.entries.get_mut(customer_id) {
            Some(entry) => {
                entry.unread_count = 0;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, customer_id: &str) -> Option<&CustomerSummary> {
        self.entries.get(customer_id)
    }

    /// Customers head first.
    pub fn customers(&self) -> Vec<CustomerSummary> {
        self.entries.values().rev().cloned().collect()
    }

    /// Customer ids head first.
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().rev().cloned().collect()
    }

    /// Customers in one pipeline stage (`None` for unstaged), head first.
    pub fn in_stage(&self, stage_id: Option<&str>) -> Vec<CustomerSummary> {
        self.entries
            .values()
            .rev()
            .filter(|c| c.stage_id.as_deref() == stage_id)
            .cloned()
            .collect()
    }

    /// Sum of unread counts across the roster.
    pub fn total_unread(&self) -> u64 {
        self.entries.values().map(|c| u64::from(c.unread_count)).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The event record with preview and timestamp filled from the message
/// when the record leaves them out.
fn with_message_fallback(customer: &CustomerSummary, message: &Message) -> CustomerSummary {
    let mut record = customer.clone();
    if record.last_message_timestamp == 0 {
        record.last_message_timestamp = message.timestamp;
    }
    if record.last_message_preview.is_empty() {
        record.last_message_preview = message.content.clone();
    }
    record
}

/// Take preview and timestamp from the event record, and any identity
/// fields it actually carries.
fn merge_event_record(entry: &mut CustomerSummary, event: &CustomerSummary) {
    if !event.last_message_preview.is_empty() {
        entry.last_message_preview = event.last_message_preview.clone();
    }
    entry.last_message_timestamp = event.last_message_timestamp;

    if !event.display_name.is_empty() {
        entry.display_name = event.display_name.clone();
    }
    if !event.phone.is_empty() {
        entry.phone = event.phone.clone();
    }
    if !event.status.is_empty() {
        entry.status = event.status.clone();
    }
    if event.photo_url.is_some() {
        entry.photo_url = event.photo_url.clone();
    }
    if event.stage_id.is_some() {
        entry.stage_id = event.stage_id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_gateway::{AckState, Channel, Direction};

    fn summary(id: &str, ts: u64, unread: u32) -> CustomerSummary {
        CustomerSummary {
            last_message_preview: format!("msg from {id}"),
            last_message_timestamp: ts,
            unread_count: unread,
            ..CustomerSummary::new(id, id.to_uppercase())
        }
    }

    fn message(customer_id: &str, ts: u64) -> Message {
        Message {
            id: ts as i64,
            customer_id: customer_id.to_string(),
            content: format!("text at {ts}"),
            direction: Direction::Inbound,
            timestamp: ts,
            channel: Channel::Whatsapp,
            ack_state: AckState::DeliveredToRecipient,
        }
    }

    /// Apply an event whose record and message agree on the timestamp.
    fn inbound(roster: &mut RosterCache, record: CustomerSummary, is_open: bool) -> RosterChange {
        let message = message(&record.id, record.last_message_timestamp);
        roster.apply_inbound_message(&record, &message, is_open)
    }

    fn loaded(ids: &[&str]) -> RosterCache {
        let mut roster = RosterCache::new();
        roster.replace(ids.iter().map(|id| summary(id, 100, 1)).collect());
        roster
    }

    #[test]
    fn test_replace_keeps_server_order_and_dedupes() {
        let mut roster = RosterCache::new();
        roster.replace(vec![
            summary("a", 3, 0),
            summary("b", 2, 0),
            summary("a", 1, 5),
            summary("c", 1, 0),
        ]);
        assert_eq!(roster.ids(), vec!["a", "b", "c"]);
        assert_eq!(roster.get("a").unwrap().unread_count, 0);
    }

    #[test]
    fn test_inbound_moves_existing_to_head() {
        let mut roster = loaded(&["a", "b", "c"]);
        let change = inbound(&mut roster, summary("c", 200, 4), false);

        assert_eq!(change, RosterChange::Moved);
        assert_eq!(roster.ids(), vec!["c", "a", "b"]);
        let c = roster.get("c").unwrap();
        assert_eq!(c.unread_count, 4);
        assert_eq!(c.last_message_timestamp, 200);
        assert_eq!(c.display_name, "C");
    }

    #[test]
    fn test_inbound_for_unknown_customer_inserts_at_head() {
        let mut roster = loaded(&["a"]);
        let change = inbound(&mut roster, summary("new", 200, 1), false);
        assert_eq!(change, RosterChange::Inserted);
        assert_eq!(roster.ids(), vec!["new", "a"]);
    }

    #[test]
    fn test_inbound_is_idempotent() {
        let mut roster = loaded(&["a", "b"]);
        let event = summary("b", 300, 2);

        inbound(&mut roster, event.clone(), false);
        let once = roster.customers();
        inbound(&mut roster, event, false);

        assert_eq!(roster.customers(), once);
        assert_eq!(roster.get("b").unwrap().unread_count, 2);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_distinct_events_order_is_reverse_arrival() {
        let mut roster = RosterCache::new();
        for (i, id) in ["x", "y", "z", "w"].iter().enumerate() {
            inbound(&mut roster, summary(id, 1000 + i as u64, 1), false);
        }
        assert_eq!(roster.ids(), vec!["w", "z", "y", "x"]);
    }

    #[test]
    fn test_open_conversation_unread_is_forced_to_zero() {
        let mut roster = loaded(&["a", "b"]);
        inbound(&mut roster, summary("a", 500, 3), true);
        assert_eq!(roster.get("a").unwrap().unread_count, 0);
        assert_eq!(roster.ids()[0], "a");
    }

    #[test]
    fn test_stale_inbound_does_not_move() {
        let mut roster = RosterCache::new();
        roster.replace(vec![summary("a", 900, 0), summary("b", 800, 0)]);

        let change = inbound(&mut roster, summary("b", 100, 7), true);
        assert_eq!(change, RosterChange::Stale);
        assert_eq!(roster.ids(), vec!["a", "b"]);
        assert_eq!(roster.get("b").unwrap().last_message_timestamp, 800);
    }

    #[test]
    fn test_bare_inbound_record_takes_preview_and_timestamp_from_message() {
        let mut roster = RosterCache::new();
        roster.replace(vec![summary("b", 500, 0), summary("a", 300, 0)]);

        let mut bare = CustomerSummary::new("a", "");
        bare.unread_count = 3;
        let change = roster.apply_inbound_message(&bare, &message("a", 1000), false);

        assert_eq!(change, RosterChange::Moved);
        assert_eq!(roster.ids(), vec!["a", "b"]);
        let a = roster.get("a").unwrap();
        assert_eq!(a.last_message_timestamp, 1000);
        assert_eq!(a.last_message_preview, "text at 1000");
        assert_eq!(a.display_name, "A");
        assert_eq!(a.unread_count, 3);
    }

    #[test]
    fn test_bare_inbound_record_older_than_roster_is_stale() {
        let mut roster = RosterCache::new();
        roster.replace(vec![summary("a", 900, 0), summary("b", 800, 2)]);

        let bare = CustomerSummary::new("b", "");
        let change = roster.apply_inbound_message(&bare, &message("b", 100), false);
        assert_eq!(change, RosterChange::Stale);
        assert_eq!(roster.ids(), vec!["a", "b"]);
        assert_eq!(roster.get("b").unwrap().last_message_preview, "msg from b");
    }

    #[test]
    fn test_customer_update_merges_in_place() {
        let mut roster = loaded(&["a", "b", "c"]);
        let update = CustomerUpdate {
            display_name: Some("Bea".to_string()),
            unread_count: Some(9),
            ..CustomerUpdate::new("b")
        };

        assert!(roster.apply_customer_update(&update, None));
        assert_eq!(roster.ids(), vec!["a", "b", "c"]);
        assert_eq!(roster.get("b").unwrap().display_name, "Bea");
        assert_eq!(roster.get("b").unwrap().unread_count, 9);

        assert!(roster.apply_customer_update(&update, Some("b")));
        assert_eq!(roster.get("b").unwrap().unread_count, 0);
    }

    #[test]
    fn test_update_for_unknown_customer_is_dropped() {
        let mut roster = loaded(&["a"]);
        assert!(!roster.apply_customer_update(&CustomerUpdate::new("ghost"), None));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_only_newest_load_lands() {
        let mut roster = loaded(&["a"]);
        let first = roster.begin_load();
        let second = roster.begin_load();

        assert!(roster.finish_load(second, vec![summary("b", 1, 0)]));
        assert!(!roster.finish_load(first, vec![summary("c", 1, 0)]));
        assert_eq!(roster.ids(), vec!["b"]);
    }

    #[test]
    fn test_mark_selected_and_stage_filter() {
        let mut roster = RosterCache::new();
        let mut staged = summary("a", 1, 3);
        staged.stage_id = Some("won".to_string());
        roster.replace(vec![staged, summary("b", 1, 2)]);

        assert_eq!(roster.total_unread(), 5);
        assert!(roster.mark_selected("a"));
        assert!(!roster.mark_selected("zzz"));
        assert_eq!(roster.total_unread(), 2);

        assert_eq!(roster.in_stage(Some("won")).len(), 1);
        assert_eq!(roster.in_stage(None)[0].id, "b");
    }
}
