//! The sync store: one explicit object owning the roster, the open
//! conversation and the selection, mutated by user operations and push
//! events alike.
//!
//! Network calls are never made while the state lock is held. Every write
//! that follows a network call is validated against the ticket taken before
//! the call, so whichever response lands last cannot clobber newer state.

use std::mem;

use crm_gateway::{
    Channel, CrmApi, CustomerDetail, CustomerPatch, CustomerSummary, EventEnvelope, GatewayError,
    SendRequest, Stage, SyncEvent,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::conversation::{AppendOutcome, ConversationCache, ConversationEntry};
use crate::error::SyncError;
use crate::notice::Notice;
use crate::roster::{RosterCache, RosterChange};
use crate::selection::{ScrollCommand, SelectKind, SelectionController, SelectionState};
use crate::send::{now_millis, provisional_message, PendingSend, ProvisionalIds, SendOutcome};

/// Result of [`SyncStore::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The history is in place; the viewport should follow `scroll`.
    Loaded { kind: SelectKind, scroll: ScrollCommand },
    /// Another selection happened while the history was in flight; the
    /// response was discarded.
    Stale,
    /// The history fetch failed; the conversation keeps what it had.
    Failed,
}

/// What applying one push event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEffect {
    /// The event was for another tenant and was dropped unprocessed.
    ForeignTenant { tenant_id: String },
    CustomerUpdated { customer_id: String, applied: bool },
    InboundMessage {
        customer_id: String,
        message_id: i64,
        roster: RosterChange,
        conversation: AppendOutcome,
        scroll: ScrollCommand,
    },
    MessageSeen { customer_id: String, applied: bool },
}

/// Read-only view of the store for rendering.
#[derive(Debug, Clone, Default)]
pub struct InboxSnapshot {
    /// Head first.
    pub roster: Vec<CustomerSummary>,
    pub conversation_customer_id: Option<String>,
    pub conversation: Vec<ConversationEntry>,
    pub selection: SelectionState,
    pub detail: Option<CustomerDetail>,
    pub stages: Vec<Stage>,
    pub total_unread: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    roster: RosterCache,
    conversation: ConversationCache,
    selection: SelectionController,
    send_ids: ProvisionalIds,
    stages: Vec<Stage>,
    notices: Vec<Notice>,
    /// Query of the last roster refresh, reused by reconciliation.
    search: Option<String>,
}

impl StoreState {
    /// Record a failed call. Authentication failures queue a notice and
    /// become [`SyncError::Unauthenticated`].
    fn note_failure(&mut self, what: &str, err: GatewayError) -> SyncError {
        if err.is_auth() {
            warn!("{} failed: not authenticated", what);
            if !self.notices.contains(&Notice::SessionExpired) {
                self.notices.push(Notice::SessionExpired);
            }
            SyncError::Unauthenticated
        } else {
            warn!("{} failed: {}", what, err);
            SyncError::Gateway(err)
        }
    }
}

/// Live inbox state for one operator session.
pub struct SyncStore<A: CrmApi> {
    api: A,
    config: SyncConfig,
    state: Mutex<StoreState>,
}

impl<A: CrmApi> SyncStore<A> {
    pub fn new(api: A, config: SyncConfig) -> Self {
        Self {
            api,
            config,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().await
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    /// Reload the roster from the server, optionally filtered by a search
    /// query. Returns false if a newer refresh landed first.
    ///
    /// On failure the roster keeps its last known good contents. The query
    /// stays in effect for later reconciliation until the next refresh.
    pub async fn refresh_roster(&self, search: Option<&str>) -> Result<bool, SyncError> {
        let ticket = {
            let mut state = self.lock().await;
            state.search = search.map(str::to_string);
            state.roster.begin_load()
        };

        let result = self.api.list_customers(search).await;

        let mut state = self.lock().await;
        match result {
            Ok(customers) => {
                let count = customers.len();
                let landed = state.roster.finish_load(ticket, customers);
                if landed {
                    info!("Roster loaded: {} customers", count);
                }
                Ok(landed)
            }
            Err(e) => Err(state.note_failure("Roster load", e)),
        }
    }

    /// Fetch pipeline stages, sorted by position.
    pub async fn load_stages(&self) -> Result<Vec<Stage>, SyncError> {
        let result = self.api.pipeline_stages().await;

        let mut state = self.lock().await;
        match result {
            Ok(mut stages) => {
                stages.sort_by_key(|s| s.position);
                state.stages = stages.clone();
                Ok(stages)
            }
            Err(e) => Err(state.note_failure("Stage load", e)),
        }
    }

    pub async fn stages(&self) -> Vec<Stage> {
        self.lock().await.stages.clone()
    }

    /// Roster entries in one stage (`None` for unstaged), head first.
    pub async fn roster_in_stage(&self, stage_id: Option<&str>) -> Vec<CustomerSummary> {
        self.lock().await.roster.in_stage(stage_id)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Open a customer's conversation.
    ///
    /// The roster entry is marked read immediately; mark-read, history and
    /// (on a switch) detail are then requested concurrently. A response
    /// arriving after another selection is discarded.
    ///
    /// Only authentication failures are returned as errors. Other failures
    /// are logged and reported through the outcome.
    pub async fn select(&self, customer_id: &str) -> Result<SelectOutcome, SyncError> {
        let (ticket, load) = {
            let mut state = self.lock().await;
            let ticket = state.selection.select(customer_id);
            state.conversation.open(customer_id);
            state.roster.mark_selected(customer_id);
            (ticket, state.conversation.begin_load())
        };
        info!("Selected customer {} ({:?})", customer_id, ticket.kind);

        let detail = async {
            match ticket.kind {
                SelectKind::Switch => Some(self.api.customer_detail(customer_id).await),
                SelectKind::Refresh => None,
            }
        };
        let (read, history, detail) = tokio::join!(
            self.api.mark_read(customer_id),
            self.api.conversation_history(customer_id),
            detail
        );

        let mut state = self.lock().await;
        let mut auth_failed = false;

        if let Err(e) = read {
            auth_failed |= matches!(state.note_failure("Mark read", e), SyncError::Unauthenticated);
        }

        match detail {
            Some(Ok(detail)) => {
                state.selection.set_detail(&ticket, detail);
            }
            Some(Err(e)) => {
                auth_failed |=
                    matches!(state.note_failure("Detail fetch", e), SyncError::Unauthenticated);
            }
            None => {}
        }

        let outcome = match history {
            Ok(messages) => {
                if !state.selection.is_current(&ticket) {
                    debug!("Discarding stale history for {}", customer_id);
                    SelectOutcome::Stale
                } else if !state.conversation.load_history(customer_id, load, messages) {
                    SelectOutcome::Stale
                } else {
                    match state.selection.history_loaded(&ticket) {
                        Some(scroll) => SelectOutcome::Loaded {
                            kind: ticket.kind,
                            scroll,
                        },
                        None => SelectOutcome::Stale,
                    }
                }
            }
            Err(e) => {
                state.selection.history_failed(&ticket);
                auth_failed |=
                    matches!(state.note_failure("History fetch", e), SyncError::Unauthenticated);
                SelectOutcome::Failed
            }
        };

        if auth_failed {
            return Err(SyncError::Unauthenticated);
        }
        Ok(outcome)
    }

    /// Reload the open conversation without changing the selection or
    /// the viewport. Returns false if it did not land.
    pub async fn reload_conversation(&self, customer_id: &str) -> Result<bool, SyncError> {
        let load = {
            let mut state = self.lock().await;
            if !state.conversation.is_open_for(customer_id) {
                return Ok(false);
            }
            state.conversation.begin_load()
        };

        let result = self.api.conversation_history(customer_id).await;

        let mut state = self.lock().await;
        match result {
            Ok(messages) => Ok(state.conversation.load_history(customer_id, load, messages)),
            Err(e) => Err(state.note_failure("Conversation reload", e)),
        }
    }

    /// Deselect and empty the conversation.
    pub async fn close_conversation(&self) {
        let mut state = self.lock().await;
        state.selection.close();
        state.conversation.close();
    }

    /// Report that the UI finished a render pass. Returns true when this
    /// pass ended a conversation switch.
    pub async fn render_completed(&self) -> bool {
        self.lock().await.selection.render_completed()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Insert an outbound message into the open conversation without
    /// waiting for the network. The returned send must be completed with
    /// [`complete_send`](Self::complete_send).
    pub async fn begin_send(
        &self,
        content: &str,
        channel: Option<Channel>,
    ) -> Result<PendingSend, SyncError> {
        if content.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let mut state = self.lock().await;
        let customer_id = state
            .conversation
            .customer_id()
            .map(str::to_string)
            .ok_or(SyncError::NoOpenConversation)?;

        let channel = channel.unwrap_or_else(|| self.config.default_channel.clone());
        let provisional_id = state.send_ids.next();
        let tail = state
            .conversation
            .entries()
            .last()
            .map_or(0, |e| e.message.timestamp);
        let message = provisional_message(
            provisional_id,
            &customer_id,
            content,
            channel.clone(),
            now_millis().max(tail),
        );

        state.conversation.append_optimistic(message.clone());
        let scroll = state.selection.conversation_updated(&customer_id);
        debug!("Optimistic send {} to {}", provisional_id, customer_id);

        Ok(PendingSend {
            provisional_id,
            request: SendRequest {
                customer_id,
                content: content.to_string(),
                channel,
            },
            message,
            scroll,
        })
    }

    /// Resolve a send against its network result.
    ///
    /// A confirmed send takes its server id in place and is followed by a
    /// reconciliation fetch of the roster and the conversation. A failed
    /// send stays visible, flagged, with a notice queued; the conversation
    /// is then re-fetched unless the failure was an authentication one.
    pub async fn complete_send(
        &self,
        pending: PendingSend,
        result: Result<crm_gateway::SendReceipt, GatewayError>,
    ) -> Result<SendOutcome, SyncError> {
        let outcome = pending.resolve(result);

        match outcome {
            SendOutcome::Confirmed {
                provisional_id,
                ref customer_id,
                ref receipt,
            } => {
                self.lock()
                    .await
                    .conversation
                    .confirm_send(provisional_id, receipt);
                info!("Send {} to {} confirmed", provisional_id, customer_id);
                self.reconcile(customer_id).await;
            }
            SendOutcome::Failed {
                provisional_id,
                ref customer_id,
                ref content,
                ref error,
            } => {
                warn!("Send {} to {} failed: {}", provisional_id, customer_id, error);
                let auth = error.is_auth();
                {
                    let mut state = self.lock().await;
                    state
                        .conversation
                        .mark_failed(provisional_id, error.to_string());
                    state.notices.push(Notice::SendFailed {
                        customer_id: customer_id.clone(),
                        provisional_id,
                        content: content.clone(),
                        reason: error.to_string(),
                    });
                    if auth && !state.notices.contains(&Notice::SessionExpired) {
                        state.notices.push(Notice::SessionExpired);
                    }
                }
                if auth {
                    return Err(SyncError::Unauthenticated);
                }
                if let Err(e) = self.reload_conversation(customer_id).await {
                    debug!("Reconciliation after failed send did not complete: {}", e);
                }
            }
        }

        Ok(outcome)
    }

    /// Send a message to the open conversation: optimistic insert, network
    /// call, then reconciliation.
    pub async fn send(
        &self,
        content: &str,
        channel: Option<Channel>,
    ) -> Result<SendOutcome, SyncError> {
        let pending = self.begin_send(content, channel).await?;
        let result = self.api.send_message(&pending.request).await;
        self.complete_send(pending, result).await
    }

    async fn reconcile(&self, customer_id: &str) {
        let search = self.lock().await.search.clone();
        let (roster, conversation) = tokio::join!(
            self.refresh_roster(search.as_deref()),
            self.reload_conversation(customer_id)
        );
        if let Err(e) = roster {
            debug!("Roster reconciliation did not complete: {}", e);
        }
        if let Err(e) = conversation {
            debug!("Conversation reconciliation did not complete: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Customers
    // ------------------------------------------------------------------

    /// Update a customer's editable fields.
    ///
    /// The returned record replaces the open detail when it is for the
    /// selected customer, and the roster-visible fields are merged into the
    /// roster entry.
    pub async fn patch_customer(
        &self,
        customer_id: &str,
        patch: CustomerPatch,
    ) -> Result<CustomerDetail, SyncError> {
        let result = self.api.patch_customer(customer_id, &patch).await;

        let mut state = self.lock().await;
        match result {
            Ok(detail) => {
                state.selection.replace_detail_if_open(detail.clone());
                let open = state.selection.selected().map(str::to_string);
                state
                    .roster
                    .apply_customer_update(&patch.summary_update(customer_id), open.as_deref());
                info!("Patched customer {}", customer_id);
                Ok(detail)
            }
            Err(e) => Err(state.note_failure("Customer patch", e)),
        }
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    /// Merge one push event. Events for another tenant are dropped.
    pub async fn apply_event(&self, envelope: EventEnvelope) -> EventEffect {
        if envelope.tenant_id != self.config.tenant_id {
            warn!(
                "Dropping {} event for foreign tenant {}",
                envelope.event.kind(),
                envelope.tenant_id
            );
            return EventEffect::ForeignTenant {
                tenant_id: envelope.tenant_id,
            };
        }

        let mut state = self.lock().await;
        let state = &mut *state;

        match envelope.event {
            SyncEvent::CustomerUpdate { customer } => {
                let applied = state
                    .roster
                    .apply_customer_update(&customer, state.selection.selected());
                EventEffect::CustomerUpdated {
                    customer_id: customer.id,
                    applied,
                }
            }
            SyncEvent::InboundMessage { message, customer } => {
                let customer_id = customer.id.clone();
                let message_id = message.id;
                let is_open = state.selection.is_selected(&customer_id);

                let roster = state.roster.apply_inbound_message(&customer, &message, is_open);
                let conversation = state.conversation.append_inbound(message);
                let scroll = match conversation {
                    AppendOutcome::Appended => state.selection.conversation_updated(&customer_id),
                    _ => ScrollCommand::Stay,
                };
                debug!(
                    "Inbound message {} for {}: {:?}, {:?}",
                    message_id, customer_id, roster, conversation
                );

                EventEffect::InboundMessage {
                    customer_id,
                    message_id,
                    roster,
                    conversation,
                    scroll,
                }
            }
            SyncEvent::MessageSeen { customer_id } => {
                let applied = state.roster.mark_seen(&customer_id);
                EventEffect::MessageSeen {
                    customer_id,
                    applied,
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub async fn snapshot(&self) -> InboxSnapshot {
        let state = self.lock().await;
        InboxSnapshot {
            roster: state.roster.customers(),
            conversation_customer_id: state.conversation.customer_id().map(str::to_string),
            conversation: state.conversation.entries().to_vec(),
            selection: state.selection.state(),
            detail: state.selection.detail().cloned(),
            stages: state.stages.clone(),
            total_unread: state.roster.total_unread(),
        }
    }

    /// Drain queued operator notices.
    pub async fn take_notices(&self) -> Vec<Notice> {
        mem::take(&mut self.lock().await.notices)
    }

    /// Forget everything, as on sign-out. Responses still in flight are
    /// discarded when they land.
    pub async fn reset(&self) {
        let mut state = self.lock().await;
        state.selection.close();
        state.conversation.close();
        state.roster.begin_load();
        state.roster.clear();
        state.stages.clear();
        state.notices.clear();
        state.search = None;
        info!("Inbox state reset");
    }
}

impl<A: CrmApi> std::fmt::Debug for SyncStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("tenant_id", &self.config.tenant_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_gateway::AckState;
    use mock_gateway::{fixtures, ScriptedApi};

    fn store() -> SyncStore<ScriptedApi> {
        let api = ScriptedApi::new();
        api.add_customer(fixtures::customer_with("a", "hi", 200, 2));
        api.add_customer(fixtures::customer_with("b", "yo", 100, 1));
        api.set_history("a", vec![fixtures::inbound(1, "a", "hi", 200)]);
        SyncStore::new(api, SyncConfig::new("t1"))
    }

    #[tokio::test]
    async fn test_refresh_roster_loads_server_order() {
        let store = store();
        assert!(store.refresh_roster(None).await.unwrap());

        let snapshot = store.snapshot().await;
        let ids: Vec<_> = snapshot.roster.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(snapshot.total_unread, 3);
    }

    #[tokio::test]
    async fn test_roster_failure_keeps_last_known_good() {
        let store = store();
        store.refresh_roster(None).await.unwrap();

        store.api().fail_reads(true);
        assert!(matches!(
            store.refresh_roster(None).await,
            Err(SyncError::Gateway(_))
        ));
        assert_eq!(store.snapshot().await.roster.len(), 2);
    }

    #[tokio::test]
    async fn test_select_loads_history_detail_and_marks_read() {
        let store = store();
        store.refresh_roster(None).await.unwrap();

        let outcome = store.select("a").await.unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Loaded {
                kind: SelectKind::Switch,
                scroll: ScrollCommand::JumpToBottom
            }
        );

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.conversation.len(), 1);
        assert_eq!(snapshot.detail.unwrap().id(), "a");
        assert_eq!(snapshot.roster[0].unread_count, 0);
        assert!(snapshot.selection.is_switching);
        assert_eq!(store.api().read_marks(), vec!["a"]);

        assert!(store.render_completed().await);
        assert!(!store.snapshot().await.selection.is_switching);
    }

    #[tokio::test]
    async fn test_reselect_refreshes_without_detail_or_jump() {
        let store = store();
        store.refresh_roster(None).await.unwrap();
        store.select("a").await.unwrap();
        store.render_completed().await;

        let outcome = store.select("a").await.unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Loaded {
                kind: SelectKind::Refresh,
                scroll: ScrollCommand::Stay
            }
        );
        assert_eq!(store.api().history_calls(), vec!["a", "a"]);
        assert_eq!(store.api().read_marks(), vec!["a", "a"]);
        assert!(store.snapshot().await.detail.is_some());
    }

    #[tokio::test]
    async fn test_select_when_signed_out() {
        let store = store();
        store.api().sign_out();

        assert!(matches!(
            store.select("a").await,
            Err(SyncError::Unauthenticated)
        ));
        assert_eq!(store.take_notices().await, vec![Notice::SessionExpired]);
    }

    #[tokio::test]
    async fn test_send_requires_open_conversation_and_content() {
        let store = store();
        assert!(matches!(
            store.send("hello", None).await,
            Err(SyncError::NoOpenConversation)
        ));

        store.select("a").await.unwrap();
        assert!(matches!(
            store.send("   ", None).await,
            Err(SyncError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_confirmed_send_reconciles() {
        let store = store();
        store.refresh_roster(None).await.unwrap();
        store.select("a").await.unwrap();
        store.render_completed().await;

        let outcome = store.send("hello", None).await.unwrap();
        assert!(outcome.is_confirmed());

        let snapshot = store.snapshot().await;
        let last = snapshot.conversation.last().unwrap();
        assert_eq!(last.message.content, "hello");
        assert!(!last.message.is_provisional());
        assert_eq!(last.message.ack_state, AckState::DeliveredUnconfirmed);
        assert_eq!(snapshot.conversation.len(), 2);
        assert_eq!(store.api().sent()[0].channel, Channel::Whatsapp);
        assert_eq!(snapshot.roster[0].last_message_preview, "hello");
    }

    #[tokio::test]
    async fn test_foreign_tenant_event_is_dropped() {
        let store = store();
        store.refresh_roster(None).await.unwrap();

        let effect = store
            .apply_event(fixtures::seen_event("other", "a"))
            .await;
        assert_eq!(
            effect,
            EventEffect::ForeignTenant {
                tenant_id: "other".to_string()
            }
        );
        assert_eq!(store.snapshot().await.roster[0].unread_count, 2);
    }

    #[tokio::test]
    async fn test_message_seen_clears_unread() {
        let store = store();
        store.refresh_roster(None).await.unwrap();

        store.apply_event(fixtures::seen_event("t1", "b")).await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.roster[1].unread_count, 0);
        assert_eq!(snapshot.total_unread, 2);
    }

    #[tokio::test]
    async fn test_stages_sorted_and_grouped() {
        let store = store();
        store.api().set_stages(vec![
            Stage {
                id: "won".into(),
                name: "Won".into(),
                position: 2,
                color: None,
            },
            Stage {
                id: "new".into(),
                name: "New".into(),
                position: 0,
                color: None,
            },
        ]);

        let stages = store.load_stages().await.unwrap();
        assert_eq!(stages[0].id, "new");
        assert_eq!(store.stages().await.len(), 2);

        store.refresh_roster(None).await.unwrap();
        store
            .patch_customer(
                "b",
                CustomerPatch {
                    stage_id: Some("won".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let won = store.roster_in_stage(Some("won")).await;
        assert_eq!(won.len(), 1);
        assert_eq!(won[0].id, "b");
    }

    #[tokio::test]
    async fn test_patch_replaces_open_detail() {
        let store = store();
        store.refresh_roster(None).await.unwrap();
        store.select("a").await.unwrap();

        store
            .patch_customer(
                "a",
                CustomerPatch {
                    display_name: Some("Ana".into()),
                    notes: Some("vip".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        let detail = snapshot.detail.unwrap();
        assert_eq!(detail.notes.as_deref(), Some("vip"));
        assert_eq!(snapshot.roster[0].display_name, "Ana");
        assert_eq!(store.api().patches().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_everything() {
        let store = store();
        store.refresh_roster(None).await.unwrap();
        store.select("a").await.unwrap();
        store.reset().await;

        let snapshot = store.snapshot().await;
        assert!(snapshot.roster.is_empty());
        assert!(snapshot.conversation.is_empty());
        assert_eq!(snapshot.selection.selected_customer_id, None);
    }
}
