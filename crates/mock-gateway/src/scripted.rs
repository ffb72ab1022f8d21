//! Scripted backend - an in-memory CRM with switches for failures and latency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use crm_gateway::{
    AckState, CrmApi, CustomerDetail, CustomerPatch, CustomerSummary, Direction, GatewayError,
    Message, SendReceipt, SendRequest, Stage,
};
use tokio::sync::Notify;

/// First id handed out to messages accepted by [`ScriptedApi::send_message`].
const FIRST_SENT_ID: i64 = 10_000;

/// Holds back the next history response for one customer until released.
///
/// The response body is captured when the request arrives, so releasing
/// later models a slow server answering with what it knew at the time.
#[derive(Debug, Clone, Default)]
pub struct HistoryGate {
    notify: Arc<Notify>,
}

impl HistoryGate {
    /// Let the held response through. Safe to call before the request arrives.
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct State {
    /// Server order, most recent first.
    customers: Vec<CustomerSummary>,
    details: HashMap<String, CustomerDetail>,
    histories: HashMap<String, Vec<Message>>,
    stages: Vec<Stage>,
    gates: HashMap<String, HistoryGate>,
    next_message_id: i64,
    clock: u64,
    signed_out: bool,
    fail_reads: bool,
    fail_sends: bool,
    sent: Vec<SendRequest>,
    read_marks: Vec<String>,
    history_calls: Vec<String>,
    list_calls: usize,
    patches: Vec<(String, CustomerPatch)>,
}

/// An in-memory CRM backend.
///
/// Sending a message behaves like a real server: the message gets an id,
/// lands in the customer's history and moves the customer to the head of
/// the list.
#[derive(Debug)]
pub struct ScriptedApi {
    state: Mutex<State>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

fn outage() -> GatewayError {
    GatewayError::Status {
        status: 503,
        body: "scripted outage".to_string(),
    }
}

fn not_found(what: &str) -> GatewayError {
    GatewayError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_message_id: FIRST_SENT_ID,
                clock: 1_000_000,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a customer at the tail of the server order.
    pub fn add_customer(&self, customer: CustomerSummary) {
        self.lock().customers.push(customer);
    }

    /// Replace a customer's history.
    pub fn set_history(&self, customer_id: &str, messages: Vec<Message>) {
        self.lock()
            .histories
            .insert(customer_id.to_string(), messages);
    }

    /// Record a message server-side as if it had just arrived.
    pub fn push_message(&self, message: Message) {
        let mut state = self.lock();
        let customer_id = message.customer_id.clone();
        if let Some(pos) = state.customers.iter().position(|c| c.id == customer_id) {
            let mut customer = state.customers.remove(pos);
            customer.last_message_preview = message.content.clone();
            customer.last_message_timestamp = message.timestamp;
            if message.direction == Direction::Inbound {
                customer.unread_count += 1;
            }
            state.customers.insert(0, customer);
        }
        state.clock = state.clock.max(message.timestamp);
        state.histories.entry(customer_id).or_default().push(message);
    }

    pub fn set_detail(&self, detail: CustomerDetail) {
        self.lock().details.insert(detail.id().to_string(), detail);
    }

    pub fn set_stages(&self, stages: Vec<Stage>) {
        self.lock().stages = stages;
    }

    /// Make every read call fail with a 503.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every send fail with a 503.
    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Reject every call as unauthenticated.
    pub fn sign_out(&self) {
        self.lock().signed_out = true;
    }

    /// Hold the next history response for `customer_id`.
    pub fn hold_history(&self, customer_id: &str) -> HistoryGate {
        let gate = HistoryGate::default();
        self.lock()
            .gates
            .insert(customer_id.to_string(), gate.clone());
        gate
    }

    /// Requests accepted by `send_message`.
    pub fn sent(&self) -> Vec<SendRequest> {
        self.lock().sent.clone()
    }

    /// Customer ids passed to `mark_read`, in call order.
    pub fn read_marks(&self) -> Vec<String> {
        self.lock().read_marks.clone()
    }

    /// Customer ids passed to `conversation_history`, in call order.
    pub fn history_calls(&self) -> Vec<String> {
        self.lock().history_calls.clone()
    }

    /// Number of `list_customers` calls.
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Patches applied, in call order.
    pub fn patches(&self) -> Vec<(String, CustomerPatch)> {
        self.lock().patches.clone()
    }

    fn check_read(state: &State) -> Result<(), GatewayError> {
        if state.signed_out {
            return Err(GatewayError::Unauthenticated);
        }
        if state.fail_reads {
            return Err(outage());
        }
        Ok(())
    }

    fn detail_for(state: &State, customer_id: &str) -> Option<CustomerDetail> {
        if let Some(detail) = state.details.get(customer_id) {
            return Some(detail.clone());
        }
        state
            .customers
            .iter()
            .find(|c| c.id == customer_id)
            .map(|summary| CustomerDetail {
                summary: summary.clone(),
                email: None,
                notes: None,
                custom_fields: Default::default(),
                channel_ids: Default::default(),
            })
    }
}

#[async_trait]
impl CrmApi for ScriptedApi {
    async fn list_customers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CustomerSummary>, GatewayError> {
        let mut state = self.lock();
        state.list_calls += 1;
        Self::check_read(&state)?;

        let needle = search.map(|s| s.to_lowercase());
        Ok(state
            .customers
            .iter()
            .filter(|c| match needle {
                Some(ref q) => {
                    c.display_name.to_lowercase().contains(q.as_str()) || c.phone.contains(q.as_str())
                }
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn customer_detail(&self, customer_id: &str) -> Result<CustomerDetail, GatewayError> {
        let state = self.lock();
        Self::check_read(&state)?;
        Self::detail_for(&state, customer_id).ok_or_else(|| not_found(customer_id))
    }

    async fn conversation_history(&self, customer_id: &str) -> Result<Vec<Message>, GatewayError> {
        let (result, gate) = {
            let mut state = self.lock();
            state.history_calls.push(customer_id.to_string());
            let result = Self::check_read(&state).map(|()| {
                state
                    .histories
                    .get(customer_id)
                    .cloned()
                    .unwrap_or_default()
            });
            (result, state.gates.remove(customer_id))
        };

        if let Some(gate) = gate {
            gate.notify.notified().await;
        }
        result
    }

    async fn pipeline_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        let state = self.lock();
        Self::check_read(&state)?;
        Ok(state.stages.clone())
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        let mut state = self.lock();
        if state.signed_out {
            return Err(GatewayError::Unauthenticated);
        }
        if state.fail_sends {
            return Err(outage());
        }

        let id = state.next_message_id;
        state.next_message_id += 1;
        state.clock += 1;
        let timestamp = state.clock;
        state.sent.push(request.clone());

        let message = Message {
            id,
            customer_id: request.customer_id.clone(),
            content: request.content.clone(),
            direction: Direction::Outbound,
            timestamp,
            channel: request.channel.clone(),
            ack_state: AckState::DeliveredUnconfirmed,
        };
        drop(state);
        self.push_message(message);

        Ok(SendReceipt {
            id: Some(id),
            timestamp: Some(timestamp),
            ack_state: Some(AckState::DeliveredUnconfirmed),
        })
    }

    async fn mark_read(&self, customer_id: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if state.signed_out {
            return Err(GatewayError::Unauthenticated);
        }
        state.read_marks.push(customer_id.to_string());
        if state.fail_reads {
            return Err(outage());
        }
        if let Some(customer) = state.customers.iter_mut().find(|c| c.id == customer_id) {
            customer.unread_count = 0;
        }
        Ok(())
    }

    async fn patch_customer(
        &self,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<CustomerDetail, GatewayError> {
        let mut state = self.lock();
        Self::check_read(&state)?;
        let mut detail = Self::detail_for(&state, customer_id).ok_or_else(|| not_found(customer_id))?;

        patch.summary_update(customer_id).apply_to(&mut detail.summary);
        if let Some(ref email) = patch.email {
            detail.email = Some(email.clone());
        }
        if let Some(ref notes) = patch.notes {
            detail.notes = Some(notes.clone());
        }
        if let Some(ref fields) = patch.custom_fields {
            detail.custom_fields.extend(fields.clone());
        }

        if let Some(summary) = state.customers.iter_mut().find(|c| c.id == customer_id) {
            *summary = detail.summary.clone();
        }
        state.details.insert(customer_id.to_string(), detail.clone());
        state.patches.push((customer_id.to_string(), patch.clone()));
        Ok(detail)
    }
}
