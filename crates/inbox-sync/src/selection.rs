//! Which conversation is open, and how the viewport should follow it.

use crm_gateway::CustomerDetail;
use tracing::debug;

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPhase {
    /// Nothing is loading. Holds the selected customer, if any, whose
    /// history has not been shown yet (for example after a failed fetch).
    Idle(Option<String>),
    /// A different customer was picked and its history is in flight.
    Switching { from: Option<String>, to: String },
    /// The conversation is on screen.
    Viewing(String),
}

impl Default for SelectionPhase {
    fn default() -> Self {
        SelectionPhase::Idle(None)
    }
}

/// What the viewport should do after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Leave the viewport where it is.
    Stay,
    /// Jump to the newest message without animation.
    JumpToBottom,
    /// Smoothly scroll to the newest message.
    AnimateToBottom,
}

/// Snapshot exposed to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub selected_customer_id: Option<String>,
    /// True from the moment of selection until the first render after the
    /// new history is in place.
    pub is_switching: bool,
    pub previous_selected_customer_id: Option<String>,
}

/// Whether a selection changes the conversation or refreshes the open one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    Switch,
    Refresh,
}

/// Issued by [`SelectionController::select`]. Responses are applied only
/// while their ticket is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectTicket {
    pub customer_id: String,
    pub kind: SelectKind,
    epoch: u64,
    switch_seq: u64,
}

/// State machine over [`SelectionPhase`].
///
/// Every selection bumps an epoch; a history response carrying an older
/// epoch is stale and must be discarded. Detail is only fetched on a switch
/// and is guarded by a separate switch counter, so a refresh does not
/// invalidate a detail fetch still in flight.
#[derive(Debug, Default)]
pub struct SelectionController {
    phase: SelectionPhase,
    previous: Option<String>,
    epoch: u64,
    switch_seq: u64,
    switch_pending: bool,
    detail: Option<CustomerDetail>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a customer.
    ///
    /// Picking anything other than the conversation on screen starts a
    /// switch: the detail is cleared and the next history load jumps to the
    /// bottom. Re-picking the conversation on screen is a refresh: data is
    /// reloaded but the viewport is left alone.
    pub fn select(&mut self, customer_id: &str) -> SelectTicket {
        self.epoch += 1;

        let kind = match self.phase {
            SelectionPhase::Viewing(ref current) if current == customer_id => SelectKind::Refresh,
            _ => SelectKind::Switch,
        };

        if kind == SelectKind::Switch {
            let from = match self.phase {
                SelectionPhase::Switching { ref from, ref to } if to == customer_id => from.clone(),
                _ => self.selected().map(str::to_string),
            };
            if from.as_deref() != Some(customer_id) {
                self.previous = from.clone();
            }
            debug!("Switching conversation {:?} -> {}", from, customer_id);

            self.phase = SelectionPhase::Switching {
                from,
                to: customer_id.to_string(),
            };
            self.switch_seq += 1;
            self.switch_pending = true;
            self.detail = None;
        } else {
            debug!("Refreshing open conversation {}", customer_id);
        }

        SelectTicket {
            customer_id: customer_id.to_string(),
            kind,
            epoch: self.epoch,
            switch_seq: self.switch_seq,
        }
    }

    /// True if no selection has happened since `ticket` was issued.
    pub fn is_current(&self, ticket: &SelectTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// The history for `ticket` is in the conversation cache.
    ///
    /// Returns `None` for a stale ticket, otherwise the scroll the viewport
    /// should perform.
    pub fn history_loaded(&mut self, ticket: &SelectTicket) -> Option<ScrollCommand> {
        if !self.is_current(ticket) {
            return None;
        }
        match self.phase {
            SelectionPhase::Switching { ref to, .. } if *to == ticket.customer_id => {
                self.phase = SelectionPhase::Viewing(to.clone());
                Some(ScrollCommand::JumpToBottom)
            }
            SelectionPhase::Viewing(ref current) if *current == ticket.customer_id => {
                Some(ScrollCommand::Stay)
            }
            _ => None,
        }
    }

    /// The history fetch for `ticket` failed. A pending switch settles in
    /// `Idle` with the customer still selected.
    pub fn history_failed(&mut self, ticket: &SelectTicket) {
        if !self.is_current(ticket) {
            return;
        }
        if let SelectionPhase::Switching { ref to, .. } = self.phase {
            self.phase = SelectionPhase::Idle(Some(to.clone()));
        }
    }

    /// The conversation for `customer_id` changed (message appended or sent).
    pub fn conversation_updated(&self, customer_id: &str) -> ScrollCommand {
        match self.phase {
            SelectionPhase::Viewing(ref current) if current == customer_id => {
                ScrollCommand::AnimateToBottom
            }
            _ => ScrollCommand::Stay,
        }
    }

    /// A render pass finished. Clears the switching flag once the switched-to
    /// conversation is on screen; returns true on that single transition.
    pub fn render_completed(&mut self) -> bool {
        if self.switch_pending && matches!(self.phase, SelectionPhase::Viewing(_)) {
            self.switch_pending = false;
            return true;
        }
        false
    }

    /// Currently selected customer, whether loaded or not.
    pub fn selected(&self) -> Option<&str> {
        match self.phase {
            SelectionPhase::Idle(ref id) => id.as_deref(),
            SelectionPhase::Switching { ref to, .. } => Some(to),
            SelectionPhase::Viewing(ref id) => Some(id),
        }
    }

    pub fn is_selected(&self, customer_id: &str) -> bool {
        self.selected() == Some(customer_id)
    }

    pub fn phase(&self) -> &SelectionPhase {
        &self.phase
    }

    pub fn state(&self) -> SelectionState {
        SelectionState {
            selected_customer_id: self.selected().map(str::to_string),
            is_switching: self.switch_pending,
            previous_selected_customer_id: self.previous.clone(),
        }
    }

    /// Store a fetched detail. Discarded unless it belongs to the switch
    /// that requested it.
    pub fn set_detail(&mut self, ticket: &SelectTicket, detail: CustomerDetail) -> bool {
        if ticket.switch_seq != self.switch_seq
            || !self.is_selected(&ticket.customer_id)
            || detail.id() != ticket.customer_id
        {
            debug!("Discarding stale detail for {}", detail.id());
            return false;
        }
        self.detail = Some(detail);
        true
    }

    /// Replace the detail wholesale if it is for the selected customer.
    pub fn replace_detail_if_open(&mut self, detail: CustomerDetail) -> bool {
        if !self.is_selected(detail.id()) {
            return false;
        }
        self.detail = Some(detail);
        true
    }

    pub fn detail(&self) -> Option<&CustomerDetail> {
        self.detail.as_ref()
    }

    /// Deselect. Any response still in flight becomes stale.
    pub fn close(&mut self) {
        if let Some(current) = self.selected() {
            self.previous = Some(current.to_string());
        }
        self.epoch += 1;
        self.switch_seq += 1;
        self.phase = SelectionPhase::Idle(None);
        self.switch_pending = false;
        self.detail = None;
    }
}
