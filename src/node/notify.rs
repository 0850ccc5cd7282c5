//! Live-update change notification.
//!
//! Every mutation of the active options (model selection or any parameter
//! field) funnels through here. With live update on, a batch of edits
//! yields exactly one aggregated "options changed" event — never one event
//! per field — which the host drains via [`ChangeNotifier::take_event`]
//! and answers with a recompute. With live update off, edits accumulate
//! silently until an explicit fit request queues the same single event.
//!
//! Subscriptions are tied 1:1 to (toggle state × current parameter-row
//! set): toggling on subscribes every current row, toggling off drops them
//! all, and a row rebuild (model change) re-derives the set — subscribing
//! the new rows only if live. Edits against rows not currently subscribed
//! are ignored, so stale rows can never queue events.

use tracing::debug;

/// Aggregating notifier behind the "live update" toggle.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    live: bool,
    pending: bool,
    rows: Vec<String>,
    subscribed: bool,
}

impl ChangeNotifier {
    /// A notifier with live update off and no parameter rows.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> bool {
        self.live
    }

    /// Rows currently subscribed for change events (empty unless live).
    pub fn subscribed_rows(&self) -> &[String] {
        if self.subscribed { &self.rows } else { &[] }
    }

    /// Toggle live update, (un)subscribing every current row.
    pub fn set_live(&mut self, live: bool) {
        self.live = live;
        self.subscribed = live;
        debug!(live, rows = self.rows.len(), "live update toggled");
    }

    /// Replace the parameter-row set (the model selection changed and the
    /// table was rebuilt). Old subscriptions are dropped with the old
    /// rows; the new rows are subscribed only if live update is on.
    pub fn rebuild_rows(&mut self, names: &[String]) {
        self.rows = names.to_vec();
        self.subscribed = self.live;
    }

    /// A parameter field changed. Queues the aggregated event only when
    /// the row is currently subscribed.
    pub fn record_param_edit(&mut self, row: &str) {
        if self.subscribed && self.rows.iter().any(|r| r == row) {
            self.pending = true;
        }
    }

    /// The model selection changed. Queues the aggregated event when live.
    pub fn record_model_change(&mut self) {
        if self.live {
            self.pending = true;
        }
    }

    /// Explicit "fit now": queue the aggregated event regardless of the
    /// toggle.
    pub fn request_fit(&mut self) {
        self.pending = true;
    }

    /// Drain the aggregated event. Returns `true` at most once per batch
    /// of mutations, strictly after those mutations happened.
    pub fn take_event(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}
