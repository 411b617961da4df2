//! Tracks which request events have been answered and gates replay dispatch
//! on EOSE.

use std::collections::{HashMap, HashSet};

use crate::event::NostrEvent;

/// Lookback window applied to both subscriptions on (re)subscribe.
pub const LOOKBACK_SECS: u64 = 3 * 3600;

/// Per-(re)subscription state. Owned by the relay reader task; every other
/// component treats it as read-only.
#[derive(Debug, Default)]
pub struct MainSubscription {
    /// Subscription id for the requests filter.
    pub requests_sub_id: String,
    /// Subscription id for the responses filter.
    pub responses_sub_id: String,
    /// Whether EOSE has been seen on the requests subscription.
    pub requests_eose: bool,
    /// Whether EOSE has been seen on the responses subscription.
    pub responses_eose: bool,
    /// Buffered request events, by event id.
    events: HashMap<String, NostrEvent>,
    /// Event ids of requests already answered, from this or a prior process.
    responded: HashSet<String>,
    /// Arrival order of buffered request ids, for in-order replay.
    arrival_order: Vec<String>,
}

/// What to do with an inbound event, decided by [`MainSubscription`]'s
/// ordering rules.
#[derive(Debug, PartialEq, Eq)]
pub enum RequestDisposition {
    /// Dispatch immediately (either both EOSE are already true, or this is
    /// part of the replay batch and not already responded).
    Dispatch(NostrEvent),
    /// Buffered; will be dispatched (or dropped) once both EOSE flags flip.
    Buffered,
}

impl MainSubscription {
    /// A fresh subscription state with the given subscription ids.
    pub fn new(requests_sub_id: impl Into<String>, responses_sub_id: impl Into<String>) -> Self {
        Self {
            requests_sub_id: requests_sub_id.into(),
            responses_sub_id: responses_sub_id.into(),
            requests_eose: false,
            responses_eose: false,
            events: HashMap::new(),
            responded: HashSet::new(),
            arrival_order: Vec::new(),
        }
    }

    /// Whether both subscriptions have completed their backfill.
    pub fn both_eose(&self) -> bool {
        self.requests_eose && self.responses_eose
    }

    /// Record that `request_id` has an authored response (its `e`-tag value
    /// on an inbound kind-23195 event).
    pub fn mark_responded(&mut self, request_id: impl Into<String>) {
        self.responded.insert(request_id.into());
    }

    /// A request event arrived. Ordering rules:
    /// - If both EOSE flags are already true, dispatch immediately.
    /// - Otherwise buffer it; [`Self::drain_replay`] decides its fate once
    ///   both flags flip.
    pub fn handle_request(&mut self, event: NostrEvent) -> RequestDisposition {
        if self.both_eose() {
            return RequestDisposition::Dispatch(event);
        }
        let id = event.id.clone();
        if !self.events.contains_key(&id) {
            self.arrival_order.push(id.clone());
        }
        self.events.insert(id, event);
        RequestDisposition::Buffered
    }

    /// Record EOSE on one of the two subscriptions. Returns the batch of
    /// buffered requests to dispatch if this flips [`Self::both_eose`] to
    /// true (empty otherwise, and empty again on subsequent calls).
    pub fn observe_eose(&mut self, sub_id: &str) -> Vec<NostrEvent> {
        let was_both = self.both_eose();
        if sub_id == self.requests_sub_id {
            self.requests_eose = true;
        } else if sub_id == self.responses_sub_id {
            self.responses_eose = true;
        }
        if !was_both && self.both_eose() {
            self.drain_replay()
        } else {
            Vec::new()
        }
    }

    /// Every buffered request not already in `responded`, in arrival order.
    /// Ensures at-most-once dispatch.
    fn drain_replay(&mut self) -> Vec<NostrEvent> {
        let mut out = Vec::new();
        for id in self.arrival_order.drain(..) {
            if self.responded.contains(&id) {
                continue;
            }
            if let Some(event) = self.events.remove(&id) {
                out.push(event);
            }
        }
        self.events.clear();
        out
    }
}
