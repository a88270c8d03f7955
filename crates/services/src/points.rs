//! Points ledger.
//!
//! Owns the running balance and the capped award history, mirrors both into
//! the key-value store after every change. Observers get a revision counter
//! for any change and, for the toast driver, a stream of every new award.

use parking_lot::{Mutex, RwLock};
use shared::clock::now_millis;
use shared::points::{PointEvent, PointEventType, PointRule, PointsState};
use shared::storage::{self, keys, KeyValueStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub struct PointsLedger {
    state: RwLock<PointsState>,
    store: Arc<dyn KeyValueStore>,
    revision: watch::Sender<u64>,
    award_subscribers: Mutex<Vec<mpsc::UnboundedSender<PointEvent>>>,
}

impl PointsLedger {
    /// Restore the ledger from `store`; missing or corrupt values start at zero
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let total_points = match store.get(keys::TOTAL_POINTS) {
            Ok(Some(raw)) => raw.trim().parse::<u64>().unwrap_or_else(|e| {
                tracing::warn!(value = %raw, error = %e, "ignoring corrupt point balance");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read point balance");
                0
            }
        };
        let mut history: Vec<PointEvent> =
            storage::load(store.as_ref(), keys::POINT_EVENTS).unwrap_or_default();
        history.truncate(shared::points::HISTORY_CAP);

        tracing::debug!(total_points, events = history.len(), "points ledger loaded");

        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(PointsState {
                total_points,
                history,
            }),
            store,
            revision,
            award_subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Award `points` (> 0) and record the event at the front of the history.
    ///
    /// # Panics
    /// If `points` is zero. Callers only award fixed, positive amounts.
    pub fn add_points(&self, kind: PointEventType, points: u32, message: impl Into<String>) -> PointEvent {
        assert!(points > 0, "point awards must be positive");

        let event = PointEvent::new(kind, points, message, now_millis());
        {
            let mut state = self.state.write();
            state.record(event.clone());
            self.persist(&state);
            // Sent under the state lock so `subscribe_awards` snapshots line up
            self.award_subscribers
                .lock()
                .retain(|tx| tx.send(event.clone()).is_ok());
        }
        tracing::info!(kind = ?kind, points, "points awarded");
        self.bump();
        event
    }

    pub fn award(&self, rule: PointRule) -> PointEvent {
        self.add_points(rule.kind, rule.points, rule.message)
    }

    pub fn mark_all_as_read(&self) {
        let mut state = self.state.write();
        if state.history.iter().all(|e| e.read) {
            return;
        }
        for event in state.history.iter_mut() {
            event.read = true;
        }
        self.persist(&state);
        drop(state);
        self.bump();
    }

    /// Acknowledge one event; unknown ids are ignored
    pub fn mark_as_read(&self, id: &str) {
        let mut state = self.state.write();
        let Some(event) = state.history.iter_mut().find(|e| e.id == id) else {
            tracing::debug!(id, "mark_as_read: no such event");
            return;
        };
        if event.read {
            return;
        }
        event.read = true;
        self.persist(&state);
        drop(state);
        self.bump();
    }

    pub fn total_points(&self) -> u64 {
        self.state.read().total_points
    }

    /// Newest-first snapshot of the history
    pub fn history(&self) -> Vec<PointEvent> {
        self.state.read().history.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state.read().unread_count()
    }

    pub fn state(&self) -> PointsState {
        self.state.read().clone()
    }

    /// Receiver that changes whenever the history changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// History snapshot plus a stream of every award made after it.
    ///
    /// The stream is unbounded and never coalesces, so a burst larger than
    /// the history cap still arrives in full. It ends once the ledger is
    /// dropped, after the buffered awards have been received.
    pub fn subscribe_awards(&self) -> (Vec<PointEvent>, mpsc::UnboundedReceiver<PointEvent>) {
        let state = self.state.read();
        let (tx, rx) = mpsc::unbounded_channel();
        self.award_subscribers.lock().push(tx);
        (state.history.clone(), rx)
    }

    fn persist(&self, state: &PointsState) {
        if let Err(e) = self
            .store
            .set(keys::TOTAL_POINTS, &state.total_points.to_string())
        {
            tracing::warn!(error = %e, "failed to persist point balance");
        }
        storage::mirror(self.store.as_ref(), keys::POINT_EVENTS, &state.history);
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}
