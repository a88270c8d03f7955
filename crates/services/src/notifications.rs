//! "+N points" toast queue.
//!
//! `NotificationQueue` decides which ledger events deserve a toast and in what
//! order; it holds no timers. `NotificationDriver` feeds it the ledger's
//! award stream on a tokio task, showing one toast at a time and reporting
//! each show/hide over a channel.

use shared::points::{NotificationEntry, PointEvent};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::points::PointsLedger;

/// Events older than this when first seen are not announced
pub const FRESHNESS_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Default)]
pub struct NotificationQueue {
    last_processed_event_id: Option<String>,
    pending: VecDeque<NotificationEntry>,
    is_animating: bool,
    initial_load_done: bool,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, history: &[PointEvent]) -> usize {
        self.observe_at(history, shared::clock::now_millis())
    }

    /// Look at the newest-first `history` and queue every event that arrived
    /// since the previous call and is still fresh at `now_ms`. The first call
    /// only records where the history stands. Returns how many were queued.
    pub fn observe_at(&mut self, history: &[PointEvent], now_ms: i64) -> usize {
        let newest = history.first().map(|e| e.id.clone());

        if !self.initial_load_done {
            self.initial_load_done = true;
            self.last_processed_event_id = newest;
            return 0;
        }
        if newest.is_none() || newest == self.last_processed_event_id {
            return 0;
        }

        // Everything newer than the pointer; the whole history if it was evicted
        let unseen = history
            .iter()
            .take_while(|e| Some(&e.id) != self.last_processed_event_id.as_ref());

        let fresh: Vec<NotificationEntry> = unseen
            .filter(|e| e.timestamp > now_ms - FRESHNESS_WINDOW_MS)
            .map(NotificationEntry::from)
            .collect();

        let queued = fresh.len();
        self.pending.extend(fresh.into_iter().rev());
        self.last_processed_event_id = newest;

        if queued > 0 {
            tracing::debug!(queued, pending = self.pending.len(), "queued point toasts");
        }
        queued
    }

    pub fn push(&mut self, event: &PointEvent) -> bool {
        self.push_at(event, shared::clock::now_millis())
    }

    /// Queue a single award reported as it happened. Stale events and the
    /// event the pointer already names are consumed without a toast.
    pub fn push_at(&mut self, event: &PointEvent, now_ms: i64) -> bool {
        self.initial_load_done = true;
        if self.last_processed_event_id.as_deref() == Some(event.id.as_str()) {
            return false;
        }
        self.last_processed_event_id = Some(event.id.clone());
        if event.timestamp <= now_ms - FRESHNESS_WINDOW_MS {
            return false;
        }
        self.pending.push_back(NotificationEntry::from(event));
        true
    }

    /// Start showing the front entry. `None` while one is already showing or
    /// nothing is queued.
    pub fn begin_next(&mut self) -> Option<NotificationEntry> {
        if self.is_animating {
            return None;
        }
        let entry = self.pending.front()?.clone();
        self.is_animating = true;
        Some(entry)
    }

    /// Retire the entry being shown
    pub fn finish_current(&mut self) -> Option<NotificationEntry> {
        if !self.is_animating {
            return None;
        }
        self.is_animating = false;
        self.pending.pop_front()
    }

    pub fn current(&self) -> Option<&NotificationEntry> {
        if self.is_animating {
            self.pending.front()
        } else {
            None
        }
    }

    /// Queued entries, including the one on screen
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_animating(&self) -> bool {
        self.is_animating
    }

    pub fn last_processed_event_id(&self) -> Option<&str> {
        self.last_processed_event_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastEvent {
    Shown(NotificationEntry),
    Hidden(NotificationEntry),
}

/// Runs a `NotificationQueue` against a ledger's award stream.
///
/// Awards are queued as they are made rather than recovered from the capped
/// history, so a burst of any size is shown in full. When the ledger is
/// dropped the driver shows every award still buffered and exits; it exits
/// early if the receiving side of the toast channel goes away.
pub struct NotificationDriver {
    awards: mpsc::UnboundedReceiver<PointEvent>,
    display: Duration,
    queue: NotificationQueue,
    events: mpsc::UnboundedSender<ToastEvent>,
}

impl NotificationDriver {
    /// Take the ledger's current history as already seen and start the task
    pub fn spawn(
        ledger: &PointsLedger,
        display: Duration,
    ) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ToastEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (history, awards) = ledger.subscribe_awards();
        let mut queue = NotificationQueue::new();
        queue.observe(&history);

        let driver = Self {
            awards,
            display,
            queue,
            events,
        };
        (tokio::spawn(driver.run()), rx)
    }

    async fn run(mut self) {
        let mut ledger_alive = true;
        loop {
            if let Some(entry) = self.queue.begin_next() {
                if self.events.send(ToastEvent::Shown(entry)).is_err() {
                    return;
                }

                // New awards keep queueing while the toast is on screen
                let hold = tokio::time::sleep(self.display);
                tokio::pin!(hold);
                loop {
                    tokio::select! {
                        _ = &mut hold => break,
                        award = self.awards.recv(), if ledger_alive => match award {
                            Some(event) => {
                                self.queue.push(&event);
                            }
                            None => ledger_alive = false,
                        },
                    }
                }

                if let Some(done) = self.queue.finish_current() {
                    if self.events.send(ToastEvent::Hidden(done)).is_err() {
                        return;
                    }
                }
                continue;
            }

            if !ledger_alive {
                break;
            }
            match self.awards.recv().await {
                Some(event) => {
                    self.queue.push(&event);
                }
                None => ledger_alive = false,
            }
        }
        tracing::debug!("notification driver stopped");
    }
}
