//! Chat session: ties the thread store, the backend and the points ledger
//! together for user-initiated actions.

use chrono::NaiveDate;
use providers::ChatBackend;
use shared::chat::Message;
use shared::points::{PointEvent, CHAT_RULE, DAILY_RULE, FEEDBACK_RULE, LOGIN_RULE, SIGNUP_RULE};
use shared::storage::{keys, KeyValueStore};
use std::sync::Arc;

use crate::error::{ChatError, Result};
use crate::points::PointsLedger;
use crate::threads::ThreadStore;

const LOGIN_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct ChatSession {
    threads: Arc<ThreadStore>,
    ledger: Arc<PointsLedger>,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn KeyValueStore>,
}

impl ChatSession {
    pub fn new(
        threads: Arc<ThreadStore>,
        ledger: Arc<PointsLedger>,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            threads,
            ledger,
            backend,
            store,
        }
    }

    pub fn threads(&self) -> &Arc<ThreadStore> {
        &self.threads
    }

    pub fn ledger(&self) -> &Arc<PointsLedger> {
        &self.ledger
    }

    /// Post `content` to `thread_id` and wait for the reply.
    ///
    /// The user message is stored (and the chat point awarded) before the
    /// backend is asked, so it stays in the thread even if the request fails.
    /// The reply lands in `thread_id` regardless of which thread is active by
    /// then.
    pub async fn send_message(&self, thread_id: &str, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.threads.add_message(thread_id, Message::user(content)) {
            return Err(ChatError::ThreadNotFound(thread_id.to_string()));
        }
        self.ledger.award(CHAT_RULE);

        let reply = match self.backend.send_message(content, Some(thread_id)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "backend did not answer");
                return Err(e.into());
            }
        };
        // The thread may have been removed while waiting; the reply is still returned
        self.threads.add_message(thread_id, reply.clone());
        Ok(reply)
    }

    /// Rate an assistant message (1 to 5) and earn the feedback bonus
    pub fn submit_feedback(&self, message_id: &str, rating: u8, comment: Option<&str>) -> Result<PointEvent> {
        if !(1..=5).contains(&rating) {
            return Err(ChatError::InvalidRating(rating));
        }
        tracing::info!(message_id, rating, comment = comment.unwrap_or(""), "feedback submitted");
        Ok(self.ledger.award(FEEDBACK_RULE))
    }

    pub fn login(&self) -> PointEvent {
        self.ledger.award(LOGIN_RULE)
    }

    pub fn sign_up(&self) -> PointEvent {
        self.ledger.award(SIGNUP_RULE)
    }

    /// Award the daily bonus unless it was already given on `today`
    pub fn check_daily_bonus(&self, today: NaiveDate) -> Option<PointEvent> {
        let last = match self.store.get(keys::LAST_LOGIN_DATE) {
            Ok(value) => value.and_then(|raw| NaiveDate::parse_from_str(&raw, LOGIN_DATE_FORMAT).ok()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read last login date");
                None
            }
        };
        if last == Some(today) {
            return None;
        }

        let event = self.ledger.award(DAILY_RULE);
        let stamp = today.format(LOGIN_DATE_FORMAT).to_string();
        if let Err(e) = self.store.set(keys::LAST_LOGIN_DATE, &stamp) {
            tracing::warn!(error = %e, "could not record login date");
        }
        Some(event)
    }
}
