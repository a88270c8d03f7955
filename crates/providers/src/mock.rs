//! In-process stand-in for the chat service.
//!
//! Keeps its own thread list (the "server" side), answers with canned
//! replies after a short delay, and mirrors every change into the key-value
//! store so a reload resumes the same state.

use anyhow::Result;
use parking_lot::RwLock;
use shared::chat::{ChatThread, Message, ThreadShare, ThreadUpdate};
use shared::settings::BackendSettings;
use shared::storage::{self, keys, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::ChatBackend;

/// Threads served when the store holds none
const SEED_THREADS: &str = include_str!("../data/seed_threads.json");

/// The recorded user message is back-dated by this much relative to the reply
const USER_MESSAGE_LEAD_MS: i64 = 500;

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub reply_delay: Duration,
    pub regenerate_delay: Duration,
    pub share_base_url: String,
}

impl MockOptions {
    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self {
            reply_delay: Duration::from_millis(settings.reply_delay_ms),
            regenerate_delay: Duration::from_millis(settings.regenerate_delay_ms),
            share_base_url: settings.share_base_url.clone(),
        }
    }

    /// No artificial latency
    pub fn instant() -> Self {
        Self {
            reply_delay: Duration::ZERO,
            regenerate_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl Default for MockOptions {
    fn default() -> Self {
        Self::from_settings(&BackendSettings::default())
    }
}

pub struct MockBackend {
    threads: RwLock<Vec<ChatThread>>,
    store: Arc<dyn KeyValueStore>,
    options: MockOptions,
}

impl MockBackend {
    /// Restore the thread list from `store`, or seed the built-in threads
    pub fn new(store: Arc<dyn KeyValueStore>, options: MockOptions) -> Self {
        let threads = match storage::load::<Vec<ChatThread>>(store.as_ref(), keys::MOCK_THREADS) {
            Some(threads) if !threads.is_empty() => {
                tracing::info!(count = threads.len(), "restored mock threads from storage");
                threads
            }
            _ => {
                let seeded = seed_threads();
                tracing::info!(count = seeded.len(), "seeded built-in mock threads");
                storage::mirror(store.as_ref(), keys::MOCK_THREADS, &seeded);
                seeded
            }
        };

        Self {
            threads: RwLock::new(threads),
            store,
            options,
        }
    }

    fn persist(&self, threads: &[ChatThread]) {
        storage::mirror(self.store.as_ref(), keys::MOCK_THREADS, threads);
    }
}

fn seed_threads() -> Vec<ChatThread> {
    match serde_json::from_str(SEED_THREADS) {
        Ok(threads) => threads,
        Err(e) => {
            tracing::warn!(error = %e, "built-in seed threads are invalid");
            Vec::new()
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send_message(&self, content: &str, thread_id: Option<&str>) -> Result<Message> {
        tokio::time::sleep(self.options.reply_delay).await;

        let reply = Message::assistant(format!("Mock response: {}", content));

        if let Some(thread_id) = thread_id {
            let mut threads = self.threads.write();
            if let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) {
                let mut user = Message::user(content);
                user.timestamp = reply.timestamp - USER_MESSAGE_LEAD_MS;
                thread.messages.push(user);
                thread.messages.push(reply.clone());
                thread.touch();
                self.persist(&threads);
            }
        }

        Ok(reply)
    }

    async fn create_thread(&self, title: &str) -> Result<ChatThread> {
        let thread = ChatThread::new(Some(title));
        let mut threads = self.threads.write();
        threads.push(thread.clone());
        self.persist(&threads);
        Ok(thread)
    }

    async fn list_threads(&self) -> Result<Vec<ChatThread>> {
        Ok(self.threads.read().clone())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        Ok(self.threads.read().iter().find(|t| t.id == thread_id).cloned())
    }

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Option<ChatThread>> {
        let mut threads = self.threads.write();
        let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) else {
            return Ok(None);
        };
        thread.apply_update(update);
        let updated = thread.clone();
        self.persist(&threads);
        Ok(Some(updated))
    }

    async fn regenerate_message(
        &self,
        thread_id: &str,
        message_id: &str,
        context: &str,
    ) -> Result<Message> {
        tokio::time::sleep(self.options.regenerate_delay).await;

        let regenerated = Message::assistant(format!("Regenerated response to: {}", context));

        let mut threads = self.threads.write();
        if let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) {
            if let Some(idx) = thread.message_index(message_id) {
                if thread.messages[idx].role == shared::chat::Role::Assistant {
                    thread.messages[idx] = regenerated.clone();
                    thread.touch();
                    self.persist(&threads);
                }
            }
        }

        Ok(regenerated)
    }

    async fn share_thread(&self, thread_id: &str) -> Result<ThreadShare> {
        let share = ThreadShare::generate(thread_id, &self.options.share_base_url);

        let mut threads = self.threads.write();
        if let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) {
            thread.is_shared = true;
            thread.share_url = Some(share.url.clone());
            thread.touch();
            self.persist(&threads);
        }

        Ok(share)
    }
}
