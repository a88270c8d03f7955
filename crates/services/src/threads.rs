//! Thread store.
//!
//! Owns every chat thread and the active-thread pointer. Mutations are
//! applied in memory first and then mirrored to the key-value store.
//!
//! Async operations never hold the lock across a backend call: after the call
//! resolves they look the thread (and message) up again by id, so a thread
//! that disappeared or stopped being active in the meantime is handled
//! without touching the wrong one.

use parking_lot::RwLock;
use providers::ChatBackend;
use shared::chat::{ChatThread, Message, Role, ThreadShare};
use shared::settings::BackendSettings;
use shared::storage::{self, keys, KeyValueStore};
use std::sync::Arc;

use crate::error::Result;
use crate::export::{self, DocumentFormat, DocumentRenderer, ExportDocument, MarkdownPassthrough};

/// Prompt used when an assistant message has no user message before it
pub const FALLBACK_REGENERATE_CONTEXT: &str = "Please regenerate the previous response.";

#[derive(Default)]
struct ThreadState {
    threads: Vec<ChatThread>,
    active_thread_id: Option<String>,
}

pub struct ThreadStore {
    state: RwLock<ThreadState>,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn KeyValueStore>,
    renderer: Box<dyn DocumentRenderer>,
    share_base_url: String,
}

impl ThreadStore {
    /// Restore threads persisted in `store` (none is fine)
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        let threads: Vec<ChatThread> =
            storage::load(store.as_ref(), keys::CHAT_THREADS).unwrap_or_default();
        tracing::debug!(count = threads.len(), backend = backend.name(), "thread store loaded");

        Self {
            state: RwLock::new(ThreadState {
                threads,
                active_thread_id: None,
            }),
            backend,
            store,
            renderer: Box::new(MarkdownPassthrough),
            share_base_url: BackendSettings::default().share_base_url,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Base URL for share links built locally when the backend cannot share
    pub fn with_share_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.share_base_url = base_url.into();
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn threads(&self) -> Vec<ChatThread> {
        self.state.read().threads.clone()
    }

    pub fn thread(&self, thread_id: &str) -> Option<ChatThread> {
        self.state
            .read()
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .cloned()
    }

    pub fn active_thread_id(&self) -> Option<String> {
        self.state.read().active_thread_id.clone()
    }

    pub fn active_thread(&self) -> Option<ChatThread> {
        let state = self.state.read();
        let id = state.active_thread_id.as_deref()?;
        state.threads.iter().find(|t| t.id == id).cloned()
    }

    /// Select a thread (or none). Unknown ids leave the selection unchanged.
    pub fn set_active_thread(&self, thread_id: Option<&str>) -> bool {
        let mut state = self.state.write();
        match thread_id {
            None => {
                state.active_thread_id = None;
                true
            }
            Some(id) if state.threads.iter().any(|t| t.id == id) => {
                state.active_thread_id = Some(id.to_string());
                true
            }
            Some(id) => {
                tracing::warn!(thread_id = id, "cannot activate unknown thread");
                false
            }
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// New empty thread, made active; returns its id
    pub fn create_thread(&self, title: Option<&str>) -> String {
        let thread = ChatThread::new(title);
        let id = thread.id.clone();

        let mut state = self.state.write();
        state.threads.push(thread);
        state.active_thread_id = Some(id.clone());
        self.persist(&state);

        tracing::debug!(thread_id = %id, "thread created");
        id
    }

    /// Append `message`; `false` when the thread does not exist
    pub fn add_message(&self, thread_id: &str, message: Message) -> bool {
        self.with_thread(thread_id, "add_message", |thread| thread.push_message(message))
            .is_some()
    }

    pub fn toggle_bookmark(&self, thread_id: &str) -> bool {
        self.with_thread(thread_id, "toggle_bookmark", |thread| {
            thread.is_bookmarked = !thread.is_bookmarked;
            thread.touch();
        })
        .is_some()
    }

    /// Share a thread. Falls back to a locally built link when the backend
    /// refuses, so the caller always gets a share record.
    pub async fn share_thread(&self, thread_id: &str) -> ThreadShare {
        let share = match self.backend.share_thread(thread_id).await {
            Ok(share) => share,
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "backend share failed, building link locally");
                ThreadShare::generate(thread_id, &self.share_base_url)
            }
        };

        let url = share.url.clone();
        self.with_thread(thread_id, "share_thread", |thread| {
            thread.is_shared = true;
            thread.share_url = Some(url);
            thread.touch();
        });
        share
    }

    /// Regenerate around `message_id`.
    ///
    /// - user message: fetch a new reply to it; replace the assistant reply
    ///   that directly follows, or append when there is none
    /// - assistant message: rewrite it in place (same id and slot) using the
    ///   preceding user message as the prompt
    ///
    /// Returns `Ok(None)` when the thread or message is unknown (or vanished
    /// while the backend was working). Backend failures are returned.
    pub async fn regenerate_message(&self, thread_id: &str, message_id: &str) -> Result<Option<Message>> {
        let Some((target, context)) = self.regenerate_target(thread_id, message_id) else {
            return Ok(None);
        };

        match target.role {
            Role::User => {
                let reply = self.backend.send_message(&target.content, None).await?;
                let inserted = reply.clone();
                let applied = self.try_with_thread(thread_id, "regenerate_message", |thread| {
                    let idx = thread.message_index(message_id)?;
                    let has_reply = matches!(
                        thread.messages.get(idx + 1),
                        Some(next) if next.role == Role::Assistant
                    );
                    if has_reply {
                        thread.messages[idx + 1] = inserted;
                    } else {
                        thread.messages.push(inserted);
                    }
                    thread.touch();
                    Some(())
                });
                Ok(applied.map(|()| reply))
            }
            Role::Assistant => {
                let regenerated = self
                    .backend
                    .regenerate_message(thread_id, message_id, &context)
                    .await?;
                let updated = self.try_with_thread(thread_id, "regenerate_message", |thread| {
                    let idx = thread.message_index(message_id)?;
                    let slot = &mut thread.messages[idx];
                    slot.content = regenerated.content;
                    slot.timestamp = regenerated.timestamp;
                    let updated = slot.clone();
                    thread.touch();
                    Some(updated)
                });
                Ok(updated)
            }
        }
    }

    /// Target message plus the prompt to regenerate it from
    fn regenerate_target(&self, thread_id: &str, message_id: &str) -> Option<(Message, String)> {
        let state = self.state.read();
        let Some(thread) = state.threads.iter().find(|t| t.id == thread_id) else {
            tracing::warn!(thread_id, "regenerate_message: unknown thread");
            return None;
        };
        let Some(idx) = thread.message_index(message_id) else {
            tracing::warn!(thread_id, message_id, "regenerate_message: unknown message");
            return None;
        };
        let target = thread.messages[idx].clone();
        let context = match target.role {
            Role::User => target.content.clone(),
            Role::Assistant => thread.messages[..idx]
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_else(|| FALLBACK_REGENERATE_CONTEXT.to_string()),
        };
        Some((target, context))
    }

    /// Pull the backend's threads when nothing is stored locally yet; the
    /// first one becomes active. Returns how many threads were added.
    pub async fn seed_from_backend(&self) -> usize {
        if !self.state.read().threads.is_empty() {
            return 0;
        }
        let seeded = match self.backend.list_threads().await {
            Ok(threads) => threads,
            Err(e) => {
                tracing::warn!(error = %e, "could not load threads from backend");
                return 0;
            }
        };

        let mut state = self.state.write();
        // Threads created while the backend call was in flight win
        if !state.threads.is_empty() {
            return 0;
        }
        let count = seeded.len();
        state.active_thread_id = seeded.first().map(|t| t.id.clone());
        state.threads = seeded;
        self.persist(&state);
        tracing::info!(count, "seeded threads from backend");
        count
    }

    /// Import threads from a JSON export; ids already present are skipped
    pub fn import_threads_from_json(&self, json: &str) -> Result<usize> {
        let export = export::parse_json_export(json)?;

        let mut state = self.state.write();
        let mut imported = 0;
        for thread in export.threads {
            if state.threads.iter().any(|t| t.id == thread.id) {
                tracing::debug!(thread_id = %thread.id, "skipping already present thread");
                continue;
            }
            state.threads.push(thread);
            imported += 1;
        }
        if imported > 0 {
            self.persist(&state);
        }
        Ok(imported)
    }

    // ── Export ───────────────────────────────────────────────────────

    /// Selected threads (all when `None`) as `{threads, exportedAt}` JSON
    pub fn export_threads_to_json(&self, thread_ids: Option<&[String]>) -> Result<String> {
        let state = self.state.read();
        let selected: Vec<ChatThread> = match thread_ids {
            Some(ids) => state
                .threads
                .iter()
                .filter(|t| ids.contains(&t.id))
                .cloned()
                .collect(),
            None => state.threads.clone(),
        };
        export::threads_to_json(&selected)
    }

    /// Markdown transcript; empty when the thread is unknown
    pub fn export_thread_to_markdown(&self, thread_id: &str) -> String {
        self.thread(thread_id)
            .map(|t| export::thread_to_markdown(&t))
            .unwrap_or_default()
    }

    pub fn export_thread_to_pdf(&self, thread_id: &str) -> ExportDocument {
        self.export_document(thread_id, DocumentFormat::Pdf)
    }

    pub fn export_thread_to_word(&self, thread_id: &str) -> ExportDocument {
        self.export_document(thread_id, DocumentFormat::Word)
    }

    fn export_document(&self, thread_id: &str, format: DocumentFormat) -> ExportDocument {
        let (title, markdown) = match self.thread(thread_id) {
            Some(thread) => (thread.title.clone(), export::thread_to_markdown(&thread)),
            None => (String::new(), String::new()),
        };
        let bytes = self.renderer.render(&markdown, format);
        ExportDocument::new(&title, format, bytes, shared::clock::now_millis())
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Run `f` on the thread under the write lock and persist. Unknown ids
    /// are logged and yield `None`.
    fn with_thread<R>(&self, thread_id: &str, op: &str, f: impl FnOnce(&mut ChatThread) -> R) -> Option<R> {
        self.try_with_thread(thread_id, op, |thread| Some(f(thread)))
    }

    /// Like `with_thread`, but `f` may decline by returning `None`, in which
    /// case the thread must be left untouched and nothing is persisted.
    fn try_with_thread<R>(
        &self,
        thread_id: &str,
        op: &str,
        f: impl FnOnce(&mut ChatThread) -> Option<R>,
    ) -> Option<R> {
        let mut state = self.state.write();
        let Some(thread) = state.threads.iter_mut().find(|t| t.id == thread_id) else {
            tracing::warn!(thread_id, op, "thread not found");
            return None;
        };
        let result = f(thread)?;
        self.persist(&state);
        Some(result)
    }

    fn persist(&self, state: &ThreadState) {
        storage::mirror(self.store.as_ref(), keys::CHAT_THREADS, &state.threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use providers::{MockBackend, MockOptions};
    use shared::chat::{ThreadUpdate, DEFAULT_THREAD_TITLE};
    use shared::storage::MemoryStore;

    /// Backend whose every call fails
    struct DownBackend;

    #[async_trait::async_trait]
    impl ChatBackend for DownBackend {
        fn name(&self) -> &'static str {
            "down"
        }
        async fn send_message(&self, _: &str, _: Option<&str>) -> anyhow::Result<Message> {
            Err(anyhow!("service unavailable"))
        }
        async fn create_thread(&self, _: &str) -> anyhow::Result<ChatThread> {
            Err(anyhow!("service unavailable"))
        }
        async fn list_threads(&self) -> anyhow::Result<Vec<ChatThread>> {
            Err(anyhow!("service unavailable"))
        }
        async fn get_thread(&self, _: &str) -> anyhow::Result<Option<ChatThread>> {
            Err(anyhow!("service unavailable"))
        }
        async fn update_thread(&self, _: &str, _: ThreadUpdate) -> anyhow::Result<Option<ChatThread>> {
            Err(anyhow!("service unavailable"))
        }
        async fn regenerate_message(&self, _: &str, _: &str, _: &str) -> anyhow::Result<Message> {
            Err(anyhow!("service unavailable"))
        }
        async fn share_thread(&self, _: &str) -> anyhow::Result<ThreadShare> {
            Err(anyhow!("service unavailable"))
        }
    }

    fn mock_store() -> ThreadStore {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::new(kv.clone(), MockOptions::instant()));
        ThreadStore::new(backend, kv)
    }

    /// Counts writes so tests can tell whether anything was persisted
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl CountingStore {
        fn writes(&self) -> usize {
            self.writes.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, shared::storage::StorageError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> std::result::Result<(), shared::storage::StorageError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> std::result::Result<(), shared::storage::StorageError> {
            self.inner.remove(key)
        }
    }

    fn down_store() -> ThreadStore {
        ThreadStore::new(Arc::new(DownBackend), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_thread_becomes_active() {
        let store = mock_store();
        let id = store.create_thread(None);
        assert_eq!(store.active_thread_id(), Some(id.clone()));
        let thread = store.thread(&id).unwrap();
        assert_eq!(thread.title, DEFAULT_THREAD_TITLE);
        assert!(thread.messages.is_empty());
    }

    #[test]
    fn test_first_user_message_names_thread() {
        let store = mock_store();
        let id = store.create_thread(None);
        assert!(store.add_message(&id, Message::user("X".repeat(50))));
        assert_eq!(store.thread(&id).unwrap().title, format!("{}...", "X".repeat(30)));
    }

    #[test]
    fn test_add_message_to_unknown_thread_is_noop() {
        let store = mock_store();
        assert!(!store.add_message("thread-missing", Message::user("hi")));
        assert!(!store.toggle_bookmark("thread-missing"));
        assert!(store.threads().is_empty());
    }

    #[test]
    fn test_mutations_touch_last_updated() {
        let store = mock_store();
        let id = store.create_thread(None);
        let created = store.thread(&id).unwrap().last_updated;

        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(store.toggle_bookmark(&id));
        let thread = store.thread(&id).unwrap();
        assert!(thread.is_bookmarked);
        assert!(thread.last_updated > created);

        store.toggle_bookmark(&id);
        assert!(!store.thread(&id).unwrap().is_bookmarked);
    }

    #[test]
    fn test_threads_persist_across_reload() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::new(kv.clone(), MockOptions::instant()));
        let store = ThreadStore::new(backend.clone(), kv.clone());
        let id = store.create_thread(Some("Keep me"));
        store.add_message(&id, Message::user("hello"));

        let reloaded = ThreadStore::new(backend, kv);
        assert_eq!(reloaded.thread(&id), store.thread(&id));
    }

    #[test]
    fn test_set_active_thread() {
        let store = mock_store();
        let a = store.create_thread(Some("a"));
        let _b = store.create_thread(Some("b"));

        assert!(store.set_active_thread(Some(&a)));
        assert_eq!(store.active_thread().map(|t| t.title), Some("a".to_string()));
        assert!(!store.set_active_thread(Some("thread-missing")));
        assert_eq!(store.active_thread_id(), Some(a));
        assert!(store.set_active_thread(None));
        assert!(store.active_thread().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_assistant_in_place() {
        let store = mock_store();
        let id = store.create_thread(None);
        let user = Message::user("hi");
        let assistant = Message::assistant("hello");
        store.add_message(&id, user.clone());
        store.add_message(&id, assistant.clone());

        let regenerated = store
            .regenerate_message(&id, &assistant.id)
            .await
            .unwrap()
            .unwrap();

        let thread = store.thread(&id).unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0], user);
        assert_eq!(thread.messages[1].id, assistant.id);
        assert_eq!(thread.messages[1].content, "Regenerated response to: hi");
        assert_eq!(thread.messages[1], regenerated);
    }

    #[tokio::test]
    async fn test_regenerate_assistant_without_prompt_uses_fallback() {
        let store = mock_store();
        let id = store.create_thread(None);
        let assistant = Message::assistant("welcome");
        store.add_message(&id, assistant.clone());

        let regenerated = store.regenerate_message(&id, &assistant.id).await.unwrap().unwrap();
        assert_eq!(
            regenerated.content,
            format!("Regenerated response to: {}", FALLBACK_REGENERATE_CONTEXT)
        );
    }

    #[tokio::test]
    async fn test_regenerate_from_user_appends_when_no_reply() {
        let store = mock_store();
        let id = store.create_thread(None);
        let user = Message::user("hi");
        store.add_message(&id, user.clone());

        let reply = store.regenerate_message(&id, &user.id).await.unwrap().unwrap();

        let thread = store.thread(&id).unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0], user);
        assert_eq!(thread.messages[1], reply);
        assert_eq!(reply.content, "Mock response: hi");
    }

    #[tokio::test]
    async fn test_regenerate_from_user_replaces_following_reply() {
        let store = mock_store();
        let id = store.create_thread(None);
        let user = Message::user("hi");
        let old_reply = Message::assistant("old");
        let later = Message::user("next question");
        store.add_message(&id, user.clone());
        store.add_message(&id, old_reply.clone());
        store.add_message(&id, later.clone());

        let reply = store.regenerate_message(&id, &user.id).await.unwrap().unwrap();

        let thread = store.thread(&id).unwrap();
        assert_eq!(thread.messages.len(), 3);
        assert_eq!(thread.messages[1], reply);
        assert_ne!(thread.messages[1].id, old_reply.id);
        assert_eq!(thread.messages[2], later);
    }

    #[tokio::test]
    async fn test_regenerate_unknown_targets_is_noop() {
        let store = mock_store();
        let id = store.create_thread(None);
        assert!(store.regenerate_message("thread-missing", "m").await.unwrap().is_none());
        assert!(store.regenerate_message(&id, "msg-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_propagates_backend_failure() {
        let store = down_store();
        let id = store.create_thread(None);
        let user = Message::user("hi");
        store.add_message(&id, user.clone());

        let err = store.regenerate_message(&id, &user.id).await.unwrap_err();
        assert!(err.to_string().contains("service unavailable"));
        assert_eq!(store.thread(&id).unwrap().messages, vec![user]);
    }

    #[tokio::test]
    async fn test_regenerate_targets_original_thread_after_switch() {
        let store = mock_store();
        let first = store.create_thread(Some("first"));
        let user = Message::user("hi");
        store.add_message(&first, user.clone());
        let second = store.create_thread(Some("second"));
        assert_eq!(store.active_thread_id(), Some(second.clone()));

        store.regenerate_message(&first, &user.id).await.unwrap();

        assert_eq!(store.thread(&first).unwrap().messages.len(), 2);
        assert!(store.thread(&second).unwrap().messages.is_empty());
    }

    #[test]
    fn test_declined_update_is_not_persisted() {
        let kv = Arc::new(CountingStore::default());
        let store = ThreadStore::new(Arc::new(DownBackend), kv.clone());
        let id = store.create_thread(None);
        let before = kv.writes();

        let result: Option<()> = store.try_with_thread(&id, "test", |thread| {
            thread.message_index("msg-gone")?;
            Some(())
        });
        assert!(result.is_none());
        assert_eq!(kv.writes(), before);

        assert!(store.toggle_bookmark(&id));
        assert_eq!(kv.writes(), before + 1);
    }

    #[tokio::test]
    async fn test_share_thread_via_backend() {
        let store = mock_store();
        let id = store.create_thread(None);

        let share = store.share_thread(&id).await;
        assert_eq!(share.thread_id, id);

        let thread = store.thread(&id).unwrap();
        assert!(thread.is_shared);
        assert_eq!(thread.share_url, Some(share.url));
    }

    #[tokio::test]
    async fn test_share_thread_falls_back_locally() {
        let store = down_store().with_share_base_url("https://share.example.org/s");
        let id = store.create_thread(None);

        let share = store.share_thread(&id).await;
        assert!(share.url.starts_with("https://share.example.org/s/share-"));
        assert!(share.expires_at > share.created_at);
        assert_eq!(store.thread(&id).unwrap().share_url, Some(share.url));
    }

    #[tokio::test]
    async fn test_seed_from_backend() {
        let store = mock_store();
        let added = store.seed_from_backend().await;
        assert!(added > 0);
        assert_eq!(store.threads().len(), added);
        assert_eq!(store.active_thread_id(), store.threads().first().map(|t| t.id.clone()));

        // Already populated: nothing more to do
        assert_eq!(store.seed_from_backend().await, 0);
    }

    #[tokio::test]
    async fn test_seed_failure_is_swallowed() {
        let store = down_store();
        assert_eq!(store.seed_from_backend().await, 0);
        assert!(store.threads().is_empty());
    }

    #[test]
    fn test_export_json_round_trip() {
        let store = mock_store();
        let id = store.create_thread(None);
        store.add_message(&id, Message::user("question"));
        store.add_message(&id, Message::assistant("answer"));
        store.create_thread(Some("other"));

        let json = store.export_threads_to_json(Some(std::slice::from_ref(&id))).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let threads = parsed["threads"].as_array().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0]["id"], id.as_str());

        let messages: Vec<Message> = serde_json::from_value(threads[0]["messages"].clone()).unwrap();
        assert_eq!(messages, store.thread(&id).unwrap().messages);

        let all = export::parse_json_export(&store.export_threads_to_json(None).unwrap()).unwrap();
        assert_eq!(all.threads.len(), 2);
    }

    #[test]
    fn test_import_skips_existing_threads() {
        let source = mock_store();
        let id = source.create_thread(None);
        source.add_message(&id, Message::user("imported"));
        let json = source.export_threads_to_json(None).unwrap();

        let target = mock_store();
        assert_eq!(target.import_threads_from_json(&json).unwrap(), 1);
        assert_eq!(target.import_threads_from_json(&json).unwrap(), 0);
        assert_eq!(target.thread(&id), source.thread(&id));

        assert!(target.import_threads_from_json("not json").is_err());
    }

    #[test]
    fn test_document_exports() {
        let store = mock_store();
        let id = store.create_thread(None);
        store.add_message(&id, Message::user("hello"));

        let pdf = store.export_thread_to_pdf(&id);
        assert_eq!(pdf.mime_type, export::PDF_MIME);
        assert_eq!(String::from_utf8(pdf.bytes).unwrap().lines().next(), Some("# hello"));

        assert!(pdf.file_name.starts_with("hello_"));
        assert!(pdf.file_name.ends_with(".pdf"));

        let word = store.export_thread_to_word(&id);
        assert_eq!(word.mime_type, export::WORD_MIME);
        assert!(word.file_name.ends_with(".docx"));

        assert_eq!(store.export_thread_to_markdown("thread-missing"), "");
        assert!(store.export_thread_to_pdf("thread-missing").bytes.is_empty());
    }
}
