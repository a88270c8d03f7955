use anyhow::Result;
use shared::chat::{ChatThread, Message, ThreadShare, ThreadUpdate};

/// Backend that produces assistant replies and owns server-side thread state.
///
/// Implemented by the in-process mock and by the remote completions service.
/// Note: Uses async_trait for object safety
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Ask for an assistant reply to `content`. When `thread_id` names a
    /// thread the backend knows, the exchange is recorded there as well.
    async fn send_message(&self, content: &str, thread_id: Option<&str>) -> Result<Message>;

    async fn create_thread(&self, title: &str) -> Result<ChatThread>;

    async fn list_threads(&self) -> Result<Vec<ChatThread>>;

    async fn get_thread(&self, thread_id: &str) -> Result<Option<ChatThread>>;

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Option<ChatThread>>;

    /// Produce a replacement for an assistant message; `context` is the user
    /// prompt the original reply answered.
    async fn regenerate_message(
        &self,
        thread_id: &str,
        message_id: &str,
        context: &str,
    ) -> Result<Message>;

    async fn share_thread(&self, thread_id: &str) -> Result<ThreadShare>;
}
