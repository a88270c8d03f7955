use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::chat::{ChatThread, Message, ThreadShare, ThreadUpdate};
use shared::settings::BackendSettings;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use crate::backend::ChatBackend;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .unwrap_or_default()
});

const API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
const MAX_TOKENS: u32 = 100;
const TEMPERATURE: f32 = 0.7;

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: Vec<RequestMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Map the first completion choice to an assistant message
fn to_message(body: CompletionResponse) -> Result<Message> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("completion response has no choices"))?;
    let mut message = Message::assistant(choice.message.content.unwrap_or_default());
    if let Some(id) = body.id {
        message.id = id;
    }
    Ok(message)
}

// ── Client ───────────────────────────────────────────────────────────

/// Azure-hosted chat completions. Only message exchange is served remotely;
/// thread bookkeeping stays client-side.
pub struct AzureBackend {
    http: Client,
    api_key: String,
    endpoint: String,
    api_version: String,
}

impl AzureBackend {
    pub fn new(endpoint: &str, api_version: &str, api_key: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            api_key: api_key.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
        }
    }

    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        if settings.api_endpoint.trim().is_empty() {
            return Err(anyhow!("No API endpoint configured"));
        }
        let api_key = match &settings.api_key {
            Some(key) => key.clone(),
            // Try environment variable as fallback
            None => env::var(API_KEY_ENV)
                .map_err(|_| anyhow!("No API key configured (set {})", API_KEY_ENV))?,
        };
        Ok(Self::new(&settings.api_endpoint, &settings.api_version, &api_key))
    }

    fn url(&self) -> String {
        format!("{}?api-version={}", self.endpoint, self.api_version)
    }

    fn unsupported(operation: &str) -> anyhow::Error {
        anyhow!("{} is not supported by the remote backend", operation)
    }
}

#[async_trait::async_trait]
impl ChatBackend for AzureBackend {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn send_message(&self, content: &str, _thread_id: Option<&str>) -> Result<Message> {
        let req = CompletionRequest {
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        let resp = self
            .http
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("azure error: {}", status));
            }
            return Err(anyhow!("azure error: {}\n{}", status, detail));
        }
        let body: CompletionResponse = resp.json().await?;
        to_message(body)
    }

    async fn create_thread(&self, _title: &str) -> Result<ChatThread> {
        Err(Self::unsupported("create_thread"))
    }

    async fn list_threads(&self) -> Result<Vec<ChatThread>> {
        Err(Self::unsupported("list_threads"))
    }

    async fn get_thread(&self, _thread_id: &str) -> Result<Option<ChatThread>> {
        Err(Self::unsupported("get_thread"))
    }

    async fn update_thread(&self, _thread_id: &str, _update: ThreadUpdate) -> Result<Option<ChatThread>> {
        Err(Self::unsupported("update_thread"))
    }

    async fn regenerate_message(
        &self,
        _thread_id: &str,
        _message_id: &str,
        _context: &str,
    ) -> Result<Message> {
        Err(Self::unsupported("regenerate_message"))
    }

    async fn share_thread(&self, _thread_id: &str) -> Result<ThreadShare> {
        Err(Self::unsupported("share_thread"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chat::Role;

    #[test]
    fn test_first_choice_becomes_message() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"id":"cmpl-1","choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#,
        )
        .unwrap();
        let message = to_message(body).unwrap();
        assert_eq!(message.id, "cmpl-1");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "first");
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let body: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(to_message(body).is_err());
    }

    #[test]
    fn test_request_shape() {
        let req = CompletionRequest {
            messages: vec![RequestMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn test_url_includes_api_version() {
        let backend = AzureBackend::new("https://res.example.com/completions/", "2023-05-15", "k");
        assert_eq!(backend.url(), "https://res.example.com/completions?api-version=2023-05-15");
    }

    #[test]
    fn test_settings_require_endpoint() {
        let settings = BackendSettings {
            mock_mode: false,
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(AzureBackend::from_settings(&settings).is_err());
    }

    #[tokio::test]
    async fn test_thread_operations_are_unsupported() {
        let backend = AzureBackend::new("https://res.example.com", "v", "k");
        let err = backend.share_thread("t").await.unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert!(backend.list_threads().await.is_err());
    }
}
