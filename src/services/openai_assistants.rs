use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Assistant run {status}: {message}")]
    RunFailed { status: String, message: String },

    #[error("Assistant run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Assistant run was cancelled")]
    Cancelled,

    #[error("Assistant returned no text reply")]
    EmptyReply,

    #[error("Labeler reply is not a number: {0:?}")]
    MalformedLabel(String),
}

impl AssistantError {
    /// Errors worth another status poll before the deadline.
    pub fn is_transient(&self) -> bool {
        match self {
            AssistantError::Http(_) => true,
            AssistantError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(error: reqwest::Error) -> Self {
        AssistantError::Http(error.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(error: serde_json::Error) -> Self {
        AssistantError::Http(format!("unexpected response body: {}", error))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// The service will not move a run out of these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextContent {
    value: String,
}

/// Operations needed from the hosted assistant service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, AssistantError>;
    async fn create_thread(&self) -> Result<String, AssistantError>;
    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError>;
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<String>,
    ) -> Result<Run, AssistantError>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError>;
    /// Text of the newest message in the thread, if it has a text block.
    async fn latest_message_text(&self, thread_id: &str) -> Result<Option<String>, AssistantError>;
}

/// `AssistantBackend` over the OpenAI Assistants v2 REST API.
#[derive(Clone)]
pub struct OpenAiAssistantsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAssistantsClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(OpenAiAssistantsClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssistantError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                .unwrap_or(body);
            return Err(AssistantError::Api { status: status.as_u16(), message });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AssistantBackend for OpenAiAssistantsClient {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, AssistantError> {
        let request = self.http.get(self.url(&format!("assistants/{}", assistant_id)));
        self.send_json(request).await
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let request = self.http.post(self.url("threads")).json(&json!({}));
        let thread: ThreadObject = self.send_json(request).await?;
        info!("Created thread {}", thread.id);
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let request = self
            .http
            .post(self.url(&format!("threads/{}/messages", thread_id)))
            .json(&json!({ "role": "user", "content": content }));
        let _: Value = self.send_json(request).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<String>,
    ) -> Result<Run, AssistantError> {
        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(instructions) = instructions {
            body["instructions"] = Value::String(instructions);
        }
        let request = self
            .http
            .post(self.url(&format!("threads/{}/runs", thread_id)))
            .json(&body);
        self.send_json(request).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let request = self.http.get(self.url(&format!("threads/{}/runs/{}", thread_id, run_id)));
        let run: Run = self.send_json(request).await?;
        debug!("Run {} is {}", run.id, run.status.as_str());
        Ok(run)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let request = self
            .http
            .post(self.url(&format!("threads/{}/runs/{}/cancel", thread_id, run_id)));
        let _: Value = self.send_json(request).await?;
        Ok(())
    }

    async fn latest_message_text(&self, thread_id: &str) -> Result<Option<String>, AssistantError> {
        let request = self
            .http
            .get(self.url(&format!("threads/{}/messages", thread_id)))
            .query(&[("order", "desc"), ("limit", "1")]);
        let list: MessageList = self.send_json(request).await?;
        Ok(first_text(list))
    }
}

fn first_text(list: MessageList) -> Option<String> {
    list.data
        .into_iter()
        .next()?
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.value),
            ContentBlock::Other => None,
        })
}
