//! OpenAI Assistants API client.
//!
//! Talks to the v2 Assistants endpoints: threads, messages, runs and tool
//! output submission. Runs are polled until they settle; the poll loop never
//! outlives the configured run timeout.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::{
    AssistantGateway, AssistantId, AssistantSpec, FunctionTool, MessageRole, RunOutcome,
    ThreadId, ThreadMessage, ToolCall, ToolOutput,
};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default interval between run status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls are never issued faster than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default wall-clock limit for one run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(90);

/// How many recent messages to scan for the reply of a completed run.
const REPLY_LOOKBACK: usize = 10;

/// Connection settings for [`OpenAiGateway`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// Bearer token.
    pub api_key: String,
    /// API root, without trailing slash.
    pub base_url: String,
    /// Interval between run status polls.
    pub poll_interval: Duration,
    /// Wall-clock limit for one run.
    pub run_timeout: Duration,
}

impl GatewayConfig {
    /// Create a configuration with default endpoint and timings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Override the API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the poll interval, clamped to [`MIN_POLL_INTERVAL`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("run_timeout", &self.run_timeout)
            .finish()
    }
}

/// [`AssistantGateway`] backed by the OpenAI Assistants API.
#[derive(Clone)]
pub struct OpenAiGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl OpenAiGateway {
    /// Create a gateway with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        thread_id: Option<&str>,
    ) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let err = status_error(status.as_u16(), response.text().await, thread_id);
            debug!(status = status.as_u16(), error = %err, "Assistant API request failed");
            return Err(err);
        }

        let body = response.text().await?;
        trace!(body = %body, "Assistant API response");
        serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))
    }

    async fn fetch_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject> {
        let path = format!("threads/{}/runs/{}", thread_id, run_id);
        self.send(self.request(Method::GET, &path), Some(thread_id)).await
    }

    /// Poll a run until it completes, pauses for tool calls, fails or times out.
    async fn await_run(&self, thread_id: &str, mut run: RunObject) -> Result<RunOutcome> {
        let started = Instant::now();

        loop {
            match run.settle()? {
                RunState::Completed => {
                    debug!(thread_id, run_id = %run.id, elapsed = ?started.elapsed(), "Run completed");
                    return self.latest_reply(thread_id).await.map(RunOutcome::Reply);
                }
                RunState::ToolCalls(calls) => {
                    debug!(thread_id, run_id = %run.id, calls = calls.len(), "Run requires action");
                    return Ok(RunOutcome::ToolCalls {
                        run_id: run.id,
                        calls,
                    });
                }
                RunState::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.run_timeout {
                warn!(thread_id, run_id = %run.id, status = %run.status, ?elapsed, "Run timed out");
                return Err(GatewayError::RunTimeout {
                    run_id: run.id,
                    elapsed,
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
            run = self.fetch_run(thread_id, &run.id).await?;
            trace!(thread_id, run_id = %run.id, status = %run.status, "Polled run");
        }
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<String> {
        self.list_messages(thread_id, REPLY_LOOKBACK)
            .await?
            .into_iter()
            .find(ThreadMessage::is_assistant)
            .map(|m| m.text)
            .ok_or_else(|| GatewayError::Parse("run completed without an assistant reply".into()))
    }
}

#[async_trait]
impl AssistantGateway for OpenAiGateway {
    async fn create_thread(&self) -> Result<ThreadId> {
        let request = self
            .request(Method::POST, "threads")
            .json(&serde_json::json!({}));
        let thread: ObjectRef = self.send(request, None).await?;
        debug!(thread_id = %thread.id, "Thread created");
        Ok(thread.id)
    }

    async fn append_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let path = format!("threads/{}/messages", thread_id);
        let request = self.request(Method::POST, &path).json(&CreateMessageRequest {
            role: MessageRole::User,
            content,
        });
        let message: ObjectRef = self.send(request, Some(thread_id)).await?;
        trace!(thread_id, message_id = %message.id, "User message appended");
        Ok(())
    }

    async fn run_and_await(&self, thread_id: &str, assistant_id: &str) -> Result<RunOutcome> {
        let path = format!("threads/{}/runs", thread_id);
        let request = self
            .request(Method::POST, &path)
            .json(&CreateRunRequest { assistant_id });
        let run: RunObject = self.send(request, Some(thread_id)).await?;
        debug!(thread_id, run_id = %run.id, "Run started");
        self.await_run(thread_id, run).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunOutcome> {
        let path = format!("threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id);
        let request = self
            .request(Method::POST, &path)
            .json(&SubmitToolOutputsRequest {
                tool_outputs: outputs,
            });
        let run: RunObject = self.send(request, Some(thread_id)).await?;
        debug!(thread_id, run_id, "Tool outputs submitted");
        self.await_run(thread_id, run).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let path = format!("threads/{}", thread_id);
        let _: ObjectRef = self
            .send(self.request(Method::DELETE, &path), Some(thread_id))
            .await?;
        debug!(thread_id, "Thread deleted");
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>> {
        let path = format!("threads/{}/messages?limit={}&order=desc", thread_id, limit);
        let list: MessageList = self
            .send(self.request(Method::GET, &path), Some(thread_id))
            .await?;
        Ok(list.data.into_iter().map(ThreadMessage::from).collect())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId> {
        let request = self
            .request(Method::POST, "assistants")
            .json(&CreateAssistantRequest::from(spec));
        let assistant: ObjectRef = self.send(request, None).await?;
        debug!(assistant_id = %assistant.id, model = %spec.model, "Assistant created");
        Ok(assistant.id)
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest {
    tool_outputs: Vec<ToolOutput>,
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: Vec<WireTool<'a>>,
}

impl<'a> From<&'a AssistantSpec> for CreateAssistantRequest<'a> {
    fn from(spec: &'a AssistantSpec) -> Self {
        Self {
            name: &spec.name,
            instructions: &spec.instructions,
            model: &spec.model,
            tools: spec
                .tools
                .iter()
                .map(|function| WireTool {
                    tool_type: "function",
                    function,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a FunctionTool,
}

/// Any object where only the id matters.
#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

/// Run lifecycle status.
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

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunLastError>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct RunLastError {
    code: String,
    message: String,
}

/// Where a run stands after one status read.
#[derive(Debug, PartialEq, Eq)]
enum RunState {
    Pending,
    Completed,
    ToolCalls(Vec<ToolCall>),
}

impl RunObject {
    fn settle(&self) -> Result<RunState> {
        match self.status {
            RunStatus::Completed => Ok(RunState::Completed),
            RunStatus::RequiresAction => {
                let calls: Vec<ToolCall> = self
                    .required_action
                    .iter()
                    .flat_map(|action| &action.submit_tool_outputs.tool_calls)
                    .map(|call| ToolCall::new(&call.id, &call.function.name, &call.function.arguments))
                    .collect();
                if calls.is_empty() {
                    return Err(GatewayError::Parse(format!(
                        "run {} requires action but lists no tool calls",
                        self.id
                    )));
                }
                Ok(RunState::ToolCalls(calls))
            }
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete => {
                Err(GatewayError::RunFailed {
                    run_id: self.id.clone(),
                    status: self.status.to_string(),
                    detail: self
                        .last_error
                        .as_ref()
                        .map(|e| format!("{}: {}", e.code, e.message)),
                })
            }
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling | RunStatus::Unknown => {
                Ok(RunState::Pending)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    role: MessageRole,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

impl From<WireMessage> for ThreadMessage {
    fn from(message: WireMessage) -> Self {
        let text = message
            .content
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.value),
                ContentPart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            id: message.id,
            role: message.role,
            text,
        }
    }
}

/// Map a failed response to an error; an unreadable body maps as empty.
fn status_error<E: std::fmt::Display>(
    status: u16,
    body: std::result::Result<String, E>,
    thread_id: Option<&str>,
) -> GatewayError {
    let body = body.unwrap_or_else(|e| {
        debug!(status, error = %e, "Failed to read error response body");
        String::new()
    });
    GatewayError::from_status(status, &body, thread_id)
}
