//! The `AssistantGateway` trait and the types that cross it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Remote thread handle.
pub type ThreadId = String;

/// Remote assistant handle.
pub type AssistantId = String;

/// A function call the assistant asked for while a run was in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Call id, echoed back with the output.
    pub id: String,
    /// Function name.
    pub name: String,
    /// JSON-encoded arguments, as sent by the service.
    pub arguments: String,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the arguments into a typed value.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.arguments)
    }
}

/// Result of one tool call, submitted to resume a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    /// Id of the call this answers.
    pub tool_call_id: String,
    /// Output passed back to the assistant.
    pub output: String,
}

impl ToolOutput {
    /// Create a tool output.
    pub fn new(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
        }
    }
}

/// How a run ended from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run completed; this is the latest assistant text.
    Reply(String),
    /// The run is paused until outputs for these calls are submitted.
    ToolCalls {
        /// Run to resume.
        run_id: String,
        /// Calls to execute.
        calls: Vec<ToolCall>,
    },
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message as stored in a remote thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    /// Remote message id.
    pub id: String,
    /// Author.
    pub role: MessageRole,
    /// Concatenated text parts.
    pub text: String,
}

impl ThreadMessage {
    /// Returns true if the assistant wrote this message.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// A function tool declared on an assistant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTool {
    /// Function name.
    pub name: String,
    /// What the function does, shown to the model.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: serde_json::Value,
}

/// Everything needed to create an assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<FunctionTool>,
}

/// The only path to the hosted assistant service.
///
/// Implementations are stateless apart from their configuration; all
/// conversation state lives in remote threads.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Create an empty thread.
    async fn create_thread(&self) -> Result<ThreadId>;

    /// Append a user message to a thread.
    async fn append_user_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run of the assistant on a thread and wait for it to settle.
    async fn run_and_await(&self, thread_id: &str, assistant_id: &str) -> Result<RunOutcome>;

    /// Submit tool outputs for a paused run and wait for it to settle again.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunOutcome>;

    /// Delete a thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// List up to `limit` messages of a thread, newest first.
    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>>;

    /// Create an assistant and return its id.
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId>;
}
