//! Assistant gateway for the novel bot.
//!
//! All traffic to the hosted assistant service goes through the
//! [`AssistantGateway`] trait. [`OpenAiGateway`] implements it on top of the
//! OpenAI Assistants v2 HTTP API; tests substitute their own fakes.
//!
//! # Core Types
//!
//! - [`AssistantGateway`]: threads, messages, runs and tool output submission
//! - [`RunOutcome`]: a settled run, either a reply or pending tool calls
//! - [`GatewayError`]: failure taxonomy used by callers to pick a recovery
//! - [`RetryPolicy`]: bounded retries with linear backoff
//!
//! # Example
//!
//! ```ignore
//! use novel_assistant::{AssistantGateway, GatewayConfig, OpenAiGateway, RunOutcome};
//!
//! let gateway = OpenAiGateway::new(GatewayConfig::new(api_key));
//! let thread_id = gateway.create_thread().await?;
//! gateway.append_user_message(&thread_id, "Привет!").await?;
//! match gateway.run_and_await(&thread_id, &assistant_id).await? {
//!     RunOutcome::Reply(text) => println!("{}", text),
//!     RunOutcome::ToolCalls { run_id, calls } => { /* execute and submit */ }
//! }
//! ```

pub mod client;
pub mod error;
pub mod gateway;
pub mod retry;

pub use client::{GatewayConfig, OpenAiGateway, RunStatus};
pub use error::{GatewayError, Result};
pub use gateway::{
    AssistantGateway, AssistantId, AssistantSpec, FunctionTool, MessageRole, RunOutcome, ThreadId,
    ThreadMessage, ToolCall, ToolOutput,
};
pub use retry::RetryPolicy;
