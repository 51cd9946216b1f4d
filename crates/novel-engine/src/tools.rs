//! Tools the assistant may call during a story.
//!
//! The set is closed: [`StoryTool`] lists every function the assistant is
//! told about, and anything else is answered with an error output.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use novel_assistant::{AssistantSpec, FunctionTool, ToolCall, ToolOutput};

/// Function name of the end-of-story tool.
pub const END_STORY: &str = "end_story";

/// Appended to the scenario when the assistant is created.
pub const TOOL_INSTRUCTIONS: &str = "Когда история достигает финальной сцены или завершается, вызови функцию end_story с соответствующей причиной.";

/// Display name of the assistant.
pub const ASSISTANT_NAME: &str = "Novel Game Assistant";

/// Why the assistant ended the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    FinalScene,
    UserChoice,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::FinalScene => write!(f, "final_scene"),
            Self::UserChoice => write!(f, "user_choice"),
        }
    }
}

/// A recognised tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryTool {
    /// Finish the story and lock restarts until payment.
    EndStory { reason: EndReason },
}

/// Why a tool call could not be turned into a [`StoryTool`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for {name}: {message}")]
    InvalidArguments { name: String, message: String },
}

#[derive(Deserialize)]
struct EndStoryArgs {
    reason: EndReason,
}

impl TryFrom<&ToolCall> for StoryTool {
    type Error = ToolCallError;

    fn try_from(call: &ToolCall) -> Result<Self, Self::Error> {
        match call.name.as_str() {
            END_STORY => {
                let args: EndStoryArgs =
                    call.parse_arguments()
                        .map_err(|e| ToolCallError::InvalidArguments {
                            name: call.name.clone(),
                            message: e.to_string(),
                        })?;
                Ok(Self::EndStory {
                    reason: args.reason,
                })
            }
            other => Err(ToolCallError::Unknown(other.to_string())),
        }
    }
}

impl StoryTool {
    /// Declarations of every story tool, as registered on the assistant.
    pub fn definitions() -> Vec<FunctionTool> {
        vec![FunctionTool {
            name: END_STORY.to_string(),
            description: "Завершает историю и очищает данные пользователя".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "enum": ["completed", "final_scene", "user_choice"],
                        "description": "Причина завершения истории"
                    }
                },
                "required": ["reason"]
            }),
        }]
    }
}

/// Output reporting a successfully executed call.
pub fn success_output(call: &ToolCall) -> ToolOutput {
    ToolOutput::new(&call.id, json!({ "success": true }).to_string())
}

/// Output reporting a rejected call.
pub fn error_output(call: &ToolCall, err: &ToolCallError) -> ToolOutput {
    ToolOutput::new(
        &call.id,
        json!({ "success": false, "error": err.to_string() }).to_string(),
    )
}

/// Build the assistant definition from a scenario text.
pub fn assistant_spec(scenario: &str, model: &str) -> AssistantSpec {
    AssistantSpec {
        name: ASSISTANT_NAME.to_string(),
        instructions: format!("{}\n\n{}", scenario.trim_end(), TOOL_INSTRUCTIONS),
        model: model.to_string(),
        tools: StoryTool::definitions(),
    }
}
