//! Streaming types.

use serde::{Deserialize, Serialize};

use super::message::ToolCall;
use super::usage::Usage;

/// One unit emitted by a model stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelStreamEvent {
    /// Incremental text content.
    TextDelta { text: String },
    /// A fully-formed tool call request.
    ToolCall(ToolCall),
    /// Token usage, usually near the end of the stream.
    Usage(Usage),
    /// Stream finished.
    Done,
}

impl ModelStreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall(ToolCall::new(id, name, arguments))
    }
}
