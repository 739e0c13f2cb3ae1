//! Conversation turns and the tool call/result pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix written onto a model turn that was cut short by cancellation.
pub const INTERRUPTED_PREFIX: &str = "[interrupted] ";

/// One attributable unit of conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

impl Turn {
    fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            timestamp: Some(Utc::now()),
            interrupted: false,
        }
    }

    /// An engine-authored instruction (corrections, guidance).
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::assistant_with_tool_calls(text, Vec::new())
    }

    /// A model turn carrying the tool calls it issued, in issue order.
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        content.extend(calls.into_iter().map(ContentPart::ToolCall));
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(Role::Tool, vec![ContentPart::ToolResult(result)])
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Prefix the turn's text with [`INTERRUPTED_PREFIX`]. Applying it twice
    /// leaves the turn unchanged.
    pub(crate) fn mark_interrupted(&mut self) {
        if self.interrupted {
            return;
        }
        self.interrupted = true;
        match self
            .content
            .iter_mut()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text),
                _ => None,
            }) {
            Some(text) => text.insert_str(0, INTERRUPTED_PREFIX),
            None => self.content.insert(
                0,
                ContentPart::Text {
                    text: INTERRUPTED_PREFIX.trim_end().to_string(),
                },
            ),
        }
    }
}

/// Who a turn is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of turn content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    /// History index of the model turn that issued this call.
    #[serde(default)]
    pub originating_turn: usize,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            originating_turn: 0,
        }
    }
}

/// Outcome class of a single tool invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Rejected,
}

/// The result paired 1:1 with a [`ToolCall`] by `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(call: &ToolCall, payload: serde_json::Value, duration_ms: u64) -> Self {
        Self::with_status(call, ToolStatus::Success, payload, duration_ms)
    }

    /// An error result; the message is wrapped as `{"error": message}`.
    pub fn error(call: &ToolCall, message: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_status(
            call,
            ToolStatus::Error,
            serde_json::json!({ "error": message.into() }),
            duration_ms,
        )
    }

    pub fn rejected(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self::with_status(
            call,
            ToolStatus::Rejected,
            serde_json::json!({ "error": reason.into() }),
            0,
        )
    }

    fn with_status(
        call: &ToolCall,
        status: ToolStatus,
        payload: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status,
            payload,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// The error message for non-success results.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_success() {
            return None;
        }
        self.payload.get("error").and_then(|v| v.as_str())
    }
}
