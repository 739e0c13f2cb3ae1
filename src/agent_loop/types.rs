//! Core run types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::fallback::FallbackResponse;
use crate::types::{Cost, Usage};

/// Unique run identifier.
pub type RunId = Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompletionKind {
    /// The model declared the task complete.
    Declared,
    /// Best-effort summary synthesized after the loop gave up.
    Fallback,
    /// The cancellation signal tripped.
    Cancelled,
}

/// Why the loop handed over to the fallback synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(tag = "reason", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackReason {
    IterationLimit { max_iterations: usize },
    ModelUnavailable { failures: usize, last_error: String },
}

/// Final, always-present outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub run_id: RunId,
    /// Final answer text shown to the user.
    pub text: String,
    pub completion: CompletionKind,
    /// Model calls made by this run.
    pub iterations: usize,
    pub tool_calls: usize,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackResponse>,
    pub finished_at: DateTime<Utc>,
}

impl AgentResult {
    /// True when the text is a synthesized summary, not a model answer.
    pub fn is_best_effort(&self) -> bool {
        self.completion == CompletionKind::Fallback
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion == CompletionKind::Cancelled
    }
}
