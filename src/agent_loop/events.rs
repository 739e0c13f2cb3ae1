//! Run event stream types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::approvals::ConfirmationRequest;
use super::productivity::StallReason;
use super::types::{CompletionKind, FallbackReason, RunId};
use crate::tools::ToolClass;
use crate::types::{ToolCall, ToolResult};

/// Concrete event payloads emitted by the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    RunStarted {
        max_iterations: usize,
    },
    IterationStarted {
        iteration: usize,
    },
    TextDelta {
        text: String,
    },
    ToolStarted {
        call: ToolCall,
        /// `None` when the tool is not registered.
        class: Option<ToolClass>,
    },
    /// A buffered group of read-only calls is about to run concurrently.
    BatchStarted {
        call_ids: Vec<String>,
    },
    ToolFinished {
        result: ToolResult,
    },
    ConfirmationRequested {
        request: ConfirmationRequest,
    },
    CorrectionInjected {
        iteration: usize,
        reason: StallReason,
    },
    GuidanceInjected {
        iteration: usize,
    },
    ModelFailed {
        iteration: usize,
        error: String,
    },
    Completed {
        iterations: usize,
    },
    Fallback {
        iterations: usize,
        reason: FallbackReason,
    },
    Cancelled {
        iterations: usize,
    },
}

impl AgentEvent {
    /// The completion kind for terminal events.
    pub fn completion(&self) -> Option<CompletionKind> {
        match self {
            Self::Completed { .. } => Some(CompletionKind::Declared),
            Self::Fallback { .. } => Some(CompletionKind::Fallback),
            Self::Cancelled { .. } => Some(CompletionKind::Cancelled),
            _ => None,
        }
    }
}

/// Envelope for streaming run events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub run_id: RunId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: AgentEvent,
}

/// Observer for run events. Called inline on the loop task, so it must
/// return promptly.
pub type RunEventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;
