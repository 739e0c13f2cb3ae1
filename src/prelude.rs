//! Convenience re-exports for common use.

pub use crate::agent::{AgentRuntime, PrunePolicy, Session};
pub use crate::agent_loop::{
    AgentEvent, AgentResult, CompletionKind, ConfirmationDecision, ConfirmationHandler,
    ConfirmationRequest, RunEvent, RunEventSink, RunHandle, RunRequest,
};
pub use crate::config::{AgentConfig, FallbackVerbosity, LimitOverrides};
pub use crate::error::{HelmError, Result};
pub use crate::provider::{ModelClient, ModelRequest, ModelStream};
pub use crate::tools::{AgentTool, Tool, ToolArguments, ToolClass, ToolParameters, ToolRegistry};
pub use crate::types::{ModelStreamEvent, Role, ToolCall, ToolResult, ToolStatus, Turn, Usage};
pub use crate::util::cancel::CancellationSignal;
