//! Runner for the agent loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::agent::Session;
use crate::error::HelmError;
use crate::provider::ModelClient;
use crate::tools::ToolRegistry;
use crate::util::cancel::CancellationSignal;

use super::approvals::{AuthorizationGate, ConfirmationHandler};
use super::events::RunEventSink;
use super::types::{AgentResult, RunId};

mod control;
mod dispatch;
mod engine;
mod node;
mod tooling;

#[cfg(test)]
#[path = "runner/tests/mod.rs"]
mod tests;

/// One user request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub prompt: String,
    /// Per-request limit overrides (`runner.max_iterations` and friends).
    pub metadata: HashMap<String, String>,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            prompt: prompt.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Handle for a run executing on a spawned task.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    signal: CancellationSignal,
    join: JoinHandle<(AgentResult, Session)>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: RunId,
        signal: CancellationSignal,
        join: JoinHandle<(AgentResult, Session)>,
    ) -> Self {
        Self {
            run_id,
            signal,
            join,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Trip the run's cancellation signal. Returns `false` if it was already
    /// tripped.
    pub fn abort(&self) -> bool {
        self.signal.trip("aborted by caller")
    }

    /// Wait for the run and take back the session.
    pub async fn wait(self) -> Result<(AgentResult, Session), HelmError> {
        self.join
            .await
            .map_err(|err| HelmError::TaskFailed(err.to_string()))
    }
}

/// Default agent-loop runner (model streaming, tool dispatch, enforcement).
#[derive(Clone)]
pub struct LoopRunner {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    gate: AuthorizationGate,
    event_sink: Option<RunEventSink>,
    confirmation: Option<ConfirmationHandler>,
}

impl LoopRunner {
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools: Arc::new(tools),
            gate: AuthorizationGate::default(),
            event_sink: None,
            confirmation: None,
        }
    }

    pub fn with_gate(mut self, gate: AuthorizationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn with_confirmation(mut self, handler: ConfirmationHandler) -> Self {
        self.confirmation = Some(handler);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &dyn ModelClient {
        self.model.as_ref()
    }
}

impl fmt::Debug for LoopRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopRunner")
            .field("model", &self.model.name())
            .field("tools", &self.tools)
            .field("gate", &self.gate)
            .field("event_sink", &self.event_sink.is_some())
            .field("confirmation", &self.confirmation.is_some())
            .finish()
    }
}
