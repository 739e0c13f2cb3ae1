//! High-level runtime wrapping the agent loop.
//!
//! [`AgentRuntime`] owns the validated base configuration and the loop
//! runner. Each run merges the session's limit overrides and the request
//! metadata into a copy of the config, validates the result, then drives
//! the loop either inline ([`AgentRuntime::run`]) or on a spawned task
//! ([`AgentRuntime::start`]).

use std::sync::Arc;

use crate::agent_loop::approvals::{AuthorizationGate, ConfirmationHandler};
use crate::agent_loop::events::RunEventSink;
use crate::agent_loop::runner::{LoopRunner, RunHandle, RunRequest};
use crate::agent_loop::types::AgentResult;
use crate::config::AgentConfig;
use crate::error::HelmError;
use crate::provider::ModelClient;
use crate::tools::ToolRegistry;
use crate::util::cancel::CancellationSignal;

use super::Session;

/// Public entry point for running requests against a model and tool set.
#[derive(Debug, Clone)]
pub struct AgentRuntime {
    runner: LoopRunner,
    config: AgentConfig,
}

impl AgentRuntime {
    /// Build a runtime. Fails on configuration that could never drive a run.
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Result<Self, HelmError> {
        config.validate(&tools)?;
        Ok(Self {
            runner: LoopRunner::new(model, tools),
            config,
        })
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.runner = self.runner.with_event_sink(sink);
        self
    }

    pub fn with_confirmation(mut self, handler: ConfirmationHandler) -> Self {
        self.runner = self.runner.with_confirmation(handler);
        self
    }

    /// Replace the default authorization rules.
    pub fn with_gate(mut self, gate: AuthorizationGate) -> Self {
        self.runner = self.runner.with_gate(gate);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.runner.tools()
    }

    /// Effective config for one run against `session`.
    pub fn prepare(&self, request: &RunRequest, session: &Session) -> Result<AgentConfig, HelmError> {
        let mut config = self.config.merged_with(session.overrides());
        config.apply_metadata(&request.metadata);
        config.validate(self.runner.tools())?;
        if let Some(unknown) = session
            .approved_tools()
            .iter()
            .find(|name| !self.runner.tools().contains(name))
        {
            return Err(HelmError::UnknownTool(format!(
                "session approves unregistered tool '{unknown}'"
            )));
        }
        Ok(config)
    }

    /// Run `request` to completion on the current task.
    ///
    /// Only setup validation returns `Err`; model and tool failures end up
    /// in the returned [`AgentResult`].
    pub async fn run(
        &self,
        request: &RunRequest,
        session: &mut Session,
        signal: &CancellationSignal,
    ) -> Result<AgentResult, HelmError> {
        let config = self.prepare(request, session)?;
        Ok(self.runner.run(request, &config, session, signal).await)
    }

    /// Run `request` on a spawned task. The session comes back through
    /// [`RunHandle::wait`].
    pub fn start(&self, request: RunRequest, mut session: Session) -> Result<RunHandle, HelmError> {
        let config = self.prepare(&request, &session)?;
        let signal = CancellationSignal::new();
        let runner = self.runner.clone();
        let task_signal = signal.clone();
        let run_id = request.run_id;
        let join = tokio::spawn(async move {
            let result = runner.run(&request, &config, &mut session, &task_signal).await;
            (result, session)
        });
        Ok(RunHandle::new(run_id, signal, join))
    }
}
