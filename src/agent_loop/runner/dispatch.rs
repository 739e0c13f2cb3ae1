//! Read-only call buffering and the sequential path for everything else.

use std::mem;

use super::super::approvals::{
    rejection_message, Authorization, AuthorizationContext, AuthorizationGate, ConfirmationDecision,
    ConfirmationHandler, ConfirmationRequest,
};
use super::super::events::AgentEvent;
use super::super::fallback::ToolRecord;
use super::control::{debug_enabled, resolve_confirmation, RunEventEmitter};
use super::tooling::{canceled_tool_result, ToolExecutor};
use crate::agent::Session;
use crate::tools::{ToolArguments, ToolClass};
use crate::types::{ToolCall, ToolResult};
use crate::util::cancel::CancellationSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum DispatchState {
    #[default]
    Collecting,
    Flushing,
}

/// A buffered read-only call.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PendingCall {
    pub(super) call: ToolCall,
    pub(super) needs_confirmation: bool,
}

/// Ordered queue of read-only calls waiting to run as one batch.
#[derive(Debug, Default)]
pub(super) struct DispatchBuffer {
    pending: Vec<PendingCall>,
    state: DispatchState,
}

impl DispatchBuffer {
    pub(super) fn add(&mut self, call: PendingCall) {
        debug_assert_eq!(self.state, DispatchState::Collecting);
        self.pending.push(call);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(super) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(super) fn state(&self) -> DispatchState {
        self.state
    }

    /// Take the buffered calls in arrival order and enter `Flushing`.
    pub(super) fn begin_flush(&mut self) -> Vec<PendingCall> {
        self.state = DispatchState::Flushing;
        mem::take(&mut self.pending)
    }

    pub(super) fn finish_flush(&mut self) {
        self.state = DispatchState::Collecting;
    }
}

pub(super) struct ToolDispatcher<'a> {
    executor: &'a ToolExecutor,
    gate: &'a AuthorizationGate,
    confirmation: Option<&'a ConfirmationHandler>,
    allowed_tools: &'a [String],
    emitter: &'a RunEventEmitter,
    signal: &'a CancellationSignal,
    buffer: DispatchBuffer,
}

impl<'a> ToolDispatcher<'a> {
    pub(super) fn new(
        executor: &'a ToolExecutor,
        gate: &'a AuthorizationGate,
        confirmation: Option<&'a ConfirmationHandler>,
        allowed_tools: &'a [String],
        emitter: &'a RunEventEmitter,
        signal: &'a CancellationSignal,
    ) -> Self {
        Self {
            executor,
            gate,
            confirmation,
            allowed_tools,
            emitter,
            signal,
            buffer: DispatchBuffer::default(),
        }
    }

    pub(super) fn classify(&self, call: &ToolCall) -> Option<ToolClass> {
        self.executor.registry().classify(&call.name)
    }

    /// Route one call. Read-only calls are buffered and resolve at the next
    /// flush; anything else flushes the buffer first and then runs alone.
    /// Returns every result that resolved, in call order.
    pub(super) async fn submit(&mut self, session: &mut Session, call: ToolCall) -> Vec<ToolRecord> {
        match self.classify(&call) {
            Some(ToolClass::ReadOnly) => {
                let needs_confirmation = self.authorize(session, &call, ToolClass::ReadOnly)
                    == Authorization::NeedsConfirmation;
                self.buffer.add(PendingCall {
                    call,
                    needs_confirmation,
                });
                Vec::new()
            }
            class => {
                let mut records = self.flush(session).await;
                records.push(self.run_sequential(session, call, class).await);
                records
            }
        }
    }

    /// Run everything buffered as one batch.
    pub(super) async fn flush(&mut self, session: &mut Session) -> Vec<ToolRecord> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let pending = self.buffer.begin_flush();

        let mut resolved: Vec<(ToolCall, Option<ToolResult>)> = Vec::with_capacity(pending.len());
        for PendingCall {
            call,
            needs_confirmation,
        } in pending
        {
            let early = if needs_confirmation {
                self.confirm(session, &call, ToolClass::ReadOnly).await.err()
            } else {
                None
            };
            resolved.push((call, early));
        }

        let runnable: Vec<ToolCall> = resolved
            .iter()
            .filter(|(_, early)| early.is_none())
            .map(|(call, _)| call.clone())
            .collect();
        if !runnable.is_empty() {
            if debug_enabled() {
                tracing::debug!(
                    run_id = %self.emitter.run_id(),
                    calls = runnable.len(),
                    "flushing read-only batch"
                );
            }
            self.emitter.emit(AgentEvent::BatchStarted {
                call_ids: runnable.iter().map(|call| call.id.clone()).collect(),
            });
        }
        let mut results = self.executor.run_batch(runnable).await.into_iter();

        let records = resolved
            .into_iter()
            .map(|(call, early)| {
                let result = early
                    .or_else(|| results.next())
                    .unwrap_or_else(|| canceled_tool_result(&call));
                ToolRecord {
                    call,
                    class: Some(ToolClass::ReadOnly),
                    result,
                }
            })
            .collect();
        self.buffer.finish_flush();
        records
    }

    async fn run_sequential(
        &mut self,
        session: &mut Session,
        call: ToolCall,
        class: Option<ToolClass>,
    ) -> ToolRecord {
        let result = match class {
            None => self.executor.run_one(&call).await,
            Some(class) => match self.confirm(session, &call, class).await {
                Ok(()) => self.executor.run_one(&call).await,
                Err(result) => result,
            },
        };
        ToolRecord {
            call,
            class,
            result,
        }
    }

    fn authorize(&self, session: &Session, call: &ToolCall, class: ToolClass) -> Authorization {
        let ctx = AuthorizationContext {
            bypass: session.bypass(),
            approved_tools: session.approved_tools(),
            allowed_tools: self.allowed_tools,
        };
        self.gate.authorize(call, class, &ctx)
    }

    /// `Err` carries the result to record instead of running the call.
    async fn confirm(
        &mut self,
        session: &mut Session,
        call: &ToolCall,
        class: ToolClass,
    ) -> Result<(), ToolResult> {
        // Re-checked here so an earlier "don't ask again" in the same turn applies.
        if self.authorize(session, call, class) == Authorization::AutoApprove {
            return Ok(());
        }
        if self.signal.is_tripped() {
            return Err(canceled_tool_result(call));
        }

        let args = ToolArguments::new(call.arguments.clone());
        let request = ConfirmationRequest {
            call: call.clone(),
            class,
            target_path: args.target_path().map(str::to_string),
            preview: self.executor.registry().preview(call),
        };
        let Some(decision) =
            resolve_confirmation(self.emitter, self.confirmation, request, self.signal).await
        else {
            return Err(canceled_tool_result(call));
        };

        match decision {
            ConfirmationDecision::Approve => Ok(()),
            ConfirmationDecision::ApproveAndRemember => {
                session.remember_tool(call.name.clone());
                Ok(())
            }
            ConfirmationDecision::Reject { guidance } => Err(ToolResult::rejected(
                call,
                rejection_message(&call.name, guidance.as_deref()),
            )),
            ConfirmationDecision::Abort => {
                self.signal.trip("confirmation aborted");
                Err(ToolResult::rejected(
                    call,
                    rejection_message(&call.name, None),
                ))
            }
        }
    }
}
