use std::sync::atomic::{AtomicU64, Ordering};

use super::super::approvals::{ConfirmationDecision, ConfirmationHandler, ConfirmationRequest};
use super::super::events::{AgentEvent, RunEvent, RunEventSink};
use super::super::types::RunId;
use crate::util::cancel::CancellationSignal;

pub(super) struct RunEventEmitter {
    run_id: RunId,
    seq: AtomicU64,
    sink: Option<RunEventSink>,
}

impl RunEventEmitter {
    pub(super) fn new(run_id: RunId, sink: Option<RunEventSink>) -> Self {
        Self {
            run_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(super) fn run_id(&self) -> RunId {
        self.run_id
    }

    pub(super) fn emit(&self, event: AgentEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(RunEvent {
            run_id: self.run_id,
            seq,
            timestamp: chrono::Utc::now(),
            event,
        });
    }
}

/// Ask the confirmation handler about `request`.
///
/// Returns `None` when the run is cancelled while waiting. Without a handler
/// the call is rejected.
pub(super) async fn resolve_confirmation(
    emitter: &RunEventEmitter,
    handler: Option<&ConfirmationHandler>,
    request: ConfirmationRequest,
    signal: &CancellationSignal,
) -> Option<ConfirmationDecision> {
    emitter.emit(AgentEvent::ConfirmationRequested {
        request: request.clone(),
    });
    let Some(handler) = handler else {
        if debug_enabled() {
            tracing::debug!(
                run_id = %emitter.run_id(),
                tool = %request.call.name,
                "no confirmation handler; rejecting"
            );
        }
        return Some(ConfirmationDecision::Reject { guidance: None });
    };
    tokio::select! {
        biased;
        _ = signal.tripped() => None,
        decision = handler(request) => Some(decision),
    }
}

pub(super) fn debug_enabled() -> bool {
    matches!(std::env::var("HELM_DEBUG").as_deref(), Ok("1"))
}
