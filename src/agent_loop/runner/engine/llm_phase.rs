use futures::StreamExt;
use tokio::time::{self, Instant};

use super::super::control::{debug_enabled, RunEventEmitter};
use super::super::dispatch::ToolDispatcher;
use super::super::node::{NodeProcessor, NodeUnit};
use crate::agent::Session;
use crate::config::AgentConfig;
use crate::error::HelmError;
use crate::provider::{ModelClient, ModelRequest};
use crate::types::{ModelStreamEvent, Usage};
use crate::util::cancel::CancellationSignal;

pub(super) enum LlmPhaseOutcome {
    /// The stream ended normally.
    Ready,
    Canceled,
    Failed(String),
}

pub(super) struct LlmPhaseArgs<'a, 'n, 'd> {
    pub(super) model: &'a dyn ModelClient,
    pub(super) request: &'a ModelRequest,
    pub(super) config: &'a AgentConfig,
    pub(super) signal: &'a CancellationSignal,
    pub(super) emitter: &'a RunEventEmitter,
    pub(super) node: &'a mut NodeProcessor<'n>,
    pub(super) dispatcher: &'a mut ToolDispatcher<'d>,
    pub(super) session: &'a mut Session,
    pub(super) usage: &'a mut Usage,
    pub(super) iteration: usize,
}

pub(super) async fn run_llm_phase(args: LlmPhaseArgs<'_, '_, '_>) -> LlmPhaseOutcome {
    let LlmPhaseArgs {
        model,
        request,
        config,
        signal,
        emitter,
        node,
        dispatcher,
        session,
        usage,
        iteration,
    } = args;

    let opened = tokio::select! {
        biased;
        _ = signal.tripped() => return LlmPhaseOutcome::Canceled,
        opened = config.retry.execute(signal, move |_attempt| {
            model.stream(request, signal.child_token())
        }) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(HelmError::Canceled) => return LlmPhaseOutcome::Canceled,
        Err(err) => return LlmPhaseOutcome::Failed(err.to_string()),
    };

    let idle_timeout = config.stream_idle_timeout();
    let idle_sleep = time::sleep(idle_timeout);
    tokio::pin!(idle_sleep);
    let mut events = 0usize;
    loop {
        let event = tokio::select! {
            biased;
            _ = signal.tripped() => return LlmPhaseOutcome::Canceled,
            _ = &mut idle_sleep => {
                return LlmPhaseOutcome::Failed(format!(
                    "stream idle for {}ms",
                    idle_timeout.as_millis()
                ));
            }
            event = stream.next() => event,
        };
        let Some(event) = event else {
            break;
        };
        events += 1;
        match event {
            Ok(ModelStreamEvent::TextDelta { text }) => {
                node.process(NodeUnit::TextDelta(text), dispatcher, session)
                    .await;
            }
            Ok(ModelStreamEvent::ToolCall(call)) => {
                node.process(NodeUnit::ToolCallRequest(call), dispatcher, session)
                    .await;
            }
            Ok(ModelStreamEvent::Usage(delta)) => {
                session.record_usage(&delta);
                usage.merge(&delta);
            }
            Ok(ModelStreamEvent::Done) => break,
            Err(err) => return LlmPhaseOutcome::Failed(err.to_string()),
        }
        // Tool execution above may have taken longer than the idle window.
        idle_sleep.as_mut().reset(Instant::now() + idle_timeout);
    }

    if debug_enabled() {
        tracing::debug!(
            run_id = %emitter.run_id(),
            iteration,
            events,
            model = model.name(),
            "helm stream finished"
        );
    }
    LlmPhaseOutcome::Ready
}
