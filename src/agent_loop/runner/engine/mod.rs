use chrono::Utc;

use super::super::events::AgentEvent;
use super::super::fallback::{FallbackContext, FallbackSynthesizer, ToolRecord};
use super::super::guidance::{GuidanceContext, GuidanceInjector};
use super::super::productivity::{
    assess, CorrectionContext, IterationReport, ProductivityEnforcer,
};
use super::super::response_state::ResponseState;
use super::super::types::{AgentResult, CompletionKind, FallbackReason};
use super::control::{debug_enabled, RunEventEmitter};
use super::dispatch::ToolDispatcher;
use super::node::NodeProcessor;
use super::tooling::ToolExecutor;
use super::{LoopRunner, RunRequest};
use crate::agent::Session;
use crate::config::AgentConfig;
use crate::provider::ModelRequest;
use crate::tools::InvokeOptions;
use crate::types::{Cost, Turn, Usage};
use crate::util::cancel::CancellationSignal;

mod llm_phase;

use llm_phase::{run_llm_phase, LlmPhaseArgs, LlmPhaseOutcome};

/// How the iteration loop ended.
enum LoopExit {
    Declared { text: String },
    Fallback(FallbackReason),
    Cancelled { interrupted_turn: Option<usize> },
}

impl LoopRunner {
    /// Drive one request to completion against `session`.
    ///
    /// `config` is expected to be validated already. Every failure inside
    /// the loop is folded into the returned [`AgentResult`].
    pub async fn run(
        &self,
        request: &RunRequest,
        config: &AgentConfig,
        session: &mut Session,
        signal: &CancellationSignal,
    ) -> AgentResult {
        let emitter = RunEventEmitter::new(request.run_id, self.event_sink.clone());
        let executor = ToolExecutor::new(
            self.tools.clone(),
            InvokeOptions {
                timeout: config.tool_timeout(),
                retry: config.retry.clone(),
                cancel: signal.clone(),
            },
            config.max_parallel,
        );
        let mut dispatcher = ToolDispatcher::new(
            &executor,
            &self.gate,
            self.confirmation.as_ref(),
            &config.allowed_tools,
            &emitter,
            signal,
        );
        let enforcer = ProductivityEnforcer::new(config.unproductive_threshold);
        let guidance = GuidanceInjector::new(config.guidance_interval, config.guidance_enabled);
        let schemas = self.tools.schemas();

        let mut state = ResponseState::new();
        let mut ledger: Vec<ToolRecord> = Vec::new();
        let mut usage = Usage::default();
        let mut last_text: Option<String> = None;
        let mut consecutive_failures = 0usize;
        let mut iteration = 0usize;

        tracing::info!(
            run_id = %request.run_id,
            model = self.model.name(),
            max_iterations = config.max_iterations,
            tools = self.tools.len(),
            "helm run started"
        );
        emitter.emit(AgentEvent::RunStarted {
            max_iterations: config.max_iterations,
        });
        session.repair_unanswered_tool_calls();
        session.push(Turn::user(request.prompt.clone()));

        let exit = 'run: loop {
            if signal.is_tripped() {
                break 'run LoopExit::Cancelled {
                    interrupted_turn: None,
                };
            }
            if iteration >= config.max_iterations {
                break 'run LoopExit::Fallback(FallbackReason::IterationLimit {
                    max_iterations: config.max_iterations,
                });
            }

            iteration += 1;
            session.advance_iteration();
            emitter.emit(AgentEvent::IterationStarted { iteration });
            session.repair_unanswered_tool_calls();
            session.prune_tool_results(&config.pruning);
            let model_request = ModelRequest {
                system_prompt: config.system_prompt.clone(),
                turns: session.turns().to_vec(),
                tools: schemas.clone(),
            };

            let mut node = NodeProcessor::new(
                &emitter,
                &config.completion_marker,
                iteration,
                session.len(),
            );
            let outcome = run_llm_phase(LlmPhaseArgs {
                model: self.model.as_ref(),
                request: &model_request,
                config,
                signal,
                emitter: &emitter,
                node: &mut node,
                dispatcher: &mut dispatcher,
                session: &mut *session,
                usage: &mut usage,
                iteration,
            })
            .await;
            node.end_turn(&mut dispatcher, session).await;
            let committed = node.commit(session);
            ledger.extend(committed.records);
            if !committed.text.is_empty() {
                last_text = Some(committed.text.clone());
            }

            let outcome = if signal.is_tripped() {
                LlmPhaseOutcome::Canceled
            } else {
                outcome
            };
            match outcome {
                LlmPhaseOutcome::Ready => consecutive_failures = 0,
                LlmPhaseOutcome::Canceled => {
                    break 'run LoopExit::Cancelled {
                        interrupted_turn: committed.turn_index,
                    };
                }
                LlmPhaseOutcome::Failed(error) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        run_id = %request.run_id,
                        iteration,
                        consecutive_failures,
                        error = %error,
                        "model iteration failed"
                    );
                    emitter.emit(AgentEvent::ModelFailed {
                        iteration,
                        error: error.clone(),
                    });
                    if consecutive_failures >= config.max_model_failures {
                        break 'run LoopExit::Fallback(FallbackReason::ModelUnavailable {
                            failures: consecutive_failures,
                            last_error: error,
                        });
                    }
                    continue 'run;
                }
            }

            let status = committed.status;
            if status.emitted_completion_marker {
                state.set_completion_detected();
                break 'run LoopExit::Declared {
                    text: committed.text,
                };
            }
            let substantive = !status.had_tool_call
                && assess(&committed.text, state.last_fingerprint()).is_none();
            if !config.require_completion_marker && substantive {
                state.set_completion_detected();
                break 'run LoopExit::Declared {
                    text: committed.text,
                };
            }

            let stall = enforcer.observe(
                &mut state,
                &IterationReport {
                    text: &committed.text,
                    had_tool_call: status.had_tool_call,
                    emitted_completion_marker: status.emitted_completion_marker,
                },
            );
            if iteration >= config.max_iterations {
                continue 'run;
            }

            let next = iteration + 1;
            if let Some(reason) = stall {
                let recent_tools: Vec<String> =
                    ledger.iter().map(|record| record.call.name.clone()).collect();
                let message = ProductivityEnforcer::correction_message(
                    reason,
                    &CorrectionContext {
                        request: &request.prompt,
                        recent_tools: &recent_tools,
                        iteration: next,
                        completion_marker: &config.completion_marker,
                    },
                );
                tracing::warn!(run_id = %request.run_id, iteration, %reason, "injecting correction");
                session.push(Turn::system(message));
                emitter.emit(AgentEvent::CorrectionInjected {
                    iteration: next,
                    reason,
                });
            } else if let Some(message) = guidance.maybe_inject(
                &mut state,
                next,
                &GuidanceContext {
                    request: &request.prompt,
                    tool_calls_so_far: ledger.len(),
                    max_iterations: config.max_iterations,
                    completion_marker: &config.completion_marker,
                },
            ) {
                if debug_enabled() {
                    tracing::debug!(run_id = %request.run_id, iteration = next, "injecting guidance");
                }
                session.push(Turn::system(message));
                emitter.emit(AgentEvent::GuidanceInjected { iteration: next });
            }
        };

        let (text, completion, fallback) = match exit {
            LoopExit::Declared { text } => {
                emitter.emit(AgentEvent::Completed {
                    iterations: iteration,
                });
                (text, CompletionKind::Declared, None)
            }
            LoopExit::Fallback(reason) => {
                let response = FallbackSynthesizer::new(config.fallback_verbosity).synthesize(
                    &ledger,
                    &FallbackContext {
                        reason: &reason,
                        iterations: iteration,
                        last_model_text: last_text.as_deref(),
                    },
                );
                tracing::warn!(run_id = %request.run_id, iterations = iteration, %reason, "run ended in fallback");
                emitter.emit(AgentEvent::Fallback {
                    iterations: iteration,
                    reason,
                });
                (response.render(), CompletionKind::Fallback, Some(response))
            }
            LoopExit::Cancelled { interrupted_turn } => {
                let text = match interrupted_turn {
                    Some(index) => {
                        session.mark_interrupted(index);
                        session.turns().get(index).map(Turn::text).unwrap_or_default()
                    }
                    None => String::new(),
                };
                emitter.emit(AgentEvent::Cancelled {
                    iterations: iteration,
                });
                (text, CompletionKind::Cancelled, None)
            }
        };

        tracing::info!(
            run_id = %request.run_id,
            iterations = iteration,
            tool_calls = ledger.len(),
            completion = %completion,
            "helm run finished"
        );
        AgentResult {
            run_id: request.run_id,
            text,
            completion,
            iterations: iteration,
            tool_calls: ledger.len(),
            usage,
            cost: config
                .pricing
                .as_ref()
                .map(|pricing| Cost::from_usage(&usage, pricing)),
            fallback,
            finished_at: Utc::now(),
        }
    }
}
