//! Folds streamed model output into the in-progress turn.

use std::collections::HashSet;

use uuid::Uuid;

use super::super::events::AgentEvent;
use super::super::fallback::ToolRecord;
use super::super::productivity::states_pending_intent;
use super::control::RunEventEmitter;
use super::dispatch::ToolDispatcher;
use crate::agent::Session;
use crate::types::{ToolCall, Turn};

const UNKNOWN_TOOL_NAME: &str = "unknown";

/// One unit of model output.
#[derive(Debug)]
pub(super) enum NodeUnit {
    TextDelta(String),
    ToolCallRequest(ToolCall),
    ToolCallResult(ToolRecord),
}

/// What the iteration amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct NodeStatus {
    pub(super) had_tool_call: bool,
    pub(super) emitted_completion_marker: bool,
}

/// The committed result of one iteration.
#[derive(Debug)]
pub(super) struct CommittedTurn {
    /// Assistant text with any completion marker removed.
    pub(super) text: String,
    /// History index of the assistant turn, if one was written.
    pub(super) turn_index: Option<usize>,
    pub(super) status: NodeStatus,
    pub(super) records: Vec<ToolRecord>,
}

pub(super) struct NodeProcessor<'a> {
    emitter: &'a RunEventEmitter,
    completion_marker: &'a str,
    iteration: usize,
    turn_index: usize,
    text: String,
    calls: Vec<ToolCall>,
    records: Vec<ToolRecord>,
    seen_ids: HashSet<String>,
}

impl<'a> NodeProcessor<'a> {
    /// `turn_index` is where the assistant turn will land in history.
    pub(super) fn new(
        emitter: &'a RunEventEmitter,
        completion_marker: &'a str,
        iteration: usize,
        turn_index: usize,
    ) -> Self {
        Self {
            emitter,
            completion_marker,
            iteration,
            turn_index,
            text: String::new(),
            calls: Vec::new(),
            records: Vec::new(),
            seen_ids: HashSet::new(),
        }
    }

    pub(super) async fn process(
        &mut self,
        unit: NodeUnit,
        dispatcher: &mut ToolDispatcher<'_>,
        session: &mut Session,
    ) {
        match unit {
            NodeUnit::TextDelta(text) => {
                if text.is_empty() {
                    return;
                }
                self.text.push_str(&text);
                self.emitter.emit(AgentEvent::TextDelta { text });
            }
            NodeUnit::ToolCallRequest(call) => {
                let call = self.normalize(call, session);
                let class = dispatcher.classify(&call);
                tracing::debug!(
                    run_id = %self.emitter.run_id(),
                    iteration = self.iteration,
                    tool = %call.name,
                    call_id = %call.id,
                    class = ?class,
                    "tool call requested"
                );
                self.emitter.emit(AgentEvent::ToolStarted {
                    call: call.clone(),
                    class,
                });
                self.calls.push(call.clone());
                for record in dispatcher.submit(session, call).await {
                    self.record_result(record);
                }
            }
            NodeUnit::ToolCallResult(record) => self.record_result(record),
        }
    }

    /// Flush whatever is still buffered. Runs on every exit path.
    pub(super) async fn end_turn(&mut self, dispatcher: &mut ToolDispatcher<'_>, session: &mut Session) {
        for record in dispatcher.flush(session).await {
            self.process(NodeUnit::ToolCallResult(record), dispatcher, session)
                .await;
        }
    }

    fn record_result(&mut self, record: ToolRecord) {
        self.emitter.emit(AgentEvent::ToolFinished {
            result: record.result.clone(),
        });
        self.records.push(record);
    }

    fn normalize(&mut self, mut call: ToolCall, session: &Session) -> ToolCall {
        if call.name.trim().is_empty() {
            call.name = UNKNOWN_TOOL_NAME.to_string();
        }
        let missing_id = call.id.trim().is_empty();
        if missing_id || self.seen_ids.contains(&call.id) || session.has_tool_call_id(&call.id) {
            let fresh = format!("call_{}", Uuid::new_v4().simple());
            if !missing_id {
                tracing::warn!(call_id = %call.id, replacement = %fresh, "duplicate tool call id");
            }
            call.id = fresh;
        }
        self.seen_ids.insert(call.id.clone());
        call.originating_turn = self.turn_index;
        call
    }

    /// Write the assistant turn and then one result turn per call, in the
    /// order the calls were issued.
    pub(super) fn commit(mut self, session: &mut Session) -> CommittedTurn {
        let had_tool_call = !self.calls.is_empty();
        let (text, marker_seen) = strip_completion_marker(&self.text, self.completion_marker);
        if marker_seen && had_tool_call {
            tracing::warn!(
                run_id = %self.emitter.run_id(),
                iteration = self.iteration,
                "completion marker ignored in a turn that issued tool calls"
            );
        } else if marker_seen && self.iteration == 1 && states_pending_intent(&text) {
            tracing::warn!(
                run_id = %self.emitter.run_id(),
                "completion marker on the first iteration alongside pending work"
            );
        }

        let turn_index = if text.is_empty() && !had_tool_call {
            None
        } else {
            Some(session.push(Turn::assistant_with_tool_calls(
                text.clone(),
                self.calls.clone(),
            )))
        };

        let calls = &self.calls;
        self.records.sort_by_key(|record| {
            calls
                .iter()
                .position(|call| call.id == record.call.id)
                .unwrap_or(usize::MAX)
        });
        for record in &self.records {
            session.push(Turn::tool_result(record.result.clone()));
        }

        CommittedTurn {
            text,
            turn_index,
            status: NodeStatus {
                had_tool_call,
                emitted_completion_marker: marker_seen && !had_tool_call,
            },
            records: self.records,
        }
    }
}

/// Remove marker lines (or a leading marker) from `text`. The marker only
/// counts at the start of a line.
pub(super) fn strip_completion_marker(text: &str, marker: &str) -> (String, bool) {
    let mut found = false;
    let mut kept = Vec::new();
    for line in text.lines() {
        let rest = line
            .trim_start()
            .strip_prefix(marker)
            .filter(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'));
        match rest {
            Some(rest) => {
                found = true;
                let rest = rest.trim_start_matches([':', ' ', '\t']);
                if !rest.is_empty() {
                    kept.push(rest);
                }
            }
            None => kept.push(line),
        }
    }
    if !found {
        return (text.trim().to_string(), false);
    }
    (kept.join("\n").trim().to_string(), true)
}
