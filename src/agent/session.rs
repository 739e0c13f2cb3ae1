//! Conversation session state carried across runs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pruning::{self, PrunePolicy};
use crate::config::LimitOverrides;
use crate::types::{Role, ToolResult, Turn, Usage};

/// Explicit per-conversation state, passed into and returned from a run.
///
/// History is only appended to by the run that currently owns the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    id: Uuid,
    turns: Vec<Turn>,
    iteration: u64,
    approved_tools: BTreeSet<String>,
    bypass: bool,
    usage: Usage,
    #[serde(default)]
    overrides: LimitOverrides,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
            iteration: 0,
            approved_tools: BTreeSet::new(),
            bypass: false,
            usage: Usage::default(),
            overrides: LimitOverrides::default(),
        }
    }

    /// Start from an existing history (e.g. restored by a persistence layer).
    pub fn with_history(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            ..Self::new()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Total iterations across every run of this session.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Skip confirmation for every tool (yolo mode).
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn approved_tools(&self) -> &BTreeSet<String> {
        &self.approved_tools
    }

    pub fn is_tool_approved(&self, name: &str) -> bool {
        self.approved_tools.contains(name)
    }

    /// Stop asking for confirmation for `name`.
    pub fn remember_tool(&mut self, name: impl Into<String>) {
        self.approved_tools.insert(name.into());
    }

    pub fn forget_tool(&mut self, name: &str) -> bool {
        self.approved_tools.remove(name)
    }

    pub fn overrides(&self) -> &LimitOverrides {
        &self.overrides
    }

    pub fn set_overrides(&mut self, overrides: LimitOverrides) {
        self.overrides = overrides;
    }

    /// Drop history and counters. Approvals, bypass and overrides survive.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.iteration = 0;
        self.usage = Usage::default();
    }

    /// Text of the most recent model turn, if any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(Turn::text)
    }

    pub(crate) fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub(crate) fn advance_iteration(&mut self) -> u64 {
        self.iteration += 1;
        self.iteration
    }

    pub(crate) fn record_usage(&mut self, usage: &Usage) {
        self.usage.merge(usage);
    }

    /// Prefix an interrupted turn's text with the interrupted marker.
    pub fn mark_interrupted(&mut self, turn_index: usize) {
        if let Some(turn) = self.turns.get_mut(turn_index) {
            turn.mark_interrupted();
        }
    }

    /// Whether any tool call id is already used in this session.
    pub(crate) fn has_tool_call_id(&self, id: &str) -> bool {
        self.turns
            .iter()
            .flat_map(Turn::tool_calls)
            .any(|call| call.id == id)
    }

    /// Tool calls that have no paired result anywhere in history.
    pub fn unanswered_tool_calls(&self) -> Vec<&crate::types::ToolCall> {
        let answered: HashSet<&str> = self
            .turns
            .iter()
            .flat_map(Turn::tool_results)
            .map(|result| result.call_id.as_str())
            .collect();
        self.turns
            .iter()
            .flat_map(Turn::tool_calls)
            .filter(|call| !answered.contains(call.id.as_str()))
            .collect()
    }

    /// Replace old tool output with a placeholder once the history is long
    /// enough for `policy`. Returns the estimated tokens reclaimed.
    pub fn prune_tool_results(&mut self, policy: &PrunePolicy) -> usize {
        let reclaimed = pruning::prune_tool_results(&mut self.turns, policy);
        if reclaimed > 0 {
            tracing::debug!(session_id = %self.id, reclaimed, "pruned old tool output");
        }
        reclaimed
    }

    /// Append an error result for every unanswered tool call so the next
    /// model request never carries a dangling call. Returns how many were
    /// patched.
    pub(crate) fn repair_unanswered_tool_calls(&mut self) -> usize {
        let orphans: Vec<ToolResult> = self
            .unanswered_tool_calls()
            .into_iter()
            .map(|call| {
                ToolResult::error(call, "Tool execution was interrupted before completion", 0)
            })
            .collect();
        let patched = orphans.len();
        for result in orphans {
            tracing::warn!(call_id = %result.call_id, tool = %result.tool_name, "patching unanswered tool call");
            self.turns.push(Turn::tool_result(result));
        }
        patched
    }
}
