//! Clearing old tool output out of long histories.
//!
//! Tool results dominate context in a long session. Once enough recent
//! output is protected, older payloads are swapped for a short placeholder
//! while the call/result pairing stays intact.

use serde::{Deserialize, Serialize};

use crate::types::{ContentPart, Role, ToolResult, Turn};

/// Payload left behind in a cleared tool result.
pub const PRUNED_PLACEHOLDER: &str = "[Old tool result content cleared]";

/// When and how much old tool output is cleared before a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrunePolicy {
    pub enabled: bool,
    /// Most recent tool output, in estimated tokens, that is never cleared.
    pub protect_tokens: usize,
    /// Skip pruning unless at least this many tokens would be cleared.
    pub minimum_savings_tokens: usize,
    /// User turns the history must hold before anything is cleared.
    pub min_user_turns: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            protect_tokens: 40_000,
            minimum_savings_tokens: 20_000,
            min_user_turns: 2,
        }
    }
}

impl PrunePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Rough token count: four characters per token.
pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

fn estimate_payload_tokens(result: &ToolResult) -> usize {
    match &result.payload {
        serde_json::Value::String(text) => estimate_text_tokens(text),
        other => estimate_text_tokens(&other.to_string()),
    }
}

fn is_pruned(result: &ToolResult) -> bool {
    result.payload.as_str() == Some(PRUNED_PLACEHOLDER)
}

/// Clear tool output older than the protected window. Returns the number
/// of estimated tokens reclaimed, zero when the policy declines to prune.
pub(crate) fn prune_tool_results(turns: &mut [Turn], policy: &PrunePolicy) -> usize {
    if !policy.enabled {
        return 0;
    }
    let user_turns = turns.iter().filter(|turn| turn.role == Role::User).count();
    if user_turns < policy.min_user_turns {
        return 0;
    }

    // Newest first: (turn index, part index, estimated tokens).
    let mut candidates = Vec::new();
    for (turn_index, turn) in turns.iter().enumerate().rev() {
        for (part_index, part) in turn.content.iter().enumerate().rev() {
            if let ContentPart::ToolResult(result) = part {
                candidates.push((turn_index, part_index, estimate_payload_tokens(result)));
            }
        }
    }

    let mut seen = 0usize;
    let Some(boundary) = candidates.iter().position(|(_, _, tokens)| {
        seen += tokens;
        seen > policy.protect_tokens
    }) else {
        return 0;
    };

    let prunable = &candidates[boundary..];
    let savings: usize = prunable.iter().map(|(_, _, tokens)| tokens).sum();
    if savings < policy.minimum_savings_tokens {
        return 0;
    }

    let placeholder_tokens = estimate_text_tokens(PRUNED_PLACEHOLDER);
    let mut reclaimed = 0usize;
    for &(turn_index, part_index, tokens) in prunable {
        if let Some(ContentPart::ToolResult(result)) = turns
            .get_mut(turn_index)
            .and_then(|turn| turn.content.get_mut(part_index))
        {
            if is_pruned(result) {
                continue;
            }
            result.payload = serde_json::Value::String(PRUNED_PLACEHOLDER.to_string());
            reclaimed += tokens.saturating_sub(placeholder_tokens);
        }
    }
    reclaimed
}
