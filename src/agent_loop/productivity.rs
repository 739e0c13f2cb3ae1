//! Stall detection and the corrective message injected when the model stops
//! making progress.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::response_state::ResponseState;

const TASK_PREVIEW_CHARS: usize = 200;
const RECENT_TOOL_COUNT: usize = 3;

static PENDING_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(let me|let's|i'll|i will|i am going to|i'm going to|going to|about to|need to (check|find|look)|i should)\b",
    )
    .expect("intent regex must compile")
});

static ACTION_ENDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(checking|searching|looking|finding|reading|analyzing)[.:…]*$")
        .expect("action ending regex must compile")
});

static DANGLING_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(and|or|but|the|a|an|to|of|with|for|in|that|which)$")
        .expect("dangling word regex must compile")
});

/// Why an iteration counted as a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StallReason {
    Empty,
    Truncated,
    IntentionWithoutAction,
    Repetition,
}

impl StallReason {
    fn describe(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Truncated => "cut off mid-thought",
            Self::IntentionWithoutAction => "a statement of what you would do, with no tool call",
            Self::Repetition => "a repeat of your previous response",
        }
    }
}

/// What the node processor reported for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport<'a> {
    pub text: &'a str,
    pub had_tool_call: bool,
    pub emitted_completion_marker: bool,
}

/// Context quoted back to the model in a correction.
#[derive(Debug, Clone)]
pub struct CorrectionContext<'a> {
    pub request: &'a str,
    pub recent_tools: &'a [String],
    pub iteration: usize,
    pub completion_marker: &'a str,
}

/// Counts consecutive stalled iterations and fires once per stall.
#[derive(Debug, Clone, Copy)]
pub struct ProductivityEnforcer {
    threshold: usize,
}

impl ProductivityEnforcer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    /// Record an iteration. Returns the stall reason when the threshold is
    /// crossed; the counter is reset at that point.
    pub fn observe(&self, state: &mut ResponseState, report: &IterationReport<'_>) -> Option<StallReason> {
        let fingerprint = fingerprint(report.text);
        if report.had_tool_call || report.emitted_completion_marker {
            state.reset_unproductive();
            state.set_fingerprint(fingerprint);
            return None;
        }

        let reason = assess(report.text, state.last_fingerprint());
        state.set_fingerprint(fingerprint);
        let Some(reason) = reason else {
            state.reset_unproductive();
            return None;
        };

        let count = state.record_unproductive();
        tracing::debug!(%reason, count, threshold = self.threshold, "unproductive iteration");
        if count >= self.threshold {
            state.reset_unproductive();
            Some(reason)
        } else {
            None
        }
    }

    /// The blunt corrective message for `reason`.
    pub fn correction_message(reason: StallReason, ctx: &CorrectionContext<'_>) -> String {
        let recent = if ctx.recent_tools.is_empty() {
            "none".to_string()
        } else {
            let skip = ctx.recent_tools.len().saturating_sub(RECENT_TOOL_COUNT);
            ctx.recent_tools[skip..].join(", ")
        };
        format!(
            "Your previous response was {described}. The task is not complete.\n\n\
             Task: {task}\n\
             Recent tools: {recent}\n\
             Attempt: {iteration}\n\n\
             In your next response do exactly one of the following:\n\
             1. Call a tool that moves the task forward.\n\
             2. If the task is finished, start a line with {marker} and give the final answer.\n\
             3. If you are blocked, name the blocker and what you already tried.\n\n\
             Do not describe an action without performing it.",
            described = reason.describe(),
            task = truncate_chars(ctx.request, TASK_PREVIEW_CHARS),
            iteration = ctx.iteration,
            marker = ctx.completion_marker,
        )
    }
}

/// Classify a tool-less, marker-less turn. `None` means it carried new
/// information.
pub fn assess(text: &str, previous_fingerprint: Option<&str>) -> Option<StallReason> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(StallReason::Empty);
    }
    if appears_truncated(trimmed) {
        return Some(StallReason::Truncated);
    }
    if states_pending_intent(trimmed) {
        return Some(StallReason::IntentionWithoutAction);
    }
    if previous_fingerprint.is_some() && fingerprint(trimmed).as_deref() == previous_fingerprint {
        return Some(StallReason::Repetition);
    }
    None
}

/// Heuristic check for a response that stopped mid-sentence.
pub fn appears_truncated(text: &str) -> bool {
    let text = text.trim_end();
    if text.matches("```").count() % 2 == 1 {
        return true;
    }
    if text.ends_with("...") && !text.ends_with("....") {
        return true;
    }
    if text.ends_with([',', ':', ';', '(', '[', '{', '-']) {
        return true;
    }
    DANGLING_WORD_RE.is_match(text)
}

/// The last line announces work that was never started.
pub(crate) fn states_pending_intent(text: &str) -> bool {
    let last_line = text.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("");
    let last_line = last_line.to_lowercase().replace("let me know", "");
    PENDING_INTENT_RE.is_match(&last_line) || ACTION_ENDING_RE.is_match(last_line.trim_end())
}

fn fingerprint(text: &str) -> Option<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
