//! Best-effort answer assembled from the run's tool results when the loop
//! ends without the model declaring completion.

use serde::{Deserialize, Serialize};

use super::productivity::truncate_chars;
use super::types::FallbackReason;
use crate::config::FallbackVerbosity;
use crate::tools::{ToolArguments, ToolClass};
use crate::types::{ToolCall, ToolResult, ToolStatus};

const MAX_ISSUES: usize = 5;
const LAST_OUTPUT_CHARS: usize = 200;

/// One executed call and its outcome, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub call: ToolCall,
    /// `None` for calls to unregistered tools.
    pub class: Option<ToolClass>,
    pub result: ToolResult,
}

/// Structured fallback answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub summary: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl FallbackResponse {
    /// Plain-text rendering used as the run's final answer.
    pub fn render(&self) -> String {
        let mut out = self.summary.clone();
        if !self.progress.is_empty() {
            out.push_str(&format!("\n\nProgress: {}", self.progress));
        }
        push_section(&mut out, "Issues", &self.issues);
        push_section(&mut out, "Details", &self.details);
        push_section(&mut out, "Next steps", &self.next_steps);
        out
    }
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n\n{title}:"));
    for item in items {
        out.push_str(&format!("\n- {item}"));
    }
}

/// Inputs beyond the tool ledger.
#[derive(Debug, Clone)]
pub struct FallbackContext<'a> {
    pub reason: &'a FallbackReason,
    pub iterations: usize,
    pub last_model_text: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSynthesizer {
    verbosity: FallbackVerbosity,
}

impl FallbackSynthesizer {
    pub fn new(verbosity: FallbackVerbosity) -> Self {
        Self { verbosity }
    }

    pub fn synthesize(&self, ledger: &[ToolRecord], ctx: &FallbackContext<'_>) -> FallbackResponse {
        let summary = match ctx.reason {
            FallbackReason::IterationLimit { max_iterations } => format!(
                "Reached the iteration limit ({max_iterations}) before the task was declared complete. \
                 This is a best-effort summary of the work so far."
            ),
            FallbackReason::ModelUnavailable { failures, last_error } => format!(
                "The model failed {failures} times in a row ({last_error}). \
                 This is a best-effort summary of the work so far."
            ),
        };
        if self.verbosity == FallbackVerbosity::Minimal {
            return FallbackResponse {
                summary,
                ..Default::default()
            };
        }

        let count = |status: ToolStatus| ledger.iter().filter(|r| r.result.status == status).count();
        let (succeeded, failed, rejected) = (
            count(ToolStatus::Success),
            count(ToolStatus::Error),
            count(ToolStatus::Rejected),
        );
        let progress = format!(
            "{} iteration(s), {} tool call(s): {succeeded} succeeded, {failed} failed, {rejected} rejected.",
            ctx.iterations,
            ledger.len(),
        );

        let issues: Vec<String> = ledger
            .iter()
            .filter(|record| !record.result.is_success())
            .take(MAX_ISSUES)
            .map(|record| match record.result.status {
                ToolStatus::Rejected => format!("{} was rejected by the user", record.call.name),
                _ => format!(
                    "{} failed: {}",
                    record.call.name,
                    record.result.error_message().unwrap_or("unknown error")
                ),
            })
            .collect();

        let mut response = FallbackResponse {
            summary,
            progress,
            issues,
            ..Default::default()
        };
        if self.verbosity == FallbackVerbosity::Detailed {
            response.details = details(ledger, ctx.last_model_text);
            response.next_steps = next_steps(ledger, failed > 0, ctx.reason);
        }
        response
    }
}

fn details(ledger: &[ToolRecord], last_model_text: Option<&str>) -> Vec<String> {
    let mut read = Vec::new();
    let mut changed = Vec::new();
    let mut commands = Vec::new();
    for record in ledger.iter().filter(|record| record.result.is_success()) {
        let args = ToolArguments::new(record.call.arguments.clone());
        match record.class {
            Some(ToolClass::ReadOnly) => push_unique(&mut read, args.target_path()),
            Some(ToolClass::Write) => push_unique(&mut changed, args.target_path()),
            Some(ToolClass::Execute) => push_unique(
                &mut commands,
                args.get_str("command").or_else(|| args.get_str("cmd")),
            ),
            None => {}
        }
    }

    let mut details = Vec::new();
    if !read.is_empty() {
        details.push(format!("Read: {}", read.join(", ")));
    }
    if !changed.is_empty() {
        details.push(format!("Changed: {}", changed.join(", ")));
    }
    if !commands.is_empty() {
        details.push(format!("Ran: {}", commands.join("; ")));
    }
    if let Some(text) = last_model_text.map(str::trim).filter(|text| !text.is_empty()) {
        details.push(format!(
            "Last model output: {}",
            truncate_chars(text, LAST_OUTPUT_CHARS)
        ));
    }
    details
}

fn push_unique(items: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !items.iter().any(|existing| existing == value) {
            items.push(value.to_string());
        }
    }
}

fn next_steps(ledger: &[ToolRecord], had_failures: bool, reason: &FallbackReason) -> Vec<String> {
    let mut steps = Vec::new();
    if ledger
        .iter()
        .any(|record| record.class == Some(ToolClass::Write) && record.result.is_success())
    {
        steps.push("Review the changed files before relying on them.".to_string());
    }
    if had_failures {
        steps.push("Look into the failed tool calls listed above.".to_string());
    }
    match reason {
        FallbackReason::IterationLimit { .. } => {
            steps.push("Continue with a narrower request or a higher iteration limit.".to_string())
        }
        FallbackReason::ModelUnavailable { .. } => {
            steps.push("Check the model connection and retry.".to_string())
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record(id: &str, name: &str, class: ToolClass, args: serde_json::Value, status: ToolStatus) -> ToolRecord {
        let call = ToolCall::new(id, name, args);
        let result = match status {
            ToolStatus::Success => ToolResult::success(&call, json!("ok"), 1),
            ToolStatus::Error => ToolResult::error(&call, "permission denied", 1),
            ToolStatus::Rejected => ToolResult::rejected(&call, "declined"),
        };
        ToolRecord {
            call,
            class: Some(class),
            result,
        }
    }

    fn ledger() -> Vec<ToolRecord> {
        vec![
            record("1", "read_file", ToolClass::ReadOnly, json!({"filepath": "src/a.rs"}), ToolStatus::Success),
            record("2", "read_file", ToolClass::ReadOnly, json!({"filepath": "src/a.rs"}), ToolStatus::Success),
            record("3", "write_file", ToolClass::Write, json!({"filepath": "src/b.rs"}), ToolStatus::Success),
            record("4", "bash", ToolClass::Execute, json!({"command": "cargo fmt"}), ToolStatus::Error),
            record("5", "bash", ToolClass::Execute, json!({"command": "rm -rf target"}), ToolStatus::Rejected),
        ]
    }

    static LIMIT: FallbackReason = FallbackReason::IterationLimit { max_iterations: 8 };

    fn ctx() -> FallbackContext<'static> {
        FallbackContext {
            reason: &LIMIT,
            iterations: 8,
            last_model_text: Some("Still working on b.rs"),
        }
    }

    #[test]
    fn minimal_is_summary_only() {
        let response = FallbackSynthesizer::new(FallbackVerbosity::Minimal).synthesize(&ledger(), &ctx());
        assert!(response.summary.starts_with("Reached the iteration limit (8)"));
        assert!(response.progress.is_empty());
        assert_eq!(response.render(), response.summary);
    }

    #[test]
    fn normal_counts_outcomes_and_lists_issues() {
        let response = FallbackSynthesizer::new(FallbackVerbosity::Normal).synthesize(&ledger(), &ctx());
        assert_eq!(
            response.progress,
            "8 iteration(s), 5 tool call(s): 3 succeeded, 1 failed, 1 rejected."
        );
        assert_eq!(
            response.issues,
            vec![
                "bash failed: permission denied".to_string(),
                "bash was rejected by the user".to_string(),
            ]
        );
        assert!(response.details.is_empty());
    }

    #[test]
    fn detailed_lists_files_and_next_steps() {
        let response = FallbackSynthesizer::new(FallbackVerbosity::Detailed).synthesize(&ledger(), &ctx());
        assert_eq!(
            response.details,
            vec![
                "Read: src/a.rs".to_string(),
                "Changed: src/b.rs".to_string(),
                "Last model output: Still working on b.rs".to_string(),
            ]
        );
        assert_eq!(response.next_steps.len(), 3);
        let rendered = response.render();
        assert!(rendered.contains("\n\nProgress: 8 iteration(s)"));
        assert!(rendered.contains("\n\nNext steps:\n- Review the changed files"));
    }
}
