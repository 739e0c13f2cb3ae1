//! Periodic "is the task done yet?" self-check prompt.

use super::productivity::truncate_chars;
use super::response_state::ResponseState;

const TASK_PREVIEW_CHARS: usize = 200;
const LOW_BUDGET_ITERATIONS: usize = 2;

/// Inputs quoted in the guidance prompt.
#[derive(Debug, Clone)]
pub struct GuidanceContext<'a> {
    pub request: &'a str,
    pub tool_calls_so_far: usize,
    pub max_iterations: usize,
    pub completion_marker: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct GuidanceInjector {
    interval: usize,
    enabled: bool,
}

impl GuidanceInjector {
    pub fn new(interval: usize, enabled: bool) -> Self {
        Self {
            interval: interval.max(1),
            enabled,
        }
    }

    /// Whether guidance goes in before `next_iteration` (1-based). Never
    /// before iteration 2.
    pub fn is_due(&self, next_iteration: usize) -> bool {
        self.enabled && next_iteration >= 2 && (next_iteration - 1) % self.interval == 0
    }

    /// Build the prompt if one is due and record the injection.
    pub fn maybe_inject(
        &self,
        state: &mut ResponseState,
        next_iteration: usize,
        ctx: &GuidanceContext<'_>,
    ) -> Option<String> {
        if !self.is_due(next_iteration) {
            return None;
        }
        state.mark_guidance(next_iteration);
        Some(guidance_message(next_iteration, ctx))
    }
}

fn guidance_message(next_iteration: usize, ctx: &GuidanceContext<'_>) -> String {
    let remaining = ctx.max_iterations.saturating_sub(next_iteration - 1);
    let mut message = format!(
        "Progress check before iteration {next_iteration} of {max}.\n\
         Task: {task}\n\
         Tool calls so far: {tools}\n\n\
         Assess whether the task is complete:\n\
         - If it is, start a line with {marker} and give the final answer.\n\
         - If it is not, name the single next step and take it now with a tool call.",
        max = ctx.max_iterations,
        task = truncate_chars(ctx.request, TASK_PREVIEW_CHARS),
        tools = ctx.tool_calls_so_far,
        marker = ctx.completion_marker,
    );
    if remaining <= LOW_BUDGET_ITERATIONS {
        message.push_str(&format!(
            "\n\nOnly {remaining} iteration(s) remain. Finish now or summarize what is left."
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(max_iterations: usize) -> GuidanceContext<'static> {
        GuidanceContext {
            request: "rename the config module",
            tool_calls_so_far: 4,
            max_iterations,
            completion_marker: "TASK_COMPLETE",
        }
    }

    #[test]
    fn never_due_before_second_iteration() {
        let every = GuidanceInjector::new(1, true);
        assert!(!every.is_due(1));
        assert!(every.is_due(2));
        assert!(every.is_due(3));

        let third = GuidanceInjector::new(3, true);
        let due: Vec<usize> = (1..=10).filter(|n| third.is_due(*n)).collect();
        assert_eq!(due, vec![4, 7, 10]);

        assert!(!GuidanceInjector::new(1, false).is_due(2));
    }

    #[test]
    fn injection_is_recorded_in_response_state() {
        let injector = GuidanceInjector::new(2, true);
        let mut state = ResponseState::new();
        assert!(injector.maybe_inject(&mut state, 2, &ctx(10)).is_none());
        let message = injector
            .maybe_inject(&mut state, 3, &ctx(10))
            .expect("due at iteration 3");
        assert!(message.contains("Progress check before iteration 3 of 10."));
        assert!(message.contains("Tool calls so far: 4"));
        assert!(!message.contains("remain"));
        assert_eq!(state.last_guidance().map(|mark| mark.iteration), Some(3));
    }

    #[test]
    fn warns_when_budget_is_nearly_spent() {
        let injector = GuidanceInjector::new(1, true);
        let mut state = ResponseState::new();
        let message = injector
            .maybe_inject(&mut state, 5, &ctx(5))
            .expect("due");
        assert!(message.contains("Only 1 iteration(s) remain."));
    }
}
