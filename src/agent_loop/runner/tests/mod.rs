use super::*;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::{timeout, Duration};

use crate::agent_loop::events::AgentEvent;
use crate::agent_loop::productivity::StallReason;
use crate::agent_loop::types::{CompletionKind, FallbackReason};
use crate::tools::ToolClass;
use crate::types::{ModelStreamEvent, Role, ToolCall, Turn};

mod support;

use support::{
    call, capture_events, complete, event_payloads, log_entries, registry, stub_model,
    test_config, tracked_tool, ConcurrencyTracker, Reply, ToolLog,
};

fn read_tool_runner(replies: Vec<Reply>) -> (LoopRunner, support::Requests) {
    let (model, requests) = stub_model(replies);
    let log = ToolLog::default();
    let tracker = Arc::new(ConcurrencyTracker::default());
    let tools = registry(vec![tracked_tool("read_file", ToolClass::ReadOnly, log, tracker)]);
    (LoopRunner::new(model, tools), requests)
}

async fn run_to_end(
    runner: &LoopRunner,
    config: &crate::config::AgentConfig,
    session: &mut Session,
) -> AgentResult {
    let signal = CancellationSignal::new();
    timeout(
        Duration::from_secs(5),
        runner.run(&RunRequest::new("fix the parser"), config, session, &signal),
    )
    .await
    .expect("run timed out")
}

fn read_call(id: &str) -> ModelStreamEvent {
    call(id, "read_file", json!({ "filepath": "src/lib.rs", "delay_ms": 5 }))
}

fn last_system_text(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::System)
        .map(Turn::text)
}

#[tokio::test]
async fn marker_declares_completion_and_is_stripped() {
    let (runner, _requests) = read_tool_runner(vec![complete("Parser fixed.")]);
    let mut session = Session::new();
    let result = run_to_end(&runner, &test_config(), &mut session).await;

    assert_eq!(result.completion, CompletionKind::Declared);
    assert_eq!(result.text, "Parser fixed.");
    assert_eq!(result.iterations, 1);
    assert_eq!(session.last_assistant_text().as_deref(), Some("Parser fixed."));
    assert_eq!(session.iteration(), 1);
}

#[tokio::test]
async fn correction_is_injected_once_per_empty_iteration() {
    let (runner, requests) = read_tool_runner(vec![
        Reply::Events(vec![read_call("r1"), ModelStreamEvent::Done]),
        Reply::Events(vec![ModelStreamEvent::Done]),
        Reply::Events(vec![ModelStreamEvent::Done]),
        complete("Done."),
    ]);
    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let mut session = Session::new();
    let result = run_to_end(&runner, &test_config(), &mut session).await;
    assert_eq!(result.completion, CompletionKind::Declared);

    let requests = requests.lock().expect("requests lock");
    assert_eq!(requests.len(), 4);
    assert_eq!(last_system_text(&requests[1].turns), None);
    let correction = last_system_text(&requests[2].turns).expect("correction before iteration 3");
    assert!(correction.starts_with("Your previous response was empty."));
    assert!(correction.contains("Recent tools: read_file"));
    assert!(correction.contains("Attempt: 3"));
    let corrections_before_4 = requests[3]
        .turns
        .iter()
        .filter(|turn| turn.role == Role::System)
        .count();
    assert_eq!(corrections_before_4, 2);

    let injected: Vec<(usize, StallReason)> = event_payloads(&events)
        .into_iter()
        .filter_map(|event| match event {
            AgentEvent::CorrectionInjected { iteration, reason } => Some((iteration, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        injected,
        vec![(3, StallReason::Empty), (4, StallReason::Empty)]
    );
}

#[tokio::test]
async fn iteration_limit_ends_in_fallback_not_declared() {
    let (runner, _requests) = read_tool_runner(vec![Reply::Events(vec![
        text_event("Still reading."),
        read_call("r1"),
        ModelStreamEvent::Done,
    ])]);
    let config = crate::config::AgentConfig {
        max_iterations: 3,
        ..test_config()
    };
    let mut session = Session::new();
    let result = run_to_end(&runner, &config, &mut session).await;

    assert_eq!(result.completion, CompletionKind::Fallback);
    assert!(result.is_best_effort());
    assert_eq!(result.iterations, 3);
    assert_eq!(result.tool_calls, 3);
    assert!(result.text.starts_with("Reached the iteration limit (3)"));
    assert!(result
        .text
        .contains("3 iteration(s), 3 tool call(s): 3 succeeded, 0 failed, 0 rejected."));
    assert!(result.fallback.is_some());
}

#[tokio::test]
async fn repeated_call_ids_are_rekeyed() {
    let (runner, _requests) = read_tool_runner(vec![
        Reply::Events(vec![read_call("r1"), read_call("r1"), ModelStreamEvent::Done]),
        complete("ok"),
    ]);
    let mut session = Session::new();
    run_to_end(&runner, &test_config(), &mut session).await;

    let ids: Vec<String> = session
        .turns()
        .iter()
        .flat_map(Turn::tool_calls)
        .map(|call| call.id.clone())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "r1");
    assert_ne!(ids[1], "r1");
    assert!(session.unanswered_tool_calls().is_empty());
}

#[tokio::test]
async fn consecutive_model_failures_fall_back() {
    let (runner, _requests) = read_tool_runner(vec![Reply::Fail("connection refused".into())]);
    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let config = crate::config::AgentConfig {
        max_model_failures: 2,
        ..test_config()
    };
    let mut session = Session::new();
    let result = run_to_end(&runner, &config, &mut session).await;

    assert_eq!(result.completion, CompletionKind::Fallback);
    assert_eq!(result.iterations, 2);
    assert!(result.text.starts_with("The model failed 2 times in a row"));
    let failures = event_payloads(&events)
        .iter()
        .filter(|event| matches!(event, AgentEvent::ModelFailed { .. }))
        .count();
    assert_eq!(failures, 2);
    assert!(matches!(
        event_payloads(&events).last(),
        Some(AgentEvent::Fallback {
            reason: FallbackReason::ModelUnavailable { failures: 2, .. },
            ..
        })
    ));
}

#[tokio::test]
async fn text_only_answer_completes_when_marker_is_optional() {
    let (runner, _requests) = read_tool_runner(vec![Reply::Events(vec![
        text_event("The parser was missing a semicolon check."),
        ModelStreamEvent::Done,
    ])]);
    let config = crate::config::AgentConfig {
        require_completion_marker: false,
        ..test_config()
    };
    let mut session = Session::new();
    let result = run_to_end(&runner, &config, &mut session).await;
    assert_eq!(result.completion, CompletionKind::Declared);
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn guidance_is_skipped_when_a_correction_goes_in() {
    let (runner, _requests) = read_tool_runner(vec![
        Reply::Events(vec![read_call("r1"), ModelStreamEvent::Done]),
        Reply::Events(vec![ModelStreamEvent::Done]),
        complete("Done."),
    ]);
    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let config = crate::config::AgentConfig {
        guidance_enabled: true,
        guidance_interval: 1,
        ..test_config()
    };
    let mut session = Session::new();
    run_to_end(&runner, &config, &mut session).await;

    let boundary: Vec<String> = event_payloads(&events)
        .into_iter()
        .filter_map(|event| match event {
            AgentEvent::GuidanceInjected { iteration } => Some(format!("guidance:{iteration}")),
            AgentEvent::CorrectionInjected { iteration, .. } => {
                Some(format!("correction:{iteration}"))
            }
            _ => None,
        })
        .collect();
    assert_eq!(boundary, vec!["guidance:2", "correction:3"]);
}

#[tokio::test]
async fn history_orphans_are_answered_before_the_first_request() {
    let (runner, requests) = read_tool_runner(vec![complete("ok")]);
    let mut orphan = ToolCall::new("old-1", "read_file", json!({}));
    orphan.originating_turn = 1;
    let mut session = Session::with_history(vec![
        Turn::user("earlier request"),
        Turn::assistant_with_tool_calls("", vec![orphan]),
    ]);
    run_to_end(&runner, &test_config(), &mut session).await;

    let requests = requests.lock().expect("requests lock");
    let first = &requests[0];
    let answered = first
        .turns
        .iter()
        .flat_map(Turn::tool_results)
        .any(|result| result.call_id == "old-1");
    assert!(answered);
    assert_eq!(first.turns.last().map(|turn| turn.role), Some(Role::User));
}

#[tokio::test]
async fn events_carry_increasing_sequence_numbers() {
    let (runner, _requests) = read_tool_runner(vec![
        Reply::Events(vec![read_call("r1"), ModelStreamEvent::Done]),
        complete("ok"),
    ]);
    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let mut session = Session::new();
    let result = run_to_end(&runner, &test_config(), &mut session).await;

    let events = events.lock().expect("event lock");
    let seqs: Vec<u64> = events.iter().map(|event| event.seq).collect();
    assert_eq!(seqs.first(), Some(&1));
    assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + 1));
    assert!(events.iter().all(|event| event.run_id == events[0].run_id));
    assert!(matches!(events[0].event, AgentEvent::RunStarted { .. }));
    assert_eq!(
        events.last().and_then(|event| event.event.completion()),
        Some(result.completion)
    );
}

fn text_event(text: &str) -> ModelStreamEvent {
    support::text(text)
}
