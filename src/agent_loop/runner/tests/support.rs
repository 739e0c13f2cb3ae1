use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent_loop::events::{AgentEvent, RunEvent};
use crate::config::AgentConfig;
use crate::provider::{ModelRequest, ModelStream};
use crate::tools::{AgentTool, Tool, ToolClass, ToolParameters};
use crate::types::ModelStreamEvent;
use crate::util::retry::RetryPolicy;

/// One scripted model response.
#[derive(Clone)]
pub(super) enum Reply {
    Events(Vec<ModelStreamEvent>),
    /// Emits the events, then never yields again.
    Hang(Vec<ModelStreamEvent>),
    /// `stream` itself fails.
    Fail(String),
}

/// Replays `replies` in order, repeating the last one once exhausted.
pub(super) struct StubModel {
    replies: Vec<Reply>,
    calls: AtomicUsize,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

#[async_trait]
impl ModelClient for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn stream(
        &self,
        request: &ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<ModelStream, HelmError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or(Reply::Events(Vec::new()));
        match reply {
            Reply::Events(events) => Ok(stream::iter(events.into_iter().map(Ok)).boxed()),
            Reply::Hang(events) => Ok(stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Reply::Fail(message) => Err(HelmError::Model(message)),
        }
    }
}

pub(super) type Requests = Arc<Mutex<Vec<ModelRequest>>>;
pub(super) type ToolLog = Arc<Mutex<Vec<String>>>;

pub(super) fn stub_model(replies: Vec<Reply>) -> (Arc<dyn ModelClient>, Requests) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let model = StubModel {
        replies,
        calls: AtomicUsize::new(0),
        requests: requests.clone(),
    };
    (Arc::new(model), requests)
}

pub(super) fn text(text: &str) -> ModelStreamEvent {
    ModelStreamEvent::text(text)
}

pub(super) fn call(id: &str, name: &str, args: serde_json::Value) -> ModelStreamEvent {
    ModelStreamEvent::tool_call(id, name, args)
}

/// A reply that declares the task complete.
pub(super) fn complete(answer: &str) -> Reply {
    Reply::Events(vec![
        text(&format!("{answer}\nTASK_COMPLETE")),
        ModelStreamEvent::Done,
    ])
}

pub(super) fn test_config() -> AgentConfig {
    AgentConfig::builder()
        .max_iterations(6)
        .guidance_enabled(false)
        .max_parallel(4)
        .tool_timeout_ms(2_000)
        .stream_idle_timeout_ms(2_000)
        .retry(RetryPolicy::none())
        .build()
}

#[derive(Default)]
pub(super) struct ConcurrencyTracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ConcurrencyTracker {
    fn enter(&self) {
        let active_now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active_now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(super) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

fn push_log(log: &ToolLog, entry: String) {
    if let Ok(mut guard) = log.lock() {
        guard.push(entry);
    }
}

/// A tool that sleeps for `delay_ms` (argument) and logs start/end by call id.
pub(super) fn tracked_tool(
    name: &str,
    class: ToolClass,
    log: ToolLog,
    tracker: Arc<ConcurrencyTracker>,
) -> Arc<dyn Tool> {
    let tool_name = name.to_string();
    Arc::new(AgentTool::new(
        name,
        "tracked test tool",
        class,
        ToolParameters::empty(),
        move |args, ctx| {
            let log = log.clone();
            let tracker = tracker.clone();
            let tool_name = tool_name.clone();
            async move {
                let delay = args.get_u64("delay_ms").unwrap_or(10);
                tracker.enter();
                push_log(&log, format!("start:{}", ctx.call_id));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                push_log(&log, format!("end:{}", ctx.call_id));
                tracker.exit();
                Ok(json!({ "tool": tool_name, "call_id": ctx.call_id }))
            }
        },
    ))
}

pub(super) fn registry(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
    ToolRegistry::from_tools(tools).expect("registry")
}

pub(super) fn capture_events() -> (RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::<RunEvent>::new()));
    let sink_events = events.clone();
    let sink: RunEventSink = Arc::new(move |event: RunEvent| {
        if let Ok(mut guard) = sink_events.lock() {
            guard.push(event);
        }
    });
    (sink, events)
}

pub(super) fn event_payloads(events: &Arc<Mutex<Vec<RunEvent>>>) -> Vec<AgentEvent> {
    events
        .lock()
        .expect("event lock")
        .iter()
        .map(|event| event.event.clone())
        .collect()
}

pub(super) fn log_entries(log: &ToolLog) -> Vec<String> {
    log.lock().expect("log lock").clone()
}
