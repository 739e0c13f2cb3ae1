//! Shared test helpers: a scripted model and an in-memory workspace.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use helm::prelude::*;

/// Replays one scripted turn per model call, then keeps answering with the
/// last one.
pub struct ScriptedModel {
    turns: Mutex<Vec<Vec<ModelStreamEvent>>>,
    pub requests: Mutex<Vec<ModelRequest>>,
    hang_after_script: bool,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Vec<ModelStreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns),
            requests: Mutex::new(Vec::new()),
            hang_after_script: false,
        })
    }

    /// Like [`ScriptedModel::new`], but every stream stays open after its
    /// events instead of ending.
    pub fn hanging(turns: Vec<Vec<ModelStreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns),
            requests: Mutex::new(Vec::new()),
            hang_after_script: true,
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: &ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<ModelStream> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let events = {
            let mut turns = self.turns.lock().expect("turns lock");
            if turns.len() > 1 {
                turns.remove(0)
            } else {
                turns.first().cloned().unwrap_or_default()
            }
        };
        let events = stream::iter(events.into_iter().map(Ok));
        if self.hang_after_script {
            Ok(events.chain(stream::pending()).boxed())
        } else {
            Ok(events.boxed())
        }
    }
}

pub fn text(text: &str) -> ModelStreamEvent {
    ModelStreamEvent::text(text)
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ModelStreamEvent {
    ModelStreamEvent::tool_call(id, name, arguments)
}

pub fn done_turn(answer: &str) -> Vec<ModelStreamEvent> {
    vec![
        text(&format!("{answer}\nTASK_COMPLETE")),
        ModelStreamEvent::Done,
    ]
}

/// Files shared by the workspace tools.
pub type Files = Arc<Mutex<BTreeMap<String, String>>>;

pub fn files(entries: &[(&str, &str)]) -> Files {
    Arc::new(Mutex::new(
        entries
            .iter()
            .map(|(path, body)| (path.to_string(), body.to_string()))
            .collect(),
    ))
}

fn path_params() -> ToolParameters {
    ToolParameters::object()
        .string("filepath", "Path relative to the workspace root", true)
        .build()
}

/// `read_file`, `write_file` and `bash` over an in-memory file map.
pub fn workspace_tools(files: &Files) -> ToolRegistry {
    let read_files = files.clone();
    let read: Arc<dyn Tool> = Arc::new(AgentTool::new(
        "read_file",
        "Read a file",
        ToolClass::ReadOnly,
        path_params(),
        move |args, _ctx| {
            let files = read_files.clone();
            async move {
                let path = args.require_str("filepath")?.to_string();
                let files = files.lock().expect("files lock");
                match files.get(&path) {
                    Some(body) => Ok(json!({ "content": body })),
                    None => Err(HelmError::ToolExecution {
                        tool_name: "read_file".into(),
                        message: format!("{path}: no such file"),
                    }),
                }
            }
        },
    ));

    let write_files = files.clone();
    let preview_files = files.clone();
    let write: Arc<dyn Tool> = Arc::new(
        AgentTool::new(
            "write_file",
            "Overwrite a file",
            ToolClass::Write,
            ToolParameters::object()
                .string("filepath", "Path relative to the workspace root", true)
                .string("content", "New file content", true)
                .build(),
            move |args, _ctx| {
                let files = write_files.clone();
                async move {
                    let path = args.require_str("filepath")?.to_string();
                    let content = args.require_str("content")?.to_string();
                    files
                        .lock()
                        .expect("files lock")
                        .insert(path.clone(), content);
                    Ok(json!({ "written": path }))
                }
            },
        )
        .with_preview(move |args| {
            let path = args.get_str("filepath")?;
            let before = preview_files
                .lock()
                .expect("files lock")
                .get(path)
                .cloned()
                .unwrap_or_default();
            Some(format!("- {before}\n+ {}", args.get_str("content")?))
        }),
    );

    let bash: Arc<dyn Tool> = Arc::new(AgentTool::new(
        "bash",
        "Run a shell command",
        ToolClass::Execute,
        ToolParameters::object()
            .string("command", "Command line", true)
            .build(),
        |args, _ctx| async move {
            let command = args.require_str("command")?.to_string();
            Ok(json!({ "exit_code": 0, "stdout": format!("ran {command}") }))
        },
    ));

    ToolRegistry::from_tools([read, write, bash]).expect("workspace registry")
}

/// Collects every emitted run event.
pub fn event_log() -> (RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: RunEventSink = Arc::new(move |event: RunEvent| {
        sink_events.lock().expect("events lock").push(event);
    });
    (sink, events)
}

pub fn quiet_config() -> AgentConfig {
    AgentConfig::builder()
        .max_iterations(8)
        .guidance_enabled(false)
        .max_parallel(4)
        .tool_timeout_ms(2_000)
        .stream_idle_timeout_ms(2_000)
        .retry(helm::util::retry::RetryPolicy::none())
        .build()
}
