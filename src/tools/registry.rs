//! Tool registry: name lookup, safety classification and the invoke
//! boundary that turns every tool outcome into a [`ToolResult`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext};
use super::types::{ToolClass, ToolSchema};
use super::validation::validate_arguments;
use crate::error::HelmError;
use crate::types::{ToolCall, ToolResult};
use crate::util::cancel::CancellationSignal;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

static TOOL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,63}$").expect("tool name regex must compile")
});

/// Per-invocation limits.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub cancel: CancellationSignal,
}

#[derive(Clone)]
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    class: ToolClass,
}

/// Tools available to a run, resolved once at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a set of tools, failing on the first bad entry.
    pub fn from_tools<I>(tools: I) -> Result<Self, HelmError>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. Names must be unique and identifier-like.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), HelmError> {
        let name = tool.name().to_string();
        if !TOOL_NAME_RE.is_match(&name) {
            return Err(HelmError::Configuration(format!(
                "invalid tool name '{name}'"
            )));
        }
        if self.by_name.contains_key(&name) {
            return Err(HelmError::Configuration(format!(
                "tool '{name}' registered twice"
            )));
        }
        let class = tool.class();
        self.by_name.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { tool, class });
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, HelmError> {
        self.register(tool)?;
        Ok(self)
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn classify(&self, name: &str) -> Option<ToolClass> {
        self.entry(name).map(|entry| entry.class)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entry(name).map(|entry| entry.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|entry| entry.tool.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas advertised to the model, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|entry| ToolSchema {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                parameters: entry.tool.parameters().schema.clone(),
            })
            .collect()
    }

    /// Preview text for a confirmation prompt.
    pub fn preview(&self, call: &ToolCall) -> Option<String> {
        let entry = self.entry(&call.name)?;
        entry
            .tool
            .preview(&ToolArguments::new(call.arguments.clone()))
    }

    /// Invoke the tool named by `call`.
    ///
    /// Never fails: unknown tools, invalid arguments, tool errors, timeouts
    /// and cancellation all come back as an error-status [`ToolResult`].
    pub async fn invoke(&self, call: &ToolCall, options: &InvokeOptions) -> ToolResult {
        let started = Instant::now();
        let Some(entry) = self.entry(&call.name) else {
            return ToolResult::error(call, format!("Tool '{}' not found", call.name), 0);
        };
        if let Err(message) = validate_arguments(&call.arguments, &entry.tool.parameters().schema)
        {
            return ToolResult::error(
                call,
                format!("Invalid arguments for tool '{}': {message}", call.name),
                0,
            );
        }

        let args = ToolArguments::new(call.arguments.clone());
        let attempts = options.retry.execute(&options.cancel, |attempt| {
            let tool = entry.tool.clone();
            let args = args.clone();
            let ctx = ToolContext {
                call_id: call.id.clone(),
                attempt,
                cancel: options.cancel.child_token(),
            };
            let timeout = options.timeout;
            async move {
                let result = with_timeout(timeout, tool.invoke(&args, &ctx)).await;
                if matches!(result, Err(HelmError::Timeout(_))) {
                    ctx.cancel.cancel();
                }
                result
            }
        });

        let outcome = tokio::select! {
            biased;
            _ = options.cancel.tripped() => Err(HelmError::Canceled),
            result = attempts => result,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => ToolResult::success(call, payload, duration_ms),
            Err(err) => {
                tracing::debug!(tool = %call.name, call_id = %call.id, error = %err, "tool failed");
                ToolResult::error(call, failure_message(&call.name, &err), duration_ms)
            }
        }
    }
}

fn failure_message(tool_name: &str, err: &HelmError) -> String {
    match err {
        HelmError::Canceled => format!("Tool '{tool_name}' was cancelled before completing"),
        HelmError::Timeout(ms) => format!("Tool '{tool_name}' timed out after {ms}ms"),
        HelmError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|entry| (entry.tool.name(), entry.class)))
            .finish()
    }
}
