//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{ToolClass, ToolParameters};
use crate::error::HelmError;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Id of the call being served.
    pub call_id: String,
    /// 1-based attempt number when the registry retries transient failures.
    pub attempt: u32,
    /// Cancelled when the run is cancelled or the call times out.
    pub cancel: CancellationToken,
}

/// Core tool trait; implement to expose a capability to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Safety class. Read once at registration.
    fn class(&self) -> ToolClass;

    /// Optional diff or preview shown when confirmation is requested.
    fn preview(&self, _args: &ToolArguments) -> Option<String> {
        None
    }

    /// Execute the tool with parsed arguments.
    ///
    /// Long-running tools should watch `ctx.cancel`.
    async fn invoke(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HelmError>> + Send>>
    + Send
    + Sync;

type PreviewFn = dyn Fn(&ToolArguments) -> Option<String> + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    class: ToolClass,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
    preview: Option<Arc<PreviewFn>>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        class: ToolClass,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, HelmError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            class,
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
            preview: None,
        }
    }

    /// Attach a preview renderer used by confirmation prompts.
    pub fn with_preview<P>(mut self, preview: P) -> Self
    where
        P: Fn(&ToolArguments) -> Option<String> + Send + Sync + 'static,
    {
        self.preview = Some(Arc::new(preview));
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn class(&self) -> ToolClass {
        self.class
    }

    fn preview(&self, args: &ToolArguments) -> Option<String> {
        self.preview.as_ref().and_then(|render| render(args))
    }

    async fn invoke(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}
