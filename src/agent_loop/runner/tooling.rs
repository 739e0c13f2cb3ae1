use std::sync::Arc;

use futures::stream::{FuturesOrdered, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::tools::{InvokeOptions, ToolRegistry};
use crate::types::{ToolCall, ToolResult};
use crate::util::cancel::CancellationSignal;

pub(super) fn canceled_tool_result(call: &ToolCall) -> ToolResult {
    ToolResult::error(
        call,
        format!("Tool '{}' was cancelled before completing", call.name),
        0,
    )
}

fn join_failure_result(call: &ToolCall, err: JoinError) -> ToolResult {
    if err.is_cancelled() {
        return canceled_tool_result(call);
    }
    tracing::warn!(tool = %call.name, call_id = %call.id, error = %err, "tool task panicked");
    ToolResult::error(call, format!("Tool '{}' panicked: {err}", call.name), 0)
}

/// Wait for a spawned tool, giving up as soon as `cancel` trips.
///
/// A tool blocking its worker thread never reaches the cancellation check
/// inside `invoke`, so the join itself has to race the signal. The task is
/// aborted and any output it produces later is discarded.
async fn join_or_cancel(
    call: &ToolCall,
    mut handle: JoinHandle<ToolResult>,
    cancel: &CancellationSignal,
) -> ToolResult {
    tokio::select! {
        biased;
        _ = cancel.tripped() => {
            handle.abort();
            canceled_tool_result(call)
        }
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(err) => join_failure_result(call, err),
        },
    }
}

/// Runs tool calls on spawned tasks so the loop stays responsive.
pub(super) struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    options: InvokeOptions,
    max_parallel: usize,
}

impl ToolExecutor {
    pub(super) fn new(registry: Arc<ToolRegistry>, options: InvokeOptions, max_parallel: usize) -> Self {
        Self {
            registry,
            options,
            max_parallel: max_parallel.max(1),
        }
    }

    pub(super) fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `calls` concurrently, at most `max_parallel` at a time.
    ///
    /// Results come back in submission order, one per call, whatever order
    /// the calls finish in. A failing or panicking call does not affect its
    /// siblings.
    pub(super) async fn run_batch(&self, calls: Vec<ToolCall>) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut pending = FuturesOrdered::new();
        for call in calls {
            let registry = self.registry.clone();
            let options = self.options.clone();
            let semaphore = semaphore.clone();
            let task_call = call.clone();
            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = options.cancel.tripped() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                // A tripped signal makes invoke return a cancelled result
                // without touching the tool.
                registry.invoke(&task_call, &options).await
            });
            let cancel = self.options.cancel.clone();
            pending.push_back(async move { join_or_cancel(&call, handle, &cancel).await });
        }

        pending.collect().await
    }

    /// Run a single write, execute or unknown call on its own.
    pub(super) async fn run_one(&self, call: &ToolCall) -> ToolResult {
        let registry = self.registry.clone();
        let options = self.options.clone();
        let task_call = call.clone();
        let handle = tokio::spawn(async move { registry.invoke(&task_call, &options).await });
        join_or_cancel(call, handle, &self.options.cancel).await
    }
}
