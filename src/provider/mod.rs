//! Model client boundary.
//!
//! The engine only needs a cancellable stream of [`ModelStreamEvent`]s for a
//! given history and tool list. Wire protocols live behind this trait.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::HelmError;
use crate::tools::ToolSchema;
use crate::types::{ModelStreamEvent, Turn};

/// A request sent to a model client.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSchema>,
}

/// Stream returned by [`ModelClient::stream`].
pub type ModelStream = BoxStream<'static, Result<ModelStreamEvent, HelmError>>;

/// Core trait implemented by model clients.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Client name, used in logs.
    fn name(&self) -> &str;

    /// Open a streamed response for `request`.
    ///
    /// The engine stops polling the stream once `cancel` fires; clients
    /// holding network resources should also watch it.
    async fn stream(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<ModelStream, HelmError>;
}
