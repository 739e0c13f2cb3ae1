//! Tool system: the [`Tool`] trait, safety classes and the registry.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::{InvokeOptions, ToolRegistry};
pub use tool::{AgentTool, Tool, ToolContext};
pub use types::{ToolClass, ToolParameters, ToolSchema};
