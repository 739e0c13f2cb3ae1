//! Helm: agent orchestration and tool execution for coding assistants.
//!
//! Drives a multi-turn loop between a language model and a set of tools
//! until the model declares the task complete, the iteration budget runs
//! out, or the caller cancels. Read-only tool calls are batched and run
//! concurrently; write and execute calls run one at a time behind an
//! authorization gate that can ask the user first.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use helm::prelude::*;
//!
//! # async fn example(model: Arc<dyn ModelClient>, tools: ToolRegistry) -> helm::error::Result<()> {
//! let runtime = AgentRuntime::new(model, tools, AgentConfig::from_env())?;
//! let mut session = Session::new();
//! let result = runtime
//!     .run(&RunRequest::new("Fix the failing parser test"), &mut session, &CancellationSignal::new())
//!     .await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;
