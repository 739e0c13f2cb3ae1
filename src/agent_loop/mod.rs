//! Agent loop primitives (runs, events, approvals, enforcement).

pub mod approvals;
pub mod events;
pub mod fallback;
pub mod guidance;
pub mod productivity;
pub mod response_state;
pub mod runner;
pub mod types;

pub use approvals::*;
pub use events::*;
pub use fallback::{FallbackResponse, FallbackSynthesizer, ToolRecord};
pub use productivity::StallReason;
pub use runner::*;
pub use types::*;
