//! Agent runtime and the session state it drives.

pub mod pruning;
pub mod runtime;
pub mod session;

pub use pruning::PrunePolicy;
pub use runtime::AgentRuntime;
pub use session::Session;
