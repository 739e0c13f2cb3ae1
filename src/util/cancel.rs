//! Run-wide cancellation signal.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// A trip-once cancellation flag shared by every suspension point of a run.
///
/// Cloning is cheap and all clones observe the same state. Child tokens
/// handed to tools are cancelled when the signal trips.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Returns `true` only for the call that tripped it.
    pub fn trip(&self, reason: impl Into<String>) -> bool {
        let first = self.reason.set(reason.into()).is_ok();
        self.token.cancel();
        if first {
            tracing::debug!(reason = self.reason().unwrap_or_default(), "cancellation tripped");
        }
        first
    }

    pub fn is_tripped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given by the first `trip` call.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the signal trips.
    pub async fn tripped(&self) {
        self.token.cancelled().await
    }

    /// A token cancelled together with this signal, for handing to tools.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
