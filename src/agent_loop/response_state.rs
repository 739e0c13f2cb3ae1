//! Per-run progress bookkeeping shared by the productivity and guidance
//! checks.

use chrono::{DateTime, Utc};

/// When guidance was last injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuidanceMark {
    pub iteration: usize,
    pub at: DateTime<Utc>,
}

/// Reset at the start of every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseState {
    completion_detected: bool,
    consecutive_unproductive: usize,
    last_guidance: Option<GuidanceMark>,
    last_fingerprint: Option<String>,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn completion_detected(&self) -> bool {
        self.completion_detected
    }

    pub fn set_completion_detected(&mut self) {
        self.completion_detected = true;
    }

    pub fn consecutive_unproductive(&self) -> usize {
        self.consecutive_unproductive
    }

    pub(crate) fn record_unproductive(&mut self) -> usize {
        self.consecutive_unproductive += 1;
        self.consecutive_unproductive
    }

    pub(crate) fn reset_unproductive(&mut self) {
        self.consecutive_unproductive = 0;
    }

    pub fn last_guidance(&self) -> Option<GuidanceMark> {
        self.last_guidance
    }

    pub(crate) fn mark_guidance(&mut self, iteration: usize) {
        self.last_guidance = Some(GuidanceMark {
            iteration,
            at: Utc::now(),
        });
    }

    pub(crate) fn last_fingerprint(&self) -> Option<&str> {
        self.last_fingerprint.as_deref()
    }

    pub(crate) fn set_fingerprint(&mut self, fingerprint: Option<String>) {
        if fingerprint.is_some() {
            self.last_fingerprint = fingerprint;
        }
    }
}
