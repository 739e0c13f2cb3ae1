//! Run configuration (layered: defaults < TOML < env < request metadata).
//!
//! An [`AgentConfig`] is fixed for the duration of a run. Session-level
//! [`LimitOverrides`] are merged into a copy before the run starts.

pub mod limits;

pub use limits::LimitOverrides;

use std::collections::HashMap;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::agent::PrunePolicy;
use crate::error::HelmError;
use crate::tools::ToolRegistry;
use crate::types::ModelPricing;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_MAX_ITERATIONS: usize = 40;
pub const DEFAULT_UNPRODUCTIVE_THRESHOLD: usize = 1;
pub const DEFAULT_GUIDANCE_INTERVAL: usize = 5;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_MODEL_FAILURES: usize = 3;
pub const DEFAULT_COMPLETION_MARKER: &str = "TASK_COMPLETE";

/// How much detail the fallback summary carries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FallbackVerbosity {
    Minimal,
    #[default]
    Normal,
    Detailed,
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model calls allowed before the fallback summary takes over.
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,
    /// Consecutive stalled iterations before a correction is injected.
    #[builder(default = DEFAULT_UNPRODUCTIVE_THRESHOLD)]
    pub unproductive_threshold: usize,
    /// Iterations between self-check prompts.
    #[builder(default = DEFAULT_GUIDANCE_INTERVAL)]
    pub guidance_interval: usize,
    #[builder(default = true)]
    pub guidance_enabled: bool,
    /// Upper bound on concurrently running read-only calls.
    #[builder(default = default_max_parallel())]
    pub max_parallel: usize,
    #[builder(default = DEFAULT_TOOL_TIMEOUT_MS)]
    pub tool_timeout_ms: u64,
    #[builder(default = DEFAULT_STREAM_IDLE_TIMEOUT_MS)]
    pub stream_idle_timeout_ms: u64,
    /// Retry policy for transient tool and model-connect failures.
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Clearing of old tool output before each model request.
    #[builder(default)]
    pub pruning: PrunePolicy,
    /// Consecutive failed model iterations before the run falls back.
    #[builder(default = DEFAULT_MAX_MODEL_FAILURES)]
    pub max_model_failures: usize,
    #[builder(default = DEFAULT_COMPLETION_MARKER.to_string(), into)]
    pub completion_marker: String,
    /// When false, a substantive text-only answer also completes the run.
    #[builder(default = true)]
    pub require_completion_marker: bool,
    /// Tools the active template allows without confirmation.
    #[builder(default)]
    pub allowed_tools: Vec<String>,
    #[builder(default)]
    pub fallback_verbosity: FallbackVerbosity,
    pub pricing: Option<ModelPricing>,
    #[builder(into)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Host parallelism, or 4 when it cannot be determined.
pub fn default_max_parallel() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AgentConfig {
    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, HelmError> {
        Ok(toml::from_str(source)?)
    }

    /// Defaults overlaid with `HELM_*` environment variables (and `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `HELM_*` environment variables onto this config.
    pub fn apply_env(&mut self) {
        limits::apply_env(self);
    }

    /// Overlay request metadata (`runner.max_iterations` and friends).
    pub fn apply_metadata(&mut self, metadata: &HashMap<String, String>) {
        limits::apply_metadata(self, metadata);
    }

    /// A copy with session overrides applied.
    pub fn merged_with(&self, overrides: &LimitOverrides) -> Self {
        let mut merged = self.clone();
        overrides.apply_to(&mut merged);
        merged
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    /// Fail fast on limits that cannot drive a run and on tool names that
    /// the registry does not know.
    pub fn validate(&self, registry: &ToolRegistry) -> Result<(), HelmError> {
        let limits = [
            ("max_iterations", self.max_iterations as u64),
            ("unproductive_threshold", self.unproductive_threshold as u64),
            ("guidance_interval", self.guidance_interval as u64),
            ("max_parallel", self.max_parallel as u64),
            ("tool_timeout_ms", self.tool_timeout_ms),
            ("stream_idle_timeout_ms", self.stream_idle_timeout_ms),
            ("max_model_failures", self.max_model_failures as u64),
            ("retry.max_attempts", u64::from(self.retry.max_attempts)),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(HelmError::Configuration(format!(
                "{name} must be greater than zero"
            )));
        }
        if self.completion_marker.trim().is_empty() {
            return Err(HelmError::Configuration(
                "completion_marker must not be empty".into(),
            ));
        }
        if let Some(unknown) = self
            .allowed_tools
            .iter()
            .find(|name| !registry.contains(name))
        {
            return Err(HelmError::UnknownTool(format!(
                "allowed_tools references unregistered tool '{unknown}'"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::tools::{AgentTool, Tool, ToolClass, ToolParameters};

    fn registry() -> ToolRegistry {
        let grep: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "grep",
            "search",
            ToolClass::ReadOnly,
            ToolParameters::empty(),
            |_args, _ctx| async move { Ok(json!([])) },
        ));
        ToolRegistry::from_tools([grep]).expect("registry")
    }

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.completion_marker, "TASK_COMPLETE");
        assert!(config.max_parallel >= 1);
        config.validate(&registry()).expect("defaults validate");
    }

    #[test]
    fn toml_overrides_only_named_keys() {
        let config = AgentConfig::from_toml_str(
            r#"
            max_iterations = 12
            fallback_verbosity = "detailed"
            allowed_tools = ["grep"]

            [retry]
            max_attempts = 5
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.max_iterations, 12);
        assert_eq!(config.fallback_verbosity, FallbackVerbosity::Detailed);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.unproductive_threshold, DEFAULT_UNPRODUCTIVE_THRESHOLD);
        config.validate(&registry()).expect("valid");
    }

    #[test]
    fn zero_limits_fail_validation() {
        let config = AgentConfig::builder().max_parallel(0).build();
        let err = config.validate(&registry()).expect_err("zero fan-out");
        assert!(err.to_string().contains("max_parallel"));

        let config = AgentConfig::builder().completion_marker("  ").build();
        assert!(config.validate(&registry()).is_err());
    }

    #[test]
    fn unknown_allowed_tool_fails_validation() {
        let config = AgentConfig::builder()
            .allowed_tools(vec!["write_file".to_string()])
            .build();
        let err = config.validate(&registry()).expect_err("unregistered");
        assert!(matches!(err, HelmError::UnknownTool(_)));
    }

    #[test]
    fn session_overrides_apply_to_a_copy() {
        let base = AgentConfig::default();
        let merged = base.merged_with(&LimitOverrides {
            max_iterations: Some(3),
            ..Default::default()
        });
        assert_eq!(merged.max_iterations, 3);
        assert_eq!(base.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
