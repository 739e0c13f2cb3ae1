use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::AgentConfig;

const MAX_ITERATIONS_ENV: &str = "HELM_MAX_ITERATIONS";
const MAX_PARALLEL_ENV: &str = "HELM_MAX_PARALLEL";
const TOOL_TIMEOUT_MS_ENV: &str = "HELM_TOOL_TIMEOUT_MS";
const UNPRODUCTIVE_THRESHOLD_ENV: &str = "HELM_UNPRODUCTIVE_THRESHOLD";
const GUIDANCE_INTERVAL_ENV: &str = "HELM_GUIDANCE_INTERVAL";
const MAX_ITERATIONS_KEYS: [&str; 3] = [
    "runner.max_iterations",
    "agent_loop.max_iterations",
    "max_iterations",
];
const MAX_PARALLEL_KEYS: [&str; 3] = [
    "runner.max_parallel",
    "agent_loop.max_parallel",
    "max_parallel",
];
const TOOL_TIMEOUT_MS_KEYS: [&str; 3] = [
    "runner.tool_timeout_ms",
    "agent_loop.tool_timeout_ms",
    "tool_timeout_ms",
];
const UNPRODUCTIVE_THRESHOLD_KEYS: [&str; 2] = [
    "runner.unproductive_threshold",
    "unproductive_threshold",
];
const GUIDANCE_INTERVAL_KEYS: [&str; 2] = ["runner.guidance_interval", "guidance_interval"];

/// Per-session limit overrides, merged into the config before a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitOverrides {
    pub max_iterations: Option<usize>,
    pub max_parallel: Option<usize>,
    pub tool_timeout_ms: Option<u64>,
    pub unproductive_threshold: Option<usize>,
    pub guidance_interval: Option<usize>,
}

impl LimitOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(super) fn apply_to(&self, config: &mut AgentConfig) {
        if let Some(value) = self.max_iterations {
            config.max_iterations = value;
        }
        if let Some(value) = self.max_parallel {
            config.max_parallel = value;
        }
        if let Some(value) = self.tool_timeout_ms {
            config.tool_timeout_ms = value;
        }
        if let Some(value) = self.unproductive_threshold {
            config.unproductive_threshold = value;
        }
        if let Some(value) = self.guidance_interval {
            config.guidance_interval = value;
        }
    }
}

pub(super) fn apply_env(config: &mut AgentConfig) {
    let env = |key: &str| std::env::var(key).ok();
    overlay(config, |field| match field {
        Field::MaxIterations => env(MAX_ITERATIONS_ENV),
        Field::MaxParallel => env(MAX_PARALLEL_ENV),
        Field::ToolTimeoutMs => env(TOOL_TIMEOUT_MS_ENV),
        Field::UnproductiveThreshold => env(UNPRODUCTIVE_THRESHOLD_ENV),
        Field::GuidanceInterval => env(GUIDANCE_INTERVAL_ENV),
    });
}

pub(super) fn apply_metadata(config: &mut AgentConfig, metadata: &HashMap<String, String>) {
    let lookup = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| metadata.get(*key))
            .find(|value| parse_positive(value).is_some())
            .cloned()
    };
    overlay(config, |field| match field {
        Field::MaxIterations => lookup(&MAX_ITERATIONS_KEYS),
        Field::MaxParallel => lookup(&MAX_PARALLEL_KEYS),
        Field::ToolTimeoutMs => lookup(&TOOL_TIMEOUT_MS_KEYS),
        Field::UnproductiveThreshold => lookup(&UNPRODUCTIVE_THRESHOLD_KEYS),
        Field::GuidanceInterval => lookup(&GUIDANCE_INTERVAL_KEYS),
    });
}

#[derive(Clone, Copy)]
enum Field {
    MaxIterations,
    MaxParallel,
    ToolTimeoutMs,
    UnproductiveThreshold,
    GuidanceInterval,
}

/// Apply every field `source` yields a positive value for. Zero and
/// garbage are ignored and leave the current value in place.
fn overlay(config: &mut AgentConfig, source: impl Fn(Field) -> Option<String>) {
    let get = |field| source(field).as_deref().and_then(parse_positive);
    if let Some(value) = get(Field::MaxIterations) {
        config.max_iterations = value as usize;
    }
    if let Some(value) = get(Field::MaxParallel) {
        config.max_parallel = value as usize;
    }
    if let Some(value) = get(Field::ToolTimeoutMs) {
        config.tool_timeout_ms = value;
    }
    if let Some(value) = get(Field::UnproductiveThreshold) {
        config.unproductive_threshold = value as usize;
    }
    if let Some(value) = get(Field::GuidanceInterval) {
        config.guidance_interval = value as usize;
    }
}

fn parse_positive(value: &str) -> Option<u64> {
    let parsed = value.trim().parse::<u64>().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}
