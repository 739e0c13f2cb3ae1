//! Typed access to the JSON arguments of a tool call.

use serde::de::DeserializeOwned;

use crate::error::HelmError;

/// Parsed tool arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    raw: serde_json::Value,
}

impl ToolArguments {
    pub fn new(raw: serde_json::Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(|v| v.as_str())
    }

    /// A required string argument.
    pub fn require_str(&self, key: &str) -> Result<&str, HelmError> {
        self.get_str(key)
            .ok_or_else(|| HelmError::InvalidArgument(format!("missing string argument '{key}'")))
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.raw.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.raw.get(key).and_then(|v| v.as_bool())
    }

    /// Deserialize the whole argument object into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, HelmError> {
        Ok(serde_json::from_value(self.raw.clone())?)
    }

    /// The file path a call targets, if any of the usual keys is present.
    pub fn target_path(&self) -> Option<&str> {
        ["filepath", "file_path", "path"]
            .iter()
            .find_map(|key| self.get_str(key))
    }
}

impl From<serde_json::Value> for ToolArguments {
    fn from(raw: serde_json::Value) -> Self {
        Self::new(raw)
    }
}
