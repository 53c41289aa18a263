//! Policy context configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::construction_guard::RawMarkerPolicy;

pub const DEFAULT_TRACE_ID: &str = "objcap";
pub const DEFAULT_MAX_DELEGATE_DEPTH: u32 = 256;

/// Settings fixed when a [`PolicyContext`](crate::PolicyContext) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Correlation id stamped on every emitted event.
    pub trace_id: String,
    /// What a rejected `enter_method` does to a `Raw` instance.
    pub raw_marker_policy: RawMarkerPolicy,
    pub record_events: bool,
    /// Upper bound on delegate-chain walks.
    pub max_delegate_depth: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            trace_id: DEFAULT_TRACE_ID.to_string(),
            raw_marker_policy: RawMarkerPolicy::default(),
            record_events: true,
            max_delegate_depth: DEFAULT_MAX_DELEGATE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to parse policy config: {0}")]
    Parse(String),
    #[error("invalid config field `{field}`: {detail}")]
    InvalidField { field: String, detail: String },
}

impl PolicyConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_id.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "trace_id".to_string(),
                detail: "must not be empty".to_string(),
            });
        }
        if self.max_delegate_depth == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_delegate_depth".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_raw_marker_policy(mut self, policy: RawMarkerPolicy) -> Self {
        self.raw_marker_policy = policy;
        self
    }
}
