//! Common configuration types for the call client.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default log level when neither `RUST_LOG` nor `CALL_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `CALL_LOG_LEVEL` and `CALL_LOG_JSON` from a variable map.
    ///
    /// Unparseable booleans fall back to plain-text logs.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get("CALL_LOG_LEVEL")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get("CALL_LOG_JSON")
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        Self {
            log_level,
            json_logs,
        }
    }
}
