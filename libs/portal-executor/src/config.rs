use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;

/// Executor settings, deserialized from the `executor` section of the
/// portal configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program invoked for every intent. Never influenced by request data.
    pub program: String,
    /// Fixed arguments inserted before the intent fragment.
    pub base_args: Vec<String>,
    /// Timeout applied when the request does not carry one.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Hard upper bound no request or whitelist entry may exceed.
    #[serde(with = "humantime_serde")]
    pub timeout_ceiling: Duration,
    /// Cap on accumulated stdout/stderr per execution.
    pub max_output_bytes: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_owned(),
            base_args: vec!["mcp".to_owned()],
            default_timeout: Duration::from_secs(30),
            timeout_ceiling: Duration::from_secs(300),
            max_output_bytes: 1024 * 1024,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.program, "docker");
        assert_eq!(cfg.base_args, vec!["mcp".to_owned()]);
        assert!(cfg.default_timeout <= cfg.timeout_ceiling);
    }

    #[test]
    fn yaml_durations_use_humantime() {
        let cfg: ExecutorConfig =
            serde_json::from_str(r#"{"default_timeout": "45s", "timeout_ceiling": "2m"}"#).unwrap();
        assert_eq!(cfg.default_timeout, Duration::from_secs(45));
        assert_eq!(cfg.timeout_ceiling, Duration::from_secs(120));
    }
}
