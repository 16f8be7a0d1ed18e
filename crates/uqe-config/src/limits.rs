//! Execution limits and parameter-transform settings.

use serde::{Deserialize, Serialize};

/// Hard ceiling on rows returned by any single execution.
const fn default_max_results_cap() -> usize {
    10_000
}

const fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Row cap applied when neither the definition nor the caller sets one,
    /// and the ceiling for both when they do.
    #[serde(default = "default_max_results_cap")]
    pub max_results_cap: usize,

    /// Statement timeout used when a definition does not declare one.
    /// `0` disables the default.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_results_cap: default_max_results_cap(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_max_password_age_days() -> i64 {
    90
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Domain password lifetime used by the `passwordExpiryDays` transform.
    #[serde(default = "default_max_password_age_days")]
    pub max_password_age_days: i64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_password_age_days: default_max_password_age_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_results_cap, 10_000);
        assert_eq!(limits.default_timeout_ms, 30_000);
        assert_eq!(TransformConfig::default().max_password_age_days, 90);
    }
}
