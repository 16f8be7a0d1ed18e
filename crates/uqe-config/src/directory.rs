//! Directory-service defaults.

use serde::{Deserialize, Serialize};

const fn default_size_limit() -> u32 {
    1000
}

const fn default_time_limit_secs() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// Substituted for `{{baseDN}}` and used when a definition has no base.
    #[serde(default)]
    pub base_dn: String,

    #[serde(default = "default_size_limit")]
    pub size_limit: u32,

    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_dn: String::new(),
            size_limit: default_size_limit(),
            time_limit_secs: default_time_limit_secs(),
        }
    }
}

impl DirectoryConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_dn.is_empty()
    }
}
