//! Per-call execution context.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which identity a backend call should run as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialSource {
    /// The engine's configured service account.
    #[default]
    System,
    /// The calling user's stored credentials.
    User,
    /// Credentials supplied with the request. The secret is opaque to the engine.
    Explicit { username: String, secret: String },
}

/// Everything a single `execute_query` call needs besides the definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub bypass_cache: bool,
    /// Caller override of the definition's result cap.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Caller override of the definition's statement timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub credentials: CredentialSource,
}

impl QueryContext {
    #[must_use]
    pub fn new(parameters: Map<String, Value>) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    /// Build a context from a JSON object of parameters; non-objects yield none.
    #[must_use]
    pub fn from_json_params(parameters: Value) -> Self {
        match parameters {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }
}
