//! Execution identities for backend calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uqe_core::{CredentialSource, DataSourceKind, QueryContext, QueryError};

/// The identity a backend call runs as.
#[derive(Clone, PartialEq, Eq)]
pub enum ExecutionIdentity {
    /// The engine's configured service account.
    System,
    /// A signed-in user's stored credentials.
    User { user_id: String },
    /// Credentials supplied with the request, already decrypted.
    Explicit { username: String, secret: String },
}

impl fmt::Debug for ExecutionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::User { user_id } => f.debug_struct("User").field("user_id", user_id).finish(),
            Self::Explicit { username, .. } => f
                .debug_struct("Explicit")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Decrypts secrets supplied with a request.
pub trait SecretCipher: Send + Sync {
    /// # Errors
    ///
    /// Returns `QueryError::Authentication` if the secret cannot be decrypted.
    fn decrypt(&self, secret: &str) -> Result<String, QueryError>;
}

/// Returns secrets unchanged. Secrets are treated as opaque strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCipher;

impl SecretCipher for PassthroughCipher {
    fn decrypt(&self, secret: &str) -> Result<String, QueryError> {
        Ok(secret.to_string())
    }
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Decide which identity runs a call against `backend`.
    async fn resolve(
        &self,
        backend: DataSourceKind,
        context: &QueryContext,
    ) -> Result<ExecutionIdentity, QueryError>;
}

/// Maps the context's [`CredentialSource`] onto an identity.
pub struct DefaultCredentialResolver {
    cipher: Arc<dyn SecretCipher>,
}

impl Default for DefaultCredentialResolver {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughCipher))
    }
}

impl DefaultCredentialResolver {
    #[must_use]
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self { cipher }
    }
}

#[async_trait]
impl CredentialResolver for DefaultCredentialResolver {
    async fn resolve(
        &self,
        backend: DataSourceKind,
        context: &QueryContext,
    ) -> Result<ExecutionIdentity, QueryError> {
        match &context.credentials {
            CredentialSource::System => Ok(ExecutionIdentity::System),
            CredentialSource::User => context.user_id.as_ref().map_or_else(
                || {
                    Err(QueryError::Authentication(format!(
                        "user credentials requested for {backend} without a user id"
                    )))
                },
                |user_id| {
                    Ok(ExecutionIdentity::User {
                        user_id: user_id.clone(),
                    })
                },
            ),
            CredentialSource::Explicit { username, secret } => {
                if username.is_empty() {
                    return Err(QueryError::Authentication(
                        "explicit credentials require a username".to_string(),
                    ));
                }
                Ok(ExecutionIdentity::Explicit {
                    username: username.clone(),
                    secret: self.cipher.decrypt(secret)?,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_is_the_default_identity() {
        let resolver = DefaultCredentialResolver::default();
        let identity = resolver
            .resolve(DataSourceKind::Directory, &QueryContext::default())
            .await
            .unwrap();
        assert_eq!(identity, ExecutionIdentity::System);
    }

    #[tokio::test]
    async fn user_credentials_need_a_user_id() {
        let resolver = DefaultCredentialResolver::default();
        let context = QueryContext::default().with_credentials(CredentialSource::User);
        let err = resolver
            .resolve(DataSourceKind::Graph, &context)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Authentication(_)));

        let identity = resolver
            .resolve(DataSourceKind::Graph, &context.with_user("u-1"))
            .await
            .unwrap();
        assert_eq!(
            identity,
            ExecutionIdentity::User {
                user_id: "u-1".into()
            }
        );
    }

    #[tokio::test]
    async fn explicit_secret_passes_through_and_is_redacted() {
        let resolver = DefaultCredentialResolver::default();
        let context = QueryContext::default().with_credentials(CredentialSource::Explicit {
            username: "svc".into(),
            secret: "hunter2".into(),
        });
        let identity = resolver
            .resolve(DataSourceKind::Directory, &context)
            .await
            .unwrap();
        let debug = format!("{identity:?}");
        assert!(debug.contains("svc"));
        assert!(!debug.contains("hunter2"));
        assert!(matches!(identity, ExecutionIdentity::Explicit { secret, .. } if secret == "hunter2"));
    }
}
