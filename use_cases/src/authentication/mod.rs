use crate::actor::Principal;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("Missing bearer credential")]
    MissingCredential,
    #[error("Credential was rejected by the identity service")]
    Rejected,
    #[error("Identity service unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// Validates a bearer credential against the external identity service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthenticationError>;
}
