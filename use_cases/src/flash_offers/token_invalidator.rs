use async_trait::async_trait;
use entities::devices::PushToken;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceRegistrationRepo: Send + Sync {
    /// Flips `active` to false for every registration holding one of `tokens`.
    /// Returns the number of registrations that changed.
    async fn deactivate_device_tokens(&self, tokens: &[PushToken]) -> anyhow::Result<u64>;
}

pub struct TokenInvalidator {
    repo: Arc<dyn DeviceRegistrationRepo>,
}

impl TokenInvalidator {
    pub fn new(repo: Arc<dyn DeviceRegistrationRepo>) -> Self {
        Self { repo }
    }

    /// Deactivates permanently undeliverable tokens in one bulk update.
    /// Failures are logged and swallowed.
    #[tracing::instrument(skip(self, tokens), fields(tokens = tokens.len()), level = "info")]
    pub async fn invalidate(&self, tokens: &[PushToken]) -> u64 {
        if tokens.is_empty() {
            return 0;
        }
        match self.repo.deactivate_device_tokens(tokens).await {
            Ok(deactivated) => {
                tracing::info!(deactivated, "Deactivated undeliverable device tokens");
                deactivated
            }
            Err(err) => {
                tracing::error!("Failed to deactivate device tokens: {err:?}");
                0
            }
        }
    }
}
