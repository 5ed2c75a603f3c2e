use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use shared_kernel::configuration::{require_non_blank, ConfigurationError};
use std::time::Duration;

/// Service account credentials and endpoints of the push gateway (FCM HTTP v1).
#[derive(Debug, Clone, Deserialize)]
pub struct FcmSettings {
    pub project_id: String,
    pub client_email: String,
    pub private_key: Secret<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_concurrent_requests")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base() -> String {
    "https://fcm.googleapis.com/".to_string()
}

fn default_max_concurrent_requests() -> usize {
    50
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl FcmSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_non_blank("gateway.project_id", &self.project_id)?;
        require_non_blank("gateway.client_email", &self.client_email)?;
        require_non_blank("gateway.private_key", self.private_key.expose_secret())?;
        require_non_blank("gateway.token_uri", &self.token_uri)?;
        require_non_blank("gateway.api_base", &self.api_base)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Keys pasted into environment variables usually carry escaped newlines.
    pub(crate) fn private_key_pem(&self) -> String {
        self.private_key.expose_secret().replace("\\n", "\n")
    }
}
