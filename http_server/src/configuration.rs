use notifications::config::FcmSettings;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use shared_kernel::configuration::{config, require_non_blank, ConfigurationError};
use sqlx_postgres::configuration::DbSettings;
use std::time::Duration;
use use_cases::flash_offers::settings::DispatchSettings;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DbSettings,
    pub identity: IdentitySettings,
    pub gateway: FcmSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    #[serde(default = "default_outbound_max_retries")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub outbound_max_retries: u32,
    #[serde(default = "default_outbound_timeout_secs")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub outbound_timeout_secs: u64,
}

fn default_outbound_max_retries() -> u32 {
    1
}

fn default_outbound_timeout_secs() -> u64 {
    10
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }
}

/// The external identity service bearer tokens are checked against.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    pub url: String,
    pub api_key: Secret<String>,
}

impl Settings {
    /// Loads and validates everything the server needs. Any failure collapses to the generic
    /// configuration error; the reason is only logged.
    pub fn load() -> Result<Self, ConfigurationError> {
        let settings = config::<Settings>().map_err(|err| {
            tracing::error!("Failed to load configuration: {err:?}");
            ConfigurationError
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_non_blank("application.host", &self.application.host)?;
        self.database.validate()?;
        require_non_blank("identity.url", &self.identity.url)?;
        require_non_blank("identity.api_key", self.identity.api_key.expose_secret())?;
        self.gateway.validate()?;
        self.dispatch.validate().map_err(|reason| {
            tracing::error!(%reason, "Invalid dispatch configuration");
            ConfigurationError
        })
    }
}
