use anyhow::Context;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use thiserror::Error;

const CONFIGURATION_DIRECTORY_ENV: &str = "APP_CONFIGURATION_DIRECTORY";

/// The message every configuration failure collapses to. The offending key is logged,
/// never surfaced.
pub const MISSING_CONFIGURATION: &str = "Missing required configuration";

#[derive(Error, Debug)]
#[error("{}", MISSING_CONFIGURATION)]
pub struct ConfigurationError;

fn configuration_directory() -> anyhow::Result<PathBuf> {
    if let Ok(directory) = std::env::var(CONFIGURATION_DIRECTORY_ENV) {
        return Ok(PathBuf::from(directory));
    }
    let base_path = std::env::current_dir().context("Failed to determine the current directory")?;
    Ok(base_path.join("configuration"))
}

pub fn config<Settings: DeserializeOwned>() -> anyhow::Result<Settings> {
    let configuration_directory = configuration_directory()?;
    let file = if cfg!(test) { "test.yaml" } else { "base.yaml" };
    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join(file)).required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Failed to build configuration")?;

    settings
        .try_deserialize::<Settings>()
        .context("Failed to deserialize settings")
}

/// Fails with the generic [`ConfigurationError`] when `value` is blank.
pub fn require_non_blank(key: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        tracing::error!(key, "required configuration value is missing");
        return Err(ConfigurationError);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_rejected_with_a_generic_message() {
        let err = require_non_blank("gateway.private_key", "   ").unwrap_err();
        assert_eq!(err.to_string(), MISSING_CONFIGURATION);
        assert!(!err.to_string().contains("private_key"));
    }

    #[test]
    fn present_values_pass() {
        assert!(require_non_blank("identity.url", "https://auth.example.com").is_ok());
    }
}
