use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};
use shared_kernel::configuration::{config, require_non_blank, ConfigurationError};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DbSettings,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        config::<Settings>()
    }
}

type DbName = String;

#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub database_name: DbName,
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub require_ssl: bool,
    #[serde(default = "default_max_connections")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl DbSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_non_blank("database.host", &self.host)?;
        require_non_blank("database.username", &self.username)?;
        require_non_blank("database.password", self.password.expose_secret())?;
        require_non_blank("database.database_name", &self.database_name)?;
        Ok(())
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}
