use crate::config::FcmSettings;
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use shared_kernel::http_client::HttpClient;
use tokio::sync::Mutex;
use url::Url;

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges the service account assertion for an OAuth access token and keeps it until
/// shortly before it expires.
pub(crate) struct AccessTokenProvider {
    http: HttpClient,
    client_email: String,
    key: EncodingKey,
    token_uri: Url,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub(crate) fn new(settings: &FcmSettings, http: HttpClient) -> anyhow::Result<Self> {
        let key = EncodingKey::from_rsa_pem(settings.private_key_pem().as_bytes())
            .context("Invalid service account private key")?;
        let token_uri = Url::parse(&settings.token_uri).context("Invalid token uri")?;
        Ok(Self {
            http,
            client_email: settings.client_email.clone(),
            key,
            token_uri,
            cached: Mutex::new(None),
        })
    }

    fn refresh_margin() -> Duration {
        Duration::minutes(5)
    }

    pub(crate) async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Self::refresh_margin() > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    async fn exchange(&self) -> anyhow::Result<CachedToken> {
        let now = Utc::now();
        let claims = Claims {
            iss: &self.client_email,
            scope: MESSAGING_SCOPE,
            aud: self.token_uri.as_str(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("Failed to sign service account assertion")?;

        let response = self
            .http
            .post_form(
                self.token_uri.clone(),
                &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
            )
            .await?;
        if !response.is_success() {
            bail!("Access token exchange was refused with status {}", response.status);
        }
        let token: TokenResponse = response.deserialize()?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in.unwrap_or(3600)),
        })
    }
}
