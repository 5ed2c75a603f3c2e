use crate::configuration::IdentitySettings;
use actix_web::http::header::Header;
use actix_web::HttpRequest;
use actix_web_httpauth::headers::authorization;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use entities::users::UserId;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use shared_kernel::http_client::HttpClient;
use std::collections::HashMap;
use url::Url;
use use_cases::actor::Principal;
use use_cases::authentication::{AuthenticationError, Authenticator};

/// The raw bearer token of the request, `None` when the header is missing or not a bearer.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    authorization::Authorization::<authorization::Bearer>::parse(req)
        .ok()
        .map(|auth| auth.as_ref().token().to_string())
}

#[derive(Deserialize)]
struct IdentityUser {
    id: String,
    email: Option<String>,
}

/// Asks the identity service who owns a bearer token.
pub struct IdentityServiceAuthenticator {
    http: HttpClient,
    user_url: Url,
    api_key: Secret<String>,
}

impl IdentityServiceAuthenticator {
    pub fn new(settings: &IdentitySettings, http: HttpClient) -> anyhow::Result<Self> {
        let user_url = Url::parse(&format!("{}/user", settings.url.trim_end_matches('/')))
            .context("Invalid identity service url")?;
        Ok(Self {
            http,
            user_url,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl Authenticator for IdentityServiceAuthenticator {
    #[tracing::instrument(err, skip_all, level = "info")]
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthenticationError> {
        let headers = HashMap::from([
            ("authorization", format!("Bearer {bearer_token}")),
            ("apikey", self.api_key.expose_secret().to_string()),
        ]);
        let response = self
            .http
            .get_with_headers(self.user_url.clone(), headers)
            .await
            .map_err(|err| AuthenticationError::Unavailable(anyhow!(err)))?;

        if !response.is_success() {
            tracing::info!(status = %response.status, "Identity service refused the token");
            return Err(AuthenticationError::Rejected);
        }

        let user: IdentityUser = response
            .deserialize()
            .map_err(|_| AuthenticationError::Rejected)?;
        let user_id = user
            .id
            .parse::<UserId>()
            .map_err(|_| AuthenticationError::Rejected)?;

        Ok(Principal {
            user_id,
            email: user.email,
        })
    }
}
