use crate::auth::AccessTokenProvider;
use crate::config::FcmSettings;
use crate::message;
use anyhow::Context;
use async_trait::async_trait;
use entities::devices::PushToken;
use futures::{stream, StreamExt};
use shared_kernel::http_client::HttpClient;
use std::collections::HashMap;
use url::Url;
use use_cases::flash_offers::gateway::{PushGateway, TokenSendResult};
use use_cases::flash_offers::payload::NotificationPayload;

/// Gateway code reported for a token whose request never got an answer.
const TRANSPORT_FAILURE_CODE: &str = "UNAVAILABLE";

/// Push gateway backed by FCM HTTP v1. Built once at startup and shared.
///
/// Sends are never retried at the transport level: a throttled or failed token is reported
/// back as is, so quota exhaustion is seen on the first answer.
pub struct FcmGateway {
    http: HttpClient,
    tokens: AccessTokenProvider,
    send_url: Url,
    max_concurrent_requests: usize,
}

impl FcmGateway {
    pub fn new(settings: &FcmSettings) -> anyhow::Result<Self> {
        let http = HttpClient::new(0, settings.request_timeout())
            .context("Failed to build the push gateway http client")?;
        let send_url = Url::parse(&settings.api_base)
            .and_then(|base| {
                base.join(&format!("v1/projects/{}/messages:send", settings.project_id))
            })
            .context("Invalid push gateway api base")?;
        let tokens = AccessTokenProvider::new(settings, http.clone())?;

        Ok(Self {
            http,
            tokens,
            send_url,
            max_concurrent_requests: settings.max_concurrent_requests.max(1),
        })
    }

    async fn send_one(
        &self,
        access_token: &str,
        token: &PushToken,
        payload: &NotificationPayload,
    ) -> TokenSendResult {
        let body = message::for_token(token, payload);
        let headers = HashMap::from([("authorization", format!("Bearer {access_token}"))]);

        match self.http.post_json(self.send_url.clone(), headers, &body).await {
            Ok(response) if response.is_success() => TokenSendResult::Delivered {
                message_id: response.body["name"].as_str().map(str::to_string),
            },
            Ok(response) => {
                let code = message::error_code(&response.body)
                    .unwrap_or_else(|| response.status.as_str().to_string());
                tracing::debug!(token = ?token, %code, "Gateway rejected token");
                TokenSendResult::Rejected {
                    message: message::error_message(&response.body),
                    code,
                }
            }
            Err(err) => {
                tracing::warn!(token = ?token, "Gateway request failed: {err}");
                TokenSendResult::Rejected {
                    code: TRANSPORT_FAILURE_CODE.to_string(),
                    message: err.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    #[tracing::instrument(err, skip(self), level = "info")]
    async fn ensure_ready(&self) -> anyhow::Result<()> {
        self.tokens
            .access_token()
            .await
            .map(|_| ())
            .context("Push gateway credentials were not accepted")
    }

    #[tracing::instrument(err, skip(self, tokens, payload), fields(tokens = tokens.len()), level = "info")]
    async fn send_multicast(
        &self,
        tokens: &[PushToken],
        payload: &NotificationPayload,
    ) -> anyhow::Result<Vec<TokenSendResult>> {
        let access_token = self.tokens.access_token().await?;
        let sends: Vec<_> = tokens
            .iter()
            .map(|token| self.send_one(&access_token, token, payload))
            .collect();
        let results = stream::iter(sends)
            .buffered(self.max_concurrent_requests)
            .collect::<Vec<_>>()
            .await;
        Ok(results)
    }
}
