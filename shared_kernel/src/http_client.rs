use anyhow::{Context, Error};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use reqwest_tracing::TracingMiddleware;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error as ThisError;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Outbound HTTP client shared by the identity service and the push gateway.
///
/// Built once at startup and cloned into whoever needs it; the underlying connection pool
/// is reference counted.
#[derive(Clone)]
pub struct HttpClient {
    client: ClientWithMiddleware,
}

#[derive(ThisError, Debug)]
pub enum HttpClientError {
    #[error(transparent)]
    ResponseError(#[from] Error),
    #[error("httpBuilderError {0}")]
    HTTPBuilderError(String),
}

/// Status plus body of a response. Bodies that are not JSON are kept as a JSON string.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl JsonResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn deserialize<DTO: DeserializeOwned>(self) -> anyhow::Result<DTO> {
        serde_json::from_value(self.body).context("Failed to deserialize response")
    }
}

struct HeadersMapGenerator(HeaderMap);

impl HeadersMapGenerator {
    fn into_inner(self) -> HeaderMap {
        self.0
    }
}

impl TryFrom<HashMap<&'static str, String>> for HeadersMapGenerator {
    type Error = HttpClientError;

    fn try_from(value: HashMap<&'static str, String>) -> Result<Self, Self::Error> {
        let mut header_map = HeaderMap::new();

        for (key, value) in value.into_iter() {
            // header values may carry credentials, keep them out of the error text
            let value = HeaderValue::from_str(&value)
                .map_err(|err| HttpClientError::HTTPBuilderError(format!("{key}: {err}")))?;
            header_map.insert(key, value);
        }
        Ok(Self(header_map))
    }
}

impl HttpClient {
    pub fn new(max_retries: u32, timeout: Duration) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build http client")?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(inner)
            // Retry failed requests.
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(TracingMiddleware::default())
            .build();
        Ok(Self { client })
    }

    async fn send(builder: RequestBuilder) -> Result<JsonResponse, HttpClientError> {
        let response = builder
            .send()
            .await
            .context("Failed to send request")
            .map_err(HttpClientError::ResponseError)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")
            .map_err(HttpClientError::ResponseError)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(JsonResponse { status, body })
    }

    pub async fn get_with_headers(
        &self,
        url: Url,
        headers: HashMap<&'static str, String>,
    ) -> Result<JsonResponse, HttpClientError> {
        let header_map = HeadersMapGenerator::try_from(headers)?.into_inner();
        let builder = self.client.get(url).headers(header_map);
        Self::send(builder).await
    }

    pub async fn post_json(
        &self,
        url: Url,
        headers: HashMap<&'static str, String>,
        body: &Value,
    ) -> Result<JsonResponse, HttpClientError> {
        let header_map = HeadersMapGenerator::try_from(headers)?.into_inner();
        let builder = self.client.post(url).headers(header_map).json(body);
        Self::send(builder).await
    }

    pub async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<JsonResponse, HttpClientError> {
        let builder = self.client.post(url).form(form);
        Self::send(builder).await
    }
}
