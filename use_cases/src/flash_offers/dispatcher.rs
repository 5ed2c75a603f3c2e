use crate::flash_offers::gateway::{PushGateway, TokenSendResult};
use crate::flash_offers::payload::NotificationPayload;
use crate::flash_offers::token_invalidator::TokenInvalidator;
use entities::devices::PushToken;
use futures::{stream, StreamExt};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeliveryErrorCategory {
    InvalidToken,
    QuotaExceeded,
    ServerError,
    Unavailable,
    Unknown,
}

impl DeliveryErrorCategory {
    /// Maps a gateway error code, in any of the spellings the gateway uses, to a category.
    pub fn classify(code: &str) -> Self {
        let normalized = code.trim().to_ascii_uppercase().replace('-', "_");
        let normalized = normalized
            .strip_prefix("MESSAGING/")
            .unwrap_or(&normalized);

        match normalized {
            "UNREGISTERED"
            | "INVALID_ARGUMENT"
            | "NOT_FOUND"
            | "REGISTRATION_TOKEN_NOT_REGISTERED"
            | "INVALID_REGISTRATION_TOKEN"
            | "SENDER_ID_MISMATCH" => DeliveryErrorCategory::InvalidToken,
            "QUOTA_EXCEEDED"
            | "MESSAGE_RATE_EXCEEDED"
            | "DEVICE_MESSAGE_RATE_EXCEEDED"
            | "RESOURCE_EXHAUSTED" => DeliveryErrorCategory::QuotaExceeded,
            "INTERNAL" | "INTERNAL_ERROR" => DeliveryErrorCategory::ServerError,
            "UNAVAILABLE" | "SERVER_UNAVAILABLE" => DeliveryErrorCategory::Unavailable,
            _ => DeliveryErrorCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenFailure {
    pub token: PushToken,
    pub category: DeliveryErrorCategory,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub size: usize,
    pub delivered: Vec<PushToken>,
    pub failures: Vec<TokenFailure>,
}

impl BatchReport {
    fn failed_entirely(batch: &[PushToken], detail: String) -> Self {
        Self {
            size: batch.len(),
            delivered: vec![],
            failures: batch
                .iter()
                .map(|token| TokenFailure {
                    token: token.clone(),
                    category: DeliveryErrorCategory::Unknown,
                    detail: detail.clone(),
                })
                .collect(),
        }
    }

    fn from_results(batch: &[PushToken], results: Vec<TokenSendResult>) -> Self {
        let mut report = BatchReport {
            size: batch.len(),
            ..Default::default()
        };
        let mut results = results.into_iter();
        for token in batch {
            match results.next() {
                Some(TokenSendResult::Delivered { .. }) => report.delivered.push(token.clone()),
                Some(TokenSendResult::Rejected { code, message }) => {
                    report.failures.push(TokenFailure {
                        token: token.clone(),
                        category: DeliveryErrorCategory::classify(&code),
                        detail: format!("{code}: {message}"),
                    })
                }
                None => report.failures.push(TokenFailure {
                    token: token.clone(),
                    category: DeliveryErrorCategory::Unknown,
                    detail: "gateway returned no result for token".to_string(),
                }),
            }
        }
        report
    }

    /// More than half of the batch was refused because of gateway quota.
    pub fn quota_exhausted(&self) -> bool {
        let quota_failures = self
            .failures
            .iter()
            .filter(|failure| failure.category == DeliveryErrorCategory::QuotaExceeded)
            .count();
        quota_failures * 2 > self.size
    }
}

/// Aggregate over every batch of one dispatch. Batches keep the order of the input tokens.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchReport {
    pub batches: Vec<BatchReport>,
    pub invalidated: u64,
}

impl DispatchReport {
    /// Report of a dry run: every token counts as delivered and nothing was sent.
    pub fn simulated(tokens: &[PushToken], batch_size: usize) -> Self {
        let batches = tokens
            .chunks(batch_size.max(1))
            .map(|batch| BatchReport {
                size: batch.len(),
                delivered: batch.to_vec(),
                failures: vec![],
            })
            .collect();
        Self {
            batches,
            invalidated: 0,
        }
    }

    pub fn success_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.delivered.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.failures.len()).sum()
    }

    pub fn delivered(&self) -> impl Iterator<Item = &PushToken> {
        self.batches.iter().flat_map(|batch| batch.delivered.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TokenFailure> {
        self.batches.iter().flat_map(|batch| batch.failures.iter())
    }

    pub fn invalid_tokens(&self) -> Vec<PushToken> {
        self.failures()
            .filter(|failure| failure.category == DeliveryErrorCategory::InvalidToken)
            .map(|failure| failure.token.clone())
            .unique()
            .collect()
    }

    pub fn gateway_quota_exhausted(&self) -> bool {
        self.batches.iter().any(BatchReport::quota_exhausted)
    }
}

/// Sends a payload to a token list in gateway-sized batches with bounded concurrency,
/// then hands invalid tokens to the [`TokenInvalidator`].
pub struct BatchDispatcher {
    gateway: Arc<dyn PushGateway>,
    invalidator: TokenInvalidator,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl BatchDispatcher {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        invalidator: TokenInvalidator,
        batch_size: usize,
        max_concurrent_batches: usize,
    ) -> Self {
        Self {
            gateway,
            invalidator,
            batch_size: batch_size.max(1),
            max_concurrent_batches: max_concurrent_batches.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[tracing::instrument(skip(self, tokens, payload), fields(tokens = tokens.len()), level = "info")]
    pub async fn dispatch(
        &self,
        tokens: &[PushToken],
        payload: &NotificationPayload,
    ) -> DispatchReport {
        let sends: Vec<_> = tokens
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, batch)| self.send_batch(index, batch, payload))
            .collect();
        let batches = stream::iter(sends)
            .buffered(self.max_concurrent_batches)
            .collect::<Vec<_>>()
            .await;

        let mut report = DispatchReport {
            batches,
            invalidated: 0,
        };
        report.invalidated = self.invalidator.invalidate(&report.invalid_tokens()).await;

        tracing::info!(
            batches = report.batches.len(),
            sent = report.success_count(),
            failed = report.failure_count(),
            invalidated = report.invalidated,
            "Dispatch finished"
        );
        report
    }

    async fn send_batch(
        &self,
        index: usize,
        batch: &[PushToken],
        payload: &NotificationPayload,
    ) -> BatchReport {
        match self.gateway.send_multicast(batch, payload).await {
            Ok(results) => {
                if results.len() != batch.len() {
                    tracing::warn!(
                        batch = index,
                        expected = batch.len(),
                        received = results.len(),
                        "Gateway result count does not match the batch"
                    );
                }
                let report = BatchReport::from_results(batch, results);
                if report.quota_exhausted() {
                    tracing::warn!(batch = index, "Gateway quota exhausted for batch");
                }
                report
            }
            Err(err) => {
                tracing::error!(batch = index, size = batch.len(), "Batch send failed: {err:?}");
                BatchReport::failed_entirely(batch, err.to_string())
            }
        }
    }
}
