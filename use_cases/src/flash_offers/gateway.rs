use crate::flash_offers::payload::NotificationPayload;
use async_trait::async_trait;
use entities::devices::PushToken;
#[cfg(test)]
use mockall::automock;

/// What the gateway reported for one token of a multicast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSendResult {
    Delivered { message_id: Option<String> },
    Rejected { code: String, message: String },
}

/// The third-party push delivery service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Makes sure credentials are usable before the first batch goes out.
    async fn ensure_ready(&self) -> anyhow::Result<()>;

    /// Sends one payload to every token. Returns exactly one result per token, in order.
    /// An `Err` means the whole call failed and nothing is known about individual tokens.
    async fn send_multicast(
        &self,
        tokens: &[PushToken],
        payload: &NotificationPayload,
    ) -> anyhow::Result<Vec<TokenSendResult>>;
}
