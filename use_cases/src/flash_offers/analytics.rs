use async_trait::async_trait;
use entities::analytics::AnalyticsRecord;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnalyticsRepo: Send + Sync {
    async fn record_analytics(&self, record: AnalyticsRecord) -> anyhow::Result<()>;
}

pub struct AnalyticsRecorder {
    repo: Arc<dyn AnalyticsRepo>,
}

impl AnalyticsRecorder {
    pub fn new(repo: Arc<dyn AnalyticsRepo>) -> Self {
        Self { repo }
    }

    /// Never fails; a lost analytics row must not fail a delivered notification.
    #[tracing::instrument(skip(self, record), fields(offer_id = %record.offer_id, event = %record.event_type), level = "info")]
    pub async fn record(&self, record: AnalyticsRecord) {
        if let Err(err) = self.repo.record_analytics(record).await {
            tracing::error!("Failed to record notification analytics: {err:?}");
        }
    }
}
