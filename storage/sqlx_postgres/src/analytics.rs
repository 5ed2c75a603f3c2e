use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use entities::analytics::AnalyticsRecord;
use use_cases::flash_offers::analytics::AnalyticsRepo;

#[async_trait]
impl AnalyticsRepo for Repository {
    #[tracing::instrument(err, skip(self), level = "info")]
    async fn record_analytics(&self, record: AnalyticsRecord) -> anyhow::Result<()> {
        let metadata =
            serde_json::to_value(&record.metadata).context("Failed to serialize metadata")?;
        let recipient_count =
            i32::try_from(record.recipient_count).context("Recipient count overflow")?;

        sqlx::query(
            "
            INSERT INTO public.notification_analytics (offer_id, event_type, recipient_count, metadata)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(record.offer_id.inner())
        .bind(record.event_type.to_string())
        .bind(recipient_count)
        .bind(metadata)
        .execute(self.pool())
        .await
        .context("Failed to record analytics")
        .map(|_| ())
    }
}
