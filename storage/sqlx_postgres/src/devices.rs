use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use entities::devices::PushToken;
use itertools::Itertools;
use use_cases::flash_offers::token_invalidator::DeviceRegistrationRepo;

#[async_trait]
impl DeviceRegistrationRepo for Repository {
    #[tracing::instrument(err, skip(self, tokens), fields(tokens = tokens.len()), level = "info")]
    async fn deactivate_device_tokens(&self, tokens: &[PushToken]) -> anyhow::Result<u64> {
        let tokens = tokens.iter().map(PushToken::inner).collect_vec();
        let result = sqlx::query(
            "
            UPDATE public.device_registrations SET active = false, updated_at = now()
            WHERE active AND push_token = ANY($1)
            ",
        )
        .bind(&tokens[..])
        .execute(self.pool())
        .await
        .context("Failed to deactivate device tokens")?;

        Ok(result.rows_affected())
    }
}
