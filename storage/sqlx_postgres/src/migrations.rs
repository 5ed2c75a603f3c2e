use crate::repository::Repository;
use anyhow::Context;

pub struct MigrationManager {
    repository: Repository,
}

impl MigrationManager {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!()
            .run(self.repository.pool())
            .await
            .context("Failed to run migration")
    }
}
