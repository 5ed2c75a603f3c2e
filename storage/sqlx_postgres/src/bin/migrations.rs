use sqlx_postgres::configuration::Settings;
use sqlx_postgres::migrations::MigrationManager;
use sqlx_postgres::repository::Repository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    settings.database.validate()?;
    let repo = Repository::new(&settings.database).await?;
    MigrationManager::new(repo).migrate().await
}
