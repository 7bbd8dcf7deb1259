use common::config::DatabaseConfig;
use sea_orm::{DatabaseConnection, DbErr};

/// Connect and bring the `common::entity` tables up to date.
pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let db = common::database::connect(&config.url, config.max_connections).await?;
    db.get_schema_registry("common::entity::*")
        .sync(&db)
        .await?;
    Ok(db)
}
