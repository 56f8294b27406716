use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

/// Create the entry store schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_entries (
            id TEXT PRIMARY KEY,
            intent TEXT NOT NULL,
            problem_context TEXT NOT NULL DEFAULT '',
            root_cause TEXT NOT NULL DEFAULT '',
            solution_steps TEXT NOT NULL DEFAULT '',
            evidence TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            contributor TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_entries_updated_at ON knowledge_entries(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
