use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database and its tables (`docvec init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    pool.close().await;
    println!("Database initialized at {}", config.sqlite_path().display());
    Ok(())
}

/// Idempotent schema setup, run on every connect.
pub(crate) async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_indexes (
            name TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `ord` survives upserts and orders equal scores.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_records (
            ord INTEGER PRIMARY KEY AUTOINCREMENT,
            index_name TEXT NOT NULL REFERENCES vector_indexes(name),
            id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            embedding_model TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(index_name, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_records_source ON index_records(index_name, source_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
