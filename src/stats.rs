//! Index statistics.
//!
//! Summarises what is stored: one line per vector index, plus a
//! per-file breakdown for the configured index. Used by `docvec stats`
//! to check that an ingestion run did what it was expected to.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct IndexStats {
    name: String,
    dims: i64,
    records: i64,
    files: i64,
}

struct FileStats {
    source_id: String,
    chunks: i64,
    model: String,
    last_ingested: Option<String>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let db_path = config.sqlite_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let index_rows = sqlx::query(
        r#"
        SELECT
            v.name,
            v.dims,
            COUNT(r.id) AS records,
            COUNT(DISTINCT r.source_id) AS files
        FROM vector_indexes v
        LEFT JOIN index_records r ON r.index_name = v.name
        GROUP BY v.name, v.dims
        ORDER BY v.name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let indexes: Vec<IndexStats> = index_rows
        .iter()
        .map(|row| IndexStats {
            name: row.get("name"),
            dims: row.get("dims"),
            records: row.get("records"),
            files: row.get("files"),
        })
        .collect();

    let file_rows = sqlx::query(
        r#"
        SELECT
            source_id,
            COUNT(*) AS chunks,
            MAX(embedding_model) AS model,
            MAX(json_extract(metadata_json, '$.ingested_at')) AS last_ingested
        FROM index_records
        WHERE index_name = ?
        GROUP BY source_id
        ORDER BY source_id
        "#,
    )
    .bind(&config.index.name)
    .fetch_all(&pool)
    .await?;

    let files: Vec<FileStats> = file_rows
        .iter()
        .map(|row| FileStats {
            source_id: row.get("source_id"),
            chunks: row.get("chunks"),
            model: row.get("model"),
            last_ingested: row.get("last_ingested"),
        })
        .collect();

    pool.close().await;

    println!("docvec: index stats");
    println!("===================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));

    if indexes.is_empty() {
        println!();
        println!("  No indexes yet. Run `docvec ingest` first.");
        println!();
        return Ok(());
    }

    println!();
    println!("  {:<24} {:>6} {:>8} {:>8}", "INDEX", "DIMS", "RECORDS", "FILES");
    println!("  {}", "-".repeat(50));
    for idx in &indexes {
        let marker = if idx.name == config.index.name { "*" } else { " " };
        println!(
            "{} {:<24} {:>6} {:>8} {:>8}",
            marker, idx.name, idx.dims, idx.records, idx.files
        );
    }

    if !files.is_empty() {
        println!();
        println!("  Files in '{}':", config.index.name);
        println!(
            "  {:<32} {:>7}   {:<24} {}",
            "FILE", "CHUNKS", "MODEL", "LAST INGESTED"
        );
        println!("  {}", "-".repeat(84));
        for f in &files {
            let when = f
                .last_ingested
                .as_deref()
                .map(format_relative)
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {:<32} {:>7}   {:<24} {}",
                f.source_id, f.chunks, f.model, when
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Render an RFC 3339 timestamp relative to now (e.g. "3 hours ago").
fn format_relative(rfc3339: &str) -> String {
    let Ok(ts) = chrono::DateTime::parse_from_rfc3339(rfc3339) else {
        return rfc3339.to_string();
    };
    let delta = chrono::Utc::now().timestamp() - ts.timestamp();

    if delta < 0 {
        ts.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
