//! Database statistics and health overview.
//!
//! Summarizes what the last import left behind: article counts per source
//! file, inventory counts per source type, tracked fingerprints, and the
//! schema version. Used by `triage stats` to confirm an import worked.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub schema_version: i64,
    pub articles: i64,
    pub inventory_records: i64,
    pub fingerprints: i64,
    pub diagnostics: i64,
    pub tickets: i64,
    pub last_import_ts: Option<i64>,
    pub articles_by_source: Vec<SourceCount>,
    pub inventory_by_type: Vec<SourceCount>,
}

async fn grouped(pool: &SqlitePool, sql: &str) -> Result<Vec<SourceCount>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| SourceCount {
            source: row.get("source"),
            count: row.get("count"),
        })
        .collect())
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Collect statistics from a migrated database.
pub async fn collect_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let last_import_ts: Option<i64> =
        sqlx::query_scalar("SELECT MAX(imported_at) FROM file_fingerprints")
            .fetch_one(pool)
            .await?;

    Ok(StoreStats {
        schema_version: migrate::schema_version(pool).await?,
        articles: count(pool, "kb_articles").await?,
        inventory_records: count(pool, "inventory_records").await?,
        fingerprints: count(pool, "file_fingerprints").await?,
        diagnostics: count(pool, "diagnostics").await?,
        tickets: count(pool, "ticket_history").await?,
        last_import_ts,
        articles_by_source: grouped(
            pool,
            "SELECT source_path AS source, COUNT(*) AS count FROM kb_articles \
             GROUP BY source_path ORDER BY count DESC, source_path",
        )
        .await?,
        inventory_by_type: grouped(
            pool,
            "SELECT source_type AS source, COUNT(*) AS count FROM inventory_records \
             GROUP BY source_type ORDER BY count DESC, source_type",
        )
        .await?,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Triage Harness — Database Stats");
    println!("===============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!("  Schema:       v{}", stats.schema_version);
    println!(
        "  Last import:  {}",
        stats
            .last_import_ts
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Articles:     {}", stats.articles);
    println!("  Inventory:    {}", stats.inventory_records);
    println!("  Fingerprints: {}", stats.fingerprints);
    println!("  Tickets:      {}", stats.tickets);
    println!("  Diagnostics:  {}", stats.diagnostics);

    print_breakdown("Articles by source:", &stats.articles_by_source);
    print_breakdown("Inventory by type:", &stats.inventory_by_type);
    println!();
    Ok(())
}

fn print_breakdown(heading: &str, rows: &[SourceCount]) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {}", heading);
    println!("  {:<56} {:>8}", "SOURCE", "COUNT");
    println!("  {}", "-".repeat(65));
    for row in rows {
        println!("  {:<56} {:>8}", row.source, row.count);
    }
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

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub(crate) fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
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
        format_ts_iso(ts)
    }
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
