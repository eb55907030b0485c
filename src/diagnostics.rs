//! Persistent diagnostics log.
//!
//! Any component can append an entry through [`DiagnosticsSink`]. Appends are
//! fire-and-forget: a failing write is reported to `tracing` and otherwise
//! ignored, so a broken diagnostics table never fails an import or a search.
//! Every entry is also mirrored to `tracing` at the matching level.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{DiagnosticEntry, Severity};
use crate::workspace::Workspace;

#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    /// Record an entry. Never fails.
    async fn append(&self, level: Severity, category: &str, message: &str, details: Option<&str>);

    /// Most recent entries first.
    async fn recent(&self, limit: i64) -> Result<Vec<DiagnosticEntry>>;

    /// Delete entries older than `retention_days`; returns how many were removed.
    async fn prune(&self, retention_days: i64) -> Result<u64>;
}

fn mirror(level: Severity, category: &str, message: &str, details: Option<&str>) {
    let details = details.unwrap_or("");
    match level {
        Severity::Debug => debug!(category, details, "{}", message),
        Severity::Info => info!(category, details, "{}", message),
        Severity::Warning => warn!(category, details, "{}", message),
        Severity::Error => error!(category, details, "{}", message),
    }
}

fn cutoff(retention_days: i64) -> i64 {
    chrono::Utc::now().timestamp() - retention_days.max(0) * 86_400
}

/// Diagnostics stored in the `diagnostics` table.
#[derive(Clone)]
pub struct SqliteDiagnostics {
    pool: SqlitePool,
}

impl SqliteDiagnostics {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        level: Severity,
        category: &str,
        message: &str,
        details: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO diagnostics (level, category, message, details, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(level.as_str())
        .bind(category)
        .bind(message)
        .bind(details)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DiagnosticsSink for SqliteDiagnostics {
    async fn append(&self, level: Severity, category: &str, message: &str, details: Option<&str>) {
        mirror(level, category, message, details);
        if let Err(e) = self.insert(level, category, message, details).await {
            warn!(error = %e, "Failed to persist diagnostics entry");
        }
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DiagnosticEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, category, message, details, created_at
            FROM diagnostics
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DiagnosticEntry {
                id: row.get("id"),
                level: Severity::parse(&row.get::<String, _>("level")),
                category: row.get("category"),
                message: row.get("message"),
                details: row.get("details"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn prune(&self, retention_days: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM diagnostics WHERE created_at < ?")
            .bind(cutoff(retention_days))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with an explicit timestamp.
    pub fn push_at(&self, level: Severity, category: &str, message: &str, created_at: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            let id = entries.len() as i64 + 1;
            entries.push(DiagnosticEntry {
                id,
                level,
                category: category.to_string(),
                message: message.to_string(),
                details: None,
                created_at,
            });
        }
    }
}

#[async_trait]
impl DiagnosticsSink for MemoryDiagnostics {
    async fn append(&self, level: Severity, category: &str, message: &str, details: Option<&str>) {
        mirror(level, category, message, details);
        if let Ok(mut entries) = self.entries.lock() {
            let id = entries.len() as i64 + 1;
            entries.push(DiagnosticEntry {
                id,
                level,
                category: category.to_string(),
                message: message.to_string(),
                details: details.map(str::to_string),
                created_at: chrono::Utc::now().timestamp(),
            });
        }
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DiagnosticEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("diagnostics lock poisoned"))?;
        Ok(entries
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn prune(&self, retention_days: i64) -> Result<u64> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("diagnostics lock poisoned"))?;
        let before = entries.len();
        let cutoff = cutoff(retention_days);
        entries.retain(|e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

/// `triage diagnostics`: list recent entries, or prune old ones.
pub async fn run_diagnostics(config: &Config, limit: i64, prune: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let sink = workspace.diagnostics();

    if prune {
        let removed = sink.prune(config.diagnostics.retention_days).await?;
        println!(
            "pruned {} entries older than {} days",
            removed, config.diagnostics.retention_days
        );
        return Ok(());
    }

    let entries = sink.recent(limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No diagnostics.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{} {:<7} [{}] {}",
            crate::stats::format_ts_iso(entry.created_at),
            entry.level.as_str(),
            entry.category,
            entry.message
        );
        if let Some(details) = &entry.details {
            println!("    {}", details);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    #[tokio::test]
    async fn sqlite_sink_appends_and_prunes() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&dir.path().join("d.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let sink = SqliteDiagnostics::new(pool.clone());

        sink.append(Severity::Warning, "import", "skipped file", Some("/x.pdf"))
            .await;
        sqlx::query(
            "INSERT INTO diagnostics (level, category, message, created_at) VALUES ('info', 'old', 'stale', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(sink.recent(10).await.unwrap().len(), 2);
        assert_eq!(sink.prune(30).await.unwrap(), 1);
        let left = sink.recent(10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].level, Severity::Warning);
        assert_eq!(left[0].details.as_deref(), Some("/x.pdf"));
    }

    #[tokio::test]
    async fn append_swallows_storage_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        // No migrations: the diagnostics table does not exist.
        let pool = db::connect_path(&dir.path().join("d.sqlite")).await.unwrap();
        let sink = SqliteDiagnostics::new(pool);
        sink.append(Severity::Error, "import", "boom", None).await;
        assert!(sink.recent(5).await.is_err());
    }

    #[tokio::test]
    async fn memory_sink_prunes_by_age() {
        let sink = MemoryDiagnostics::new();
        sink.push_at(Severity::Info, "old", "stale", 0);
        sink.append(Severity::Info, "new", "fresh", None).await;
        assert_eq!(sink.prune(1).await.unwrap(), 1);
        let recent = sink.recent(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].category, "new");
    }
}
