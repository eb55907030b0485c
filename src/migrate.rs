//! Versioned schema migrations.
//!
//! Each migration has a version number; the highest applied version is
//! recorded in `schema_migrations`. Pending migrations run in order, each in
//! its own transaction. Statements are idempotent (`IF NOT EXISTS`) and
//! column additions are checked one by one, so a migration that was
//! partially applied by an earlier run is completed instead of failing.

use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::config::Config;
use crate::db;

/// One schema step.
enum Step {
    /// Idempotent SQL statement.
    Sql(&'static str),
    /// Virtual table that has no `IF NOT EXISTS` guard worth trusting.
    VirtualTable {
        name: &'static str,
        sql: &'static str,
    },
    /// `ALTER TABLE .. ADD COLUMN`, skipped when the column exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
        decl: &'static str,
    },
}

struct Migration {
    version: i64,
    name: &'static str,
    steps: &'static [Step],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core tables",
        steps: &[
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS kb_articles (
                    seq INTEGER PRIMARY KEY,
                    id TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    source_path TEXT NOT NULL,
                    tags_json TEXT NOT NULL DEFAULT '[]',
                    platforms_json TEXT NOT NULL DEFAULT '[]',
                    apps_json TEXT NOT NULL DEFAULT '[]',
                    keywords TEXT NOT NULL DEFAULT '',
                    imported_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::VirtualTable {
                name: "kb_fts",
                sql: r#"
                CREATE VIRTUAL TABLE kb_fts USING fts5(
                    title,
                    body,
                    keywords,
                    content='kb_articles',
                    content_rowid='seq'
                )
                "#,
            },
            Step::Sql(
                r#"
                CREATE TRIGGER IF NOT EXISTS kb_articles_ai AFTER INSERT ON kb_articles BEGIN
                    INSERT INTO kb_fts(rowid, title, body, keywords)
                    VALUES (new.seq, new.title, new.body, new.keywords);
                END
                "#,
            ),
            Step::Sql(
                r#"
                CREATE TRIGGER IF NOT EXISTS kb_articles_ad AFTER DELETE ON kb_articles BEGIN
                    INSERT INTO kb_fts(kb_fts, rowid, title, body, keywords)
                    VALUES ('delete', old.seq, old.title, old.body, old.keywords);
                END
                "#,
            ),
            Step::Sql(
                r#"
                CREATE TRIGGER IF NOT EXISTS kb_articles_au AFTER UPDATE ON kb_articles BEGIN
                    INSERT INTO kb_fts(kb_fts, rowid, title, body, keywords)
                    VALUES ('delete', old.seq, old.title, old.body, old.keywords);
                    INSERT INTO kb_fts(rowid, title, body, keywords)
                    VALUES (new.seq, new.title, new.body, new.keywords);
                END
                "#,
            ),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_kb_articles_source ON kb_articles(source_path)"),
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS inventory_records (
                    id TEXT PRIMARY KEY,
                    source_file TEXT NOT NULL,
                    source_type TEXT NOT NULL,
                    serial_number TEXT,
                    username TEXT,
                    display_name TEXT,
                    asset_tag TEXT,
                    phone TEXT,
                    raw_json TEXT NOT NULL DEFAULT '{}',
                    imported_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_serial ON inventory_records(serial_number)"),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_username ON inventory_records(username)"),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_display ON inventory_records(display_name)"),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_asset_tag ON inventory_records(asset_tag)"),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_phone ON inventory_records(phone)"),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_inventory_source ON inventory_records(source_file)"),
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS file_fingerprints (
                    path TEXT PRIMARY KEY,
                    content_hash TEXT NOT NULL,
                    modified_at INTEGER NOT NULL,
                    imported_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS diagnostics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    level TEXT NOT NULL,
                    category TEXT NOT NULL,
                    message TEXT NOT NULL,
                    details TEXT,
                    created_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_diagnostics_created_at ON diagnostics(created_at)"),
        ],
    },
    Migration {
        version: 2,
        name: "inventory os version and model",
        steps: &[
            Step::AddColumn {
                table: "inventory_records",
                column: "os_version",
                decl: "TEXT",
            },
            Step::AddColumn {
                table: "inventory_records",
                column: "model",
                decl: "TEXT",
            },
        ],
    },
    Migration {
        version: 3,
        name: "templates, ticket history, preferences",
        steps: &[
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS response_templates (
                    name TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS ticket_history (
                    ticket_number TEXT PRIMARY KEY,
                    device TEXT,
                    serial_number TEXT,
                    issue TEXT,
                    state TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
            ),
            Step::Sql(
                r#"
                CREATE TABLE IF NOT EXISTS ui_preferences (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )
                "#,
            ),
        ],
    },
];

/// Highest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// CLI entry point: connect and migrate the configured database.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply all pending migrations. Returns the resulting schema version.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<i64> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let start = schema_version(pool).await?;
    let mut current = start;

    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        let mut tx = pool.begin().await?;
        for step in migration.steps {
            apply_step(&mut tx, step).await.with_context(|| {
                format!(
                    "migration {} ({}) failed",
                    migration.version, migration.name
                )
            })?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
        current = migration.version;
    }

    Ok(current)
}

/// Current schema version (0 for a fresh database).
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn apply_step(conn: &mut SqliteConnection, step: &Step) -> Result<()> {
    match step {
        Step::Sql(sql) => {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        Step::VirtualTable { name, sql } => {
            // FTS5 CREATE is not idempotent natively, so we check first
            let exists: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(*name)
            .fetch_one(&mut *conn)
            .await?;
            if !exists {
                sqlx::query(sql).execute(&mut *conn).await?;
            }
        }
        Step::AddColumn {
            table,
            column,
            decl,
        } => {
            if !column_exists(conn, table, column).await? {
                let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
                sqlx::query(&sql).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}
