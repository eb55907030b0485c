//! SQLite-backed [`Store`](super::Store) implementation.
//!
//! Wraps a [`SqlitePool`] and maps each repository operation onto the schema
//! created by [`crate::migrate`]: `kb_articles` mirrored into the `kb_fts`
//! FTS5 index by triggers, `inventory_records`, and `file_fingerprints`.
//! Also hosts the small auxiliary tables (response templates, ticket
//! history, UI preferences) the CLI reads and writes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::{distinct_article_count, like_pattern, ImportLedger, InventoryStore, KnowledgeStore};
use crate::models::{
    normalize_serial, FileFingerprint, IntakeRecord, InventoryRecord, KbArticle, LookupField,
    RankedArticle, SourceType,
};

/// SQLite implementation of the repository traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// A saved response template.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseTemplate {
    pub name: String,
    pub body: String,
    pub updated_at: i64,
}

/// Last known state of a tracked ticket.
#[derive(Debug, Clone, Serialize)]
pub struct TicketHistoryEntry {
    pub ticket_number: String,
    pub device: Option<String>,
    pub serial_number: Option<String>,
    pub issue: Option<String>,
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Response templates ============

    /// Insert or replace a template by name.
    pub async fn upsert_template(&self, name: &str, body: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO response_templates (name, body, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_templates(&self) -> Result<Vec<ResponseTemplate>> {
        let rows = sqlx::query("SELECT name, body, updated_at FROM response_templates ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ResponseTemplate {
                name: row.get("name"),
                body: row.get("body"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Returns `true` when a template was deleted.
    pub async fn delete_template(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM response_templates WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Ticket history ============

    /// Record the latest intake state of a ticket, keyed by ticket number.
    pub async fn upsert_ticket(&self, intake: &IntakeRecord, state: &str) -> Result<()> {
        let ticket = match intake.ticket_id.as_deref() {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => return Ok(()),
        };
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO ticket_history (ticket_number, device, serial_number, issue, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket_number) DO UPDATE SET
                device = excluded.device,
                serial_number = excluded.serial_number,
                issue = excluded.issue,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ticket)
        .bind(intake.device.as_str())
        .bind(intake.normalized_serial())
        .bind(&intake.issue)
        .bind(state)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_tickets(&self, limit: i64) -> Result<Vec<TicketHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT ticket_number, device, serial_number, issue, state, created_at, updated_at
            FROM ticket_history
            ORDER BY updated_at DESC, ticket_number ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| TicketHistoryEntry {
                ticket_number: row.get("ticket_number"),
                device: row.get("device"),
                serial_number: row.get("serial_number"),
                issue: row.get("issue"),
                state: row.get("state"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    // ============ UI preferences ============

    pub async fn preference(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM ui_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Advance a persisted counter and return its new value (0 on first use).
    pub async fn next_counter(&self, key: &str) -> Result<i64> {
        let value: String = sqlx::query_scalar(
            r#"
            INSERT INTO ui_preferences (key, value) VALUES (?, '0')
            ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        value
            .parse()
            .with_context(|| format!("preference '{}' is not a counter: {}", key, value))
    }
}

fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn article_from_row(row: &SqliteRow) -> KbArticle {
    let keywords: String = row.get("keywords");
    KbArticle {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        source_path: row.get("source_path"),
        tags: json_list(&row.get::<String, _>("tags_json")),
        platforms: json_list(&row.get::<String, _>("platforms_json")),
        apps: json_list(&row.get::<String, _>("apps_json")),
        keywords: keywords.split_whitespace().map(str::to_string).collect(),
    }
}

fn inventory_from_row(row: &SqliteRow) -> InventoryRecord {
    let source_type: String = row.get("source_type");
    InventoryRecord {
        id: row.get("id"),
        source_file: row.get("source_file"),
        source_type: SourceType::parse(&source_type),
        serial_number: row.get("serial_number"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        asset_tag: row.get("asset_tag"),
        phone: row.get("phone"),
        os_version: row.get("os_version"),
        model: row.get("model"),
        raw_json: row.get("raw_json"),
    }
}

/// FTS5 query: every token as a quoted prefix term, AND-combined.
pub fn fts_match_expression(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"*", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

const ARTICLE_COLUMNS: &str =
    "a.id, a.title, a.body, a.source_path, a.tags_json, a.platforms_json, a.apps_json, a.keywords";

const INVENTORY_COLUMNS: &str = "id, source_file, source_type, serial_number, username, display_name, asset_tag, phone, os_version, model, raw_json";

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn replace_articles(&self, source_path: &str, articles: &[KbArticle]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM kb_articles WHERE source_path = ?")
            .bind(source_path)
            .execute(&mut *tx)
            .await?;

        for article in articles {
            sqlx::query(
                r#"
                INSERT INTO kb_articles (id, title, body, source_path, tags_json, platforms_json, apps_json, keywords, imported_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    body = excluded.body,
                    source_path = excluded.source_path,
                    tags_json = excluded.tags_json,
                    platforms_json = excluded.platforms_json,
                    apps_json = excluded.apps_json,
                    keywords = excluded.keywords,
                    imported_at = excluded.imported_at
                "#,
            )
            .bind(&article.id)
            .bind(&article.title)
            .bind(&article.body)
            .bind(&article.source_path)
            .bind(serde_json::to_string(&article.tags)?)
            .bind(serde_json::to_string(&article.platforms)?)
            .bind(serde_json::to_string(&article.apps)?)
            .bind(article.keywords.join(" "))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(distinct_article_count(articles))
    }

    async fn match_articles(&self, tokens: &[String], limit: i64) -> Result<Vec<RankedArticle>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {}, kb_fts.rank AS rank
            FROM kb_fts
            JOIN kb_articles a ON a.seq = kb_fts.rowid
            WHERE kb_fts MATCH ?
            ORDER BY kb_fts.rank
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(fts_match_expression(tokens))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| RankedArticle {
                article: article_from_row(row),
                rank: row.get("rank"),
            })
            .collect())
    }

    async fn get_article(&self, id: &str) -> Result<Option<KbArticle>> {
        let sql = format!("SELECT {} FROM kb_articles a WHERE a.id = ?", ARTICLE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(article_from_row))
    }

    async fn count_articles(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM kb_articles")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn replace_inventory(
        &self,
        source_file: &str,
        records: &[InventoryRecord],
    ) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM inventory_records WHERE source_file = ?")
            .bind(source_file)
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO inventory_records (id, source_file, source_type, serial_number, username,
                                               display_name, asset_tag, phone, os_version, model,
                                               raw_json, imported_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(source_file)
            .bind(record.source_type.as_str())
            .bind(record.serial_number.as_deref().map(normalize_serial))
            .bind(&record.username)
            .bind(&record.display_name)
            .bind(&record.asset_tag)
            .bind(&record.phone)
            .bind(&record.os_version)
            .bind(&record.model)
            .bind(&record.raw_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn lookup_inventory(
        &self,
        text: &str,
        field: LookupField,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let selector = field.as_str();
        let serial = normalize_serial(text);
        let pattern = like_pattern(text);

        let sql = format!(
            r#"
            SELECT {}
            FROM inventory_records
            WHERE (? IN ('serial', 'any') AND serial_number = ?)
               OR (? IN ('display', 'any') AND display_name LIKE ? ESCAPE '\')
               OR (? IN ('username', 'any') AND username LIKE ? ESCAPE '\')
               OR (? IN ('asset_tag', 'any') AND asset_tag LIKE ? ESCAPE '\')
               OR (? IN ('phone', 'any') AND phone LIKE ? ESCAPE '\')
            LIMIT ?
            "#,
            INVENTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(selector)
            .bind(&serial)
            .bind(selector)
            .bind(&pattern)
            .bind(selector)
            .bind(&pattern)
            .bind(selector)
            .bind(&pattern)
            .bind(selector)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(inventory_from_row).collect())
    }

    async fn find_linked(
        &self,
        serial: Option<&str>,
        username: Option<&str>,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let serial = serial.map(normalize_serial).filter(|s| !s.is_empty());
        let pattern = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(like_pattern);
        if serial.is_none() && pattern.is_none() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM inventory_records
            WHERE (? IS NOT NULL AND serial_number = ?)
               OR (? IS NOT NULL AND username LIKE ? ESCAPE '\')
            LIMIT ?
            "#,
            INVENTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&serial)
            .bind(&serial)
            .bind(&pattern)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(inventory_from_row).collect())
    }

    async fn count_inventory(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM inventory_records")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ImportLedger for SqliteStore {
    async fn fingerprints(&self) -> Result<HashMap<String, FileFingerprint>> {
        let rows = sqlx::query("SELECT path, content_hash, modified_at FROM file_fingerprints")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let fp = FileFingerprint {
                    path: row.get("path"),
                    content_hash: row.get("content_hash"),
                    modified_at: row.get("modified_at"),
                };
                (fp.path.clone(), fp)
            })
            .collect())
    }

    async fn commit_fingerprint(&self, fingerprint: &FileFingerprint) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO file_fingerprints (path, content_hash, modified_at, imported_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_hash = excluded.content_hash,
                modified_at = excluded.modified_at,
                imported_at = excluded.imported_at
            "#,
        )
        .bind(&fingerprint.path)
        .bind(&fingerprint.content_hash)
        .bind(fingerprint.modified_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_dataset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM kb_articles")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM inventory_records")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM file_fingerprints")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn optimize(&self) -> Result<()> {
        sqlx::query("INSERT INTO kb_fts(kb_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO kb_fts(kb_fts) VALUES('optimize')")
            .execute(&self.pool)
            .await?;
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        sqlx::query("PRAGMA optimize").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::normalize::build_article;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let pool = db::connect_path(&dir.path().join("t.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn record(id: &str, serial: Option<&str>, user: Option<&str>) -> InventoryRecord {
        InventoryRecord {
            id: id.into(),
            source_file: "managed_macs.jsonl".into(),
            source_type: SourceType::ManagedMac,
            serial_number: serial.map(str::to_string),
            username: user.map(str::to_string),
            display_name: Some("Jane's MacBook".into()),
            asset_tag: Some("AT-100".into()),
            phone: None,
            os_version: Some("14.5".into()),
            model: Some("MacBook Pro".into()),
            raw_json: "{}".into(),
        }
    }

    #[test]
    fn match_expression_quotes_prefix_terms() {
        let tokens = vec!["outlook".to_string(), "login".to_string()];
        assert_eq!(fts_match_expression(&tokens), "\"outlook\"* AND \"login\"*");
    }

    #[tokio::test]
    async fn replace_articles_is_scoped_to_source() {
        let (_dir, store) = store().await;
        let a = build_article("a".into(), "Outlook login loop", "Reset the keychain", "/d/a.md");
        let b = build_article("b".into(), "VPN drops", "Reinstall GlobalProtect", "/d/b.md");
        store.replace_articles("/d/a.md", &[a]).await.unwrap();
        store.replace_articles("/d/b.md", &[b]).await.unwrap();
        assert_eq!(store.count_articles().await.unwrap(), 2);

        store.replace_articles("/d/a.md", &[]).await.unwrap();
        assert_eq!(store.count_articles().await.unwrap(), 1);
        assert!(store.get_article("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replace_articles_counts_rows_stored() {
        let (_dir, store) = store().await;
        let first = build_article("KB-1".into(), "Outlook login", "Old steps", "/d/kb.jsonl");
        let second = build_article("KB-1".into(), "Outlook login", "New steps", "/d/kb.jsonl");
        let written = store
            .replace_articles("/d/kb.jsonl", &[first, second])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.count_articles().await.unwrap(), 1);
        let kept = store.get_article("KB-1").await.unwrap().unwrap();
        assert_eq!(kept.body, "New steps");
    }

    #[tokio::test]
    async fn prefix_match_uses_and_semantics() {
        let (_dir, store) = store().await;
        let a = build_article("a".into(), "Outlook login loop", "Reset the keychain entry", "/d/a.md");
        let b = build_article("b".into(), "Outlook calendar", "Sync delays", "/d/b.md");
        store.replace_articles("/d/a.md", &[a]).await.unwrap();
        store.replace_articles("/d/b.md", &[b]).await.unwrap();

        let hits = store
            .match_articles(&["outl".to_string(), "log".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article.id, "a");
        assert!(hits[0].article.apps.contains(&"outlook".to_string()));
    }

    #[tokio::test]
    async fn inventory_lookup_routes_by_field() {
        let (_dir, store) = store().await;
        store
            .replace_inventory(
                "managed_macs.jsonl",
                &[record("1", Some("c02 abc 12345"), Some("jdoe"))],
            )
            .await
            .unwrap();

        let by_serial = store
            .lookup_inventory("C02ABC12345", LookupField::Serial, 10)
            .await
            .unwrap();
        assert_eq!(by_serial.len(), 1);
        assert_eq!(by_serial[0].serial_number.as_deref(), Some("C02ABC12345"));

        let partial_serial = store
            .lookup_inventory("C02ABC", LookupField::Serial, 10)
            .await
            .unwrap();
        assert!(partial_serial.is_empty());

        let by_user = store
            .lookup_inventory("JDO", LookupField::Username, 10)
            .await
            .unwrap();
        assert_eq!(by_user.len(), 1);

        let any = store
            .lookup_inventory("AT-1", LookupField::Any, 10)
            .await
            .unwrap();
        assert_eq!(any.len(), 1);

        let wrong_field = store
            .lookup_inventory("jdoe", LookupField::Phone, 10)
            .await
            .unwrap();
        assert!(wrong_field.is_empty());
    }

    #[tokio::test]
    async fn inventory_replace_is_source_scoped() {
        let (_dir, store) = store().await;
        store
            .replace_inventory("managed_macs.jsonl", &[record("1", Some("A1"), None)])
            .await
            .unwrap();
        let mut other = record("2", Some("B2"), None);
        other.source_file = "assets.jsonl".into();
        store
            .replace_inventory("assets.jsonl", &[other])
            .await
            .unwrap();
        store
            .replace_inventory("managed_macs.jsonl", &[record("3", Some("A3"), None)])
            .await
            .unwrap();
        assert_eq!(store.count_inventory().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clear_dataset_removes_everything() {
        let (_dir, store) = store().await;
        store
            .replace_inventory("managed_macs.jsonl", &[record("1", Some("A1"), None)])
            .await
            .unwrap();
        store
            .commit_fingerprint(&FileFingerprint {
                path: "/d/x".into(),
                content_hash: "h".into(),
                modified_at: 1,
            })
            .await
            .unwrap();
        store.clear_dataset().await.unwrap();
        assert_eq!(store.count_inventory().await.unwrap(), 0);
        assert!(store.fingerprints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn templates_and_tickets_upsert_by_key() {
        let (_dir, store) = store().await;
        store.upsert_template("greeting", "Hi").await.unwrap();
        store.upsert_template("greeting", "Hello").await.unwrap();
        let templates = store.list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].body, "Hello");
        assert!(store.delete_template("greeting").await.unwrap());
        assert!(!store.delete_template("greeting").await.unwrap());

        let mut intake = IntakeRecord {
            ticket_id: Some("INC1".into()),
            ..Default::default()
        };
        store.upsert_ticket(&intake, "unknown_or_non_apple").await.unwrap();
        intake.serial = Some("c02 x".into());
        store.upsert_ticket(&intake, "missing_issue").await.unwrap();
        let tickets = store.list_tickets(10).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].state, "missing_issue");
        assert_eq!(tickets[0].serial_number.as_deref(), Some("C02X"));
    }

    #[tokio::test]
    async fn counters_start_at_zero_and_increment() {
        let (_dir, store) = store().await;
        assert_eq!(store.next_counter("opener").await.unwrap(), 0);
        assert_eq!(store.next_counter("opener").await.unwrap(), 1);
        assert_eq!(store.preference("opener").await.unwrap().as_deref(), Some("1"));
    }
}
