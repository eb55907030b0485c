//! Storage abstraction for Triage Harness.
//!
//! The repository traits define every storage operation the import pipeline
//! and retrieval engine need, so the engine runs unchanged against SQLite
//! ([`sqlite::SqliteStore`]) or the in-memory test double
//! ([`memory::InMemoryStore`]).
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`KnowledgeStore`] | KB articles and keyword matching |
//! | [`InventoryStore`] | Inventory records, lookup, linking |
//! | [`ImportLedger`] | File fingerprints, dataset reset, index upkeep |
//!
//! Multi-statement mutations (`replace_*`, `clear_dataset`) are atomic:
//! either every row is replaced or none is.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::models::{FileFingerprint, InventoryRecord, KbArticle, LookupField, RankedArticle};

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Replace every article that came from `source_path` with `articles`.
    ///
    /// Returns the number of distinct article ids written.
    async fn replace_articles(&self, source_path: &str, articles: &[KbArticle]) -> Result<usize>;

    /// Articles whose indexed text prefix-matches every token, best first.
    async fn match_articles(&self, tokens: &[String], limit: i64) -> Result<Vec<RankedArticle>>;

    async fn get_article(&self, id: &str) -> Result<Option<KbArticle>>;

    async fn count_articles(&self) -> Result<i64>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Delete every record from `source_file`, then insert `records`.
    async fn replace_inventory(
        &self,
        source_file: &str,
        records: &[InventoryRecord],
    ) -> Result<usize>;

    /// Field-routed lookup: serial is exact on the normalized serial, other
    /// fields match substrings, [`LookupField::Any`] ORs all of them.
    async fn lookup_inventory(
        &self,
        text: &str,
        field: LookupField,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>>;

    /// Records whose serial equals `serial` or whose username contains
    /// `username`. Both are optional; with neither, nothing matches.
    async fn find_linked(
        &self,
        serial: Option<&str>,
        username: Option<&str>,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>>;

    async fn count_inventory(&self) -> Result<i64>;
}

#[async_trait]
pub trait ImportLedger: Send + Sync {
    /// Persisted fingerprints keyed by absolute path.
    async fn fingerprints(&self) -> Result<HashMap<String, FileFingerprint>>;

    async fn commit_fingerprint(&self, fingerprint: &FileFingerprint) -> Result<()>;

    /// Remove all KB articles, inventory records, and fingerprints.
    async fn clear_dataset(&self) -> Result<()>;

    /// Rebuild search statistics and compact indexes after an import.
    async fn optimize(&self) -> Result<()>;
}

/// Everything the engine needs from a backend.
pub trait Store: KnowledgeStore + InventoryStore + ImportLedger {}

impl<T: KnowledgeStore + InventoryStore + ImportLedger> Store for T {}

/// Rows a batch leaves behind: later duplicates of an id overwrite earlier ones.
pub(crate) fn distinct_article_count(articles: &[KbArticle]) -> usize {
    articles
        .iter()
        .map(|a| a.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Escape `%`, `_`, and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("jdoe"), "%jdoe%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
