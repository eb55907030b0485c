//! In-memory [`Store`](super::Store) implementation for tests.
//!
//! Keeps articles, inventory, and fingerprints in `Vec`/`HashMap` behind
//! `std::sync::RwLock`. Keyword matching approximates the FTS index: an
//! article matches when every query token is a prefix of one of its indexed
//! tokens, and its pseudo-rank is the negated number of prefix hits.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{distinct_article_count, ImportLedger, InventoryStore, KnowledgeStore};
use crate::models::{
    normalize_serial, FileFingerprint, InventoryRecord, KbArticle, LookupField, RankedArticle,
};
use crate::normalize::tokenize;

pub struct InMemoryStore {
    articles: RwLock<Vec<KbArticle>>,
    inventory: RwLock<Vec<InventoryRecord>>,
    fingerprints: RwLock<HashMap<String, FileFingerprint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            articles: RwLock::new(Vec::new()),
            inventory: RwLock::new(Vec::new()),
            fingerprints: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn contains_ci(haystack: &Option<String>, needle: &str) -> bool {
    haystack
        .as_deref()
        .is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn indexed_tokens(article: &KbArticle) -> Vec<String> {
    let mut tokens = tokenize(&article.title);
    tokens.extend(tokenize(&article.body));
    tokens.extend(article.keywords.iter().map(|k| k.to_lowercase()));
    tokens
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn replace_articles(&self, source_path: &str, articles: &[KbArticle]) -> Result<usize> {
        let mut stored = self.articles.write().map_err(poisoned)?;
        stored.retain(|a| a.source_path != source_path);
        for article in articles {
            stored.retain(|a| a.id != article.id);
            stored.push(article.clone());
        }
        Ok(distinct_article_count(articles))
    }

    async fn match_articles(&self, tokens: &[String], limit: i64) -> Result<Vec<RankedArticle>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.articles.read().map_err(poisoned)?;
        let mut ranked: Vec<RankedArticle> = stored
            .iter()
            .filter_map(|article| {
                let indexed = indexed_tokens(article);
                let mut hits = 0usize;
                for token in tokens {
                    let n = indexed.iter().filter(|t| t.starts_with(token.as_str())).count();
                    if n == 0 {
                        return None;
                    }
                    hits += n;
                }
                Some(RankedArticle {
                    article: article.clone(),
                    rank: -(hits as f64),
                })
            })
            .collect();

        ranked.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }

    async fn get_article(&self, id: &str) -> Result<Option<KbArticle>> {
        let stored = self.articles.read().map_err(poisoned)?;
        Ok(stored.iter().find(|a| a.id == id).cloned())
    }

    async fn count_articles(&self) -> Result<i64> {
        Ok(self.articles.read().map_err(poisoned)?.len() as i64)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn replace_inventory(
        &self,
        source_file: &str,
        records: &[InventoryRecord],
    ) -> Result<usize> {
        let mut stored = self.inventory.write().map_err(poisoned)?;
        stored.retain(|r| r.source_file != source_file);
        stored.extend(records.iter().map(|r| InventoryRecord {
            source_file: source_file.to_string(),
            serial_number: r.serial_number.as_deref().map(normalize_serial),
            ..r.clone()
        }));
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
        let serial = normalize_serial(text);
        let any = field == LookupField::Any;
        let stored = self.inventory.read().map_err(poisoned)?;
        Ok(stored
            .iter()
            .filter(|r| {
                ((any || field == LookupField::Serial)
                    && r.serial_number.as_deref() == Some(serial.as_str()))
                    || ((any || field == LookupField::Display) && contains_ci(&r.display_name, text))
                    || ((any || field == LookupField::Username) && contains_ci(&r.username, text))
                    || ((any || field == LookupField::AssetTag) && contains_ci(&r.asset_tag, text))
                    || ((any || field == LookupField::Phone) && contains_ci(&r.phone, text))
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_linked(
        &self,
        serial: Option<&str>,
        username: Option<&str>,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let serial = serial.map(normalize_serial).filter(|s| !s.is_empty());
        let username = username.map(str::trim).filter(|u| !u.is_empty());
        if serial.is_none() && username.is_none() {
            return Ok(Vec::new());
        }
        let stored = self.inventory.read().map_err(poisoned)?;
        Ok(stored
            .iter()
            .filter(|r| {
                serial
                    .as_deref()
                    .is_some_and(|s| r.serial_number.as_deref() == Some(s))
                    || username.is_some_and(|u| contains_ci(&r.username, u))
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_inventory(&self) -> Result<i64> {
        Ok(self.inventory.read().map_err(poisoned)?.len() as i64)
    }
}

#[async_trait]
impl ImportLedger for InMemoryStore {
    async fn fingerprints(&self) -> Result<HashMap<String, FileFingerprint>> {
        Ok(self.fingerprints.read().map_err(poisoned)?.clone())
    }

    async fn commit_fingerprint(&self, fingerprint: &FileFingerprint) -> Result<()> {
        self.fingerprints
            .write()
            .map_err(poisoned)?
            .insert(fingerprint.path.clone(), fingerprint.clone());
        Ok(())
    }

    async fn clear_dataset(&self) -> Result<()> {
        self.articles.write().map_err(poisoned)?.clear();
        self.inventory.write().map_err(poisoned)?.clear();
        self.fingerprints.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn optimize(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::build_article;

    #[tokio::test]
    async fn prefix_matching_requires_every_token() {
        let store = InMemoryStore::new();
        store
            .replace_articles(
                "/d/a.md",
                &[build_article("a".into(), "Outlook login", "Sign in again", "/d/a.md")],
            )
            .await
            .unwrap();
        let hit = store
            .match_articles(&["outl".into(), "login".into()], 5)
            .await
            .unwrap();
        assert_eq!(hit.len(), 1);
        assert!(hit[0].rank < 0.0);

        let miss = store
            .match_articles(&["outlook".into(), "printer".into()], 5)
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_batch_count_once() {
        let store = InMemoryStore::new();
        let written = store
            .replace_articles(
                "/d/kb.jsonl",
                &[
                    build_article("KB-1".into(), "Old title", "Old body", "/d/kb.jsonl"),
                    build_article("KB-1".into(), "New title", "New body", "/d/kb.jsonl"),
                    build_article("KB-2".into(), "VPN", "Reconnect", "/d/kb.jsonl"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count_articles().await.unwrap(), 2);
        let kept = store.get_article("KB-1").await.unwrap().unwrap();
        assert_eq!(kept.title, "New title");
    }

    #[tokio::test]
    async fn linked_lookup_matches_serial_or_username() {
        let store = InMemoryStore::new();
        let record = InventoryRecord {
            id: "1".into(),
            source_file: "assets.jsonl".into(),
            source_type: crate::models::SourceType::Asset,
            serial_number: Some("c02 abc".into()),
            username: Some("jdoe".into()),
            display_name: None,
            asset_tag: None,
            phone: None,
            os_version: None,
            model: None,
            raw_json: "{}".into(),
        };
        store.replace_inventory("assets.jsonl", &[record]).await.unwrap();

        assert_eq!(store.find_linked(Some("C02ABC"), None, 5).await.unwrap().len(), 1);
        assert_eq!(store.find_linked(None, Some("JDO"), 5).await.unwrap().len(), 1);
        assert!(store.find_linked(None, None, 5).await.unwrap().is_empty());
    }
}
