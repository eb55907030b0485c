//! Workspace facade: one store, one diagnostics sink, one extractor, and the
//! single-writer gate around them.
//!
//! Imports take the write half of a `tokio::sync::RwLock`; searches and
//! lookups take the read half, so reads run concurrently with each other but
//! never observe an import in progress.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{Config, DatasetConfig, RetrievalConfig};
use crate::db;
use crate::diagnostics::{DiagnosticsSink, MemoryDiagnostics, SqliteDiagnostics};
use crate::discover::{self, FileRole};
use crate::extract::{DocumentExtractor, TextExtractor};
use crate::ingest::{self, ImportReport};
use crate::migrate;
use crate::models::{InventoryRecord, KbHit, KbQuery, LinkedContext, LookupField};
use crate::policy::WorkflowPolicy;
use crate::retrieval::{self, RetrievalParams};
use crate::store::memory::InMemoryStore;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub struct Workspace {
    store: Arc<dyn Store>,
    sqlite: Option<SqliteStore>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    extractor: Arc<dyn TextExtractor>,
    dataset: DatasetConfig,
    retrieval: RetrievalConfig,
    params: RetrievalParams,
    retention_days: i64,
    gate: RwLock<()>,
}

impl Workspace {
    /// Open (and migrate) the configured SQLite database.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let sqlite = SqliteStore::new(pool.clone());

        Ok(Self {
            store: Arc::new(sqlite.clone()),
            sqlite: Some(sqlite),
            diagnostics: Arc::new(SqliteDiagnostics::new(pool)),
            extractor: Arc::new(DocumentExtractor),
            dataset: config.dataset.clone(),
            retrieval: config.retrieval.clone(),
            params: RetrievalParams::from(&config.retrieval),
            retention_days: config.diagnostics.retention_days,
            gate: RwLock::new(()),
        })
    }

    /// A workspace backed entirely by memory. `config.db` is ignored.
    pub fn in_memory(config: &Config) -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            sqlite: None,
            diagnostics: Arc::new(MemoryDiagnostics::new()),
            extractor: Arc::new(DocumentExtractor),
            dataset: config.dataset.clone(),
            retrieval: config.retrieval.clone(),
            params: RetrievalParams::from(&config.retrieval),
            retention_days: config.diagnostics.retention_days,
            gate: RwLock::new(()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The SQLite store, when this workspace is database-backed.
    pub fn sqlite(&self) -> Option<&SqliteStore> {
        self.sqlite.as_ref()
    }

    pub fn diagnostics(&self) -> &dyn DiagnosticsSink {
        self.diagnostics.as_ref()
    }

    pub fn retrieval_config(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    pub fn dataset(&self) -> &DatasetConfig {
        &self.dataset
    }

    /// Import the dataset under the write gate, then prune old diagnostics.
    pub async fn import(&self, force: bool) -> Result<ImportReport> {
        let _guard = self.gate.write().await;
        let report = ingest::import_dataset(
            self.store.as_ref(),
            self.extractor.as_ref(),
            self.diagnostics.as_ref(),
            &self.dataset,
            force,
        )
        .await?;

        match self.diagnostics.prune(self.retention_days).await {
            Ok(0) => {}
            Ok(n) => debug!(pruned = n, "pruned diagnostics"),
            Err(e) => warn!(error = %e, "failed to prune diagnostics"),
        }
        Ok(report)
    }

    pub async fn search(&self, query: &KbQuery) -> Result<Vec<KbHit>> {
        let _guard = self.gate.read().await;
        retrieval::search_kb(self.store.as_ref(), query, &self.params).await
    }

    pub async fn lookup(
        &self,
        text: &str,
        field: LookupField,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let _guard = self.gate.read().await;
        retrieval::lookup_inventory(self.store.as_ref(), text, field, limit).await
    }

    pub async fn linked_context(
        &self,
        serial: Option<&str>,
        username: Option<&str>,
    ) -> Result<LinkedContext> {
        let _guard = self.gate.read().await;
        retrieval::linked_context(self.store.as_ref(), serial, username, &self.params).await
    }

    /// The workflow policy: the configured file, else the first policy file
    /// found in the dataset, else built-in defaults.
    pub fn policy(&self) -> WorkflowPolicy {
        if let Some(path) = &self.dataset.policy_file {
            return WorkflowPolicy::load(path);
        }
        let discovered = discover::discover_files(&self.dataset).unwrap_or_default();
        match discovered
            .iter()
            .find(|p| discover::detect_role(p) == FileRole::WorkflowPolicy)
        {
            Some(path) => WorkflowPolicy::load(path),
            None => WorkflowPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntakeField;
    use crate::store::KnowledgeStore;

    #[test]
    fn policy_is_discovered_in_dataset() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("workflow_policy.json"),
            r#"{"ticket_detection": {"trigger_format": "@@<ticket>"},
                "intake_and_validation": {"required_details": ["device", "serial"]}}"#,
        )
        .unwrap();
        let config = Config::for_paths(dir.path().join("db.sqlite"), dir.path());
        let policy = Workspace::in_memory(&config).policy();
        assert_eq!(policy.ticket_marker, "@@");
        assert!(!policy.requires(IntakeField::Ssid));
    }

    #[test]
    fn missing_policy_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::for_paths(dir.path().join("db.sqlite"), dir.path());
        assert_eq!(
            Workspace::in_memory(&config).policy(),
            WorkflowPolicy::default()
        );
    }

    #[tokio::test]
    async fn open_creates_and_migrates_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::for_paths(dir.path().join("nested/db.sqlite"), dir.path());
        let workspace = Workspace::open(&config).await.unwrap();
        assert!(workspace.sqlite().is_some());
        assert_eq!(workspace.store().count_articles().await.unwrap(), 0);
        assert!(dir.path().join("nested/db.sqlite").exists());
    }
}
