//! Dataset import pipeline.
//!
//! Coordinates the full import flow: discovery → fingerprint preflight →
//! dataset clear → per-file role detection and normalization → storage →
//! index maintenance. An unchanged dataset is a no-op; any change triggers a
//! full refresh. Per-file failures are logged and reported as skipped, never
//! fatal to the batch.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::config::{Config, DatasetConfig};
use crate::diagnostics::DiagnosticsSink;
use crate::discover::{self, FileRole};
use crate::extract::TextExtractor;
use crate::inventory_import;
use crate::kb_import;
use crate::models::{FileFingerprint, Severity, SourceType};
use crate::store::{ImportLedger, InventoryStore, KnowledgeStore, Store};
use crate::workspace::Workspace;

/// A file the import did not turn into records, with the reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported_files: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
    /// Records written per imported file.
    pub record_counts: BTreeMap<String, usize>,
    /// Preflight found nothing to do.
    pub unchanged: bool,
}

impl ImportReport {
    pub fn total_records(&self) -> usize {
        self.record_counts.values().sum()
    }

    fn skip(&mut self, path: &str, reason: impl Into<String>) {
        self.skipped_files.push(SkippedFile {
            path: path.to_string(),
            reason: reason.into(),
        });
    }
}

pub const REASON_UNCHANGED: &str = "unchanged since last import";
pub const REASON_POLICY: &str = "workflow policy (loaded separately)";
pub const REASON_UNSUPPORTED: &str = "unsupported format";

/// Import every dataset file under `dataset.root`.
///
/// `force` skips the fingerprint preflight and always refreshes.
///
/// # Errors
///
/// Only store-level failures (reading the ledger, clearing the dataset,
/// index maintenance) are returned. Individual file failures are recorded
/// in [`ImportReport::skipped_files`].
pub async fn import_dataset(
    store: &dyn Store,
    extractor: &dyn TextExtractor,
    diagnostics: &dyn DiagnosticsSink,
    dataset: &DatasetConfig,
    force: bool,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    let files = discover::discover_files(dataset)?;
    if files.is_empty() {
        report.skip(
            &dataset.root.display().to_string(),
            "no supported dataset files found",
        );
        diagnostics
            .append(
                Severity::Warning,
                "import",
                "No dataset files discovered",
                Some(&dataset.root.display().to_string()),
            )
            .await;
        return Ok(report);
    }

    let current: Vec<(String, Option<FileFingerprint>)> = files
        .iter()
        .map(|p| {
            let fp = discover::fingerprint_file(p)
                .map_err(|e| debug!(path = %p.display(), error = %e, "fingerprint failed"))
                .ok();
            (p.to_string_lossy().to_string(), fp)
        })
        .collect();

    let persisted = store.fingerprints().await?;
    if !force && !dataset_changed(&current, &persisted) {
        info!(files = files.len(), "dataset unchanged, skipping import");
        report.unchanged = true;
        for (path, _) in &current {
            report.skip(path, REASON_UNCHANGED);
        }
        return Ok(report);
    }

    store.clear_dataset().await?;

    for (path, fingerprint) in &current {
        let file = Path::new(path);
        let role = discover::detect_role(file);
        debug!(path, ?role, "importing dataset file");

        let outcome = match role {
            FileRole::WorkflowPolicy => {
                report.skip(path, REASON_POLICY);
                commit(store, fingerprint.as_ref()).await?;
                continue;
            }
            FileRole::Unsupported => {
                report.skip(path, REASON_UNSUPPORTED);
                commit(store, fingerprint.as_ref()).await?;
                continue;
            }
            FileRole::KnowledgeBase => import_kb_file(store, extractor, file).await,
            FileRole::Inventory(source_type) => {
                import_inventory_file(store, file, source_type).await
            }
        };

        match outcome {
            Ok(count) => {
                report.imported_files.push(path.clone());
                report.record_counts.insert(path.clone(), count);
                commit(store, fingerprint.as_ref()).await?;
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                diagnostics
                    .append(
                        Severity::Warning,
                        "import",
                        "Failed to import dataset file",
                        Some(&format!("{}: {}", path, reason)),
                    )
                    .await;
                report.skip(path, reason);
            }
        }
    }

    if !report.imported_files.is_empty() {
        store.optimize().await.context("index maintenance failed")?;
    }

    diagnostics
        .append(
            Severity::Info,
            "import",
            "Dataset import finished",
            Some(&format!(
                "imported={} skipped={} records={}",
                report.imported_files.len(),
                report.skipped_files.len(),
                report.total_records()
            )),
        )
        .await;

    Ok(report)
}

/// True when any file is new, modified, unreadable, or has disappeared
/// since the last recorded import.
fn dataset_changed(
    current: &[(String, Option<FileFingerprint>)],
    persisted: &std::collections::HashMap<String, FileFingerprint>,
) -> bool {
    let any_differs = current.iter().any(|(path, fp)| match fp {
        Some(fp) => persisted.get(path) != Some(fp),
        None => true,
    });
    let seen: HashSet<&str> = current.iter().map(|(p, _)| p.as_str()).collect();
    let any_removed = persisted.keys().any(|p| !seen.contains(p.as_str()));
    any_differs || any_removed
}

async fn commit(store: &dyn Store, fingerprint: Option<&FileFingerprint>) -> Result<()> {
    if let Some(fp) = fingerprint {
        store.commit_fingerprint(fp).await?;
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn import_kb_file(
    store: &dyn Store,
    extractor: &dyn TextExtractor,
    path: &Path,
) -> Result<usize> {
    let source_path = path.to_string_lossy().to_string();
    let articles = match discover::extension(path).as_str() {
        "jsonl" => kb_import::articles_from_jsonl(&read_text(path)?, &source_path)?.articles,
        "json" => kb_import::articles_from_json(&read_text(path)?, &source_path)?.articles,
        "txt" | "md" | "markdown" | "log" => {
            kb_import::article_from_document(&read_text(path)?, &source_path)
                .into_iter()
                .collect()
        }
        _ => {
            let text = extractor.extract(path)?;
            text.and_then(|t| kb_import::article_from_document(&t, &source_path))
                .into_iter()
                .collect()
        }
    };
    store.replace_articles(&source_path, &articles).await
}

async fn import_inventory_file(
    store: &dyn Store,
    path: &Path,
    source_type: SourceType,
) -> Result<usize> {
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let content = read_text(path)?;

    let batch = match discover::extension(path).as_str() {
        "csv" => inventory_import::records_from_csv(&content, &source_file, source_type),
        "jsonl" => inventory_import::records_from_jsonl(&content, &source_file, source_type)?,
        _ => inventory_import::records_from_json(&content, &source_file, source_type)?,
    };
    if batch.dropped > 0 {
        debug!(path = %path.display(), dropped = batch.dropped, "inventory rows dropped");
    }
    store.replace_inventory(&source_file, &batch.records).await
}

/// CLI entry point for `triage import`.
pub async fn run_import(config: &Config, force: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let report = workspace.import(force).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("import {}", config.dataset.root.display());
    if report.unchanged {
        println!("  dataset unchanged ({} files)", report.skipped_files.len());
        println!("ok");
        return Ok(());
    }
    println!("  imported files: {}", report.imported_files.len());
    for path in &report.imported_files {
        let count = report.record_counts.get(path).copied().unwrap_or(0);
        println!("    {} ({} records)", path, count);
    }
    println!("  skipped files: {}", report.skipped_files.len());
    for skipped in &report.skipped_files {
        println!("    {} ({})", skipped.path, skipped.reason);
    }
    println!("  records written: {}", report.total_records());
    println!("ok");
    Ok(())
}
