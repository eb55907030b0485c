//! Dataset discovery, fingerprinting, and file role detection.
//!
//! Discovery walks the dataset root with `walkdir`, keeps files with a
//! supported extension, adds configured well-known files, drops excluded
//! paths, and returns canonical paths in sorted order so every import
//! processes files in the same sequence.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::DatasetConfig;
use crate::models::{FileFingerprint, SourceType};
use crate::{inventory_import, jsonl, policy};

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jsonl", "json", "csv", "txt", "md", "markdown", "pdf", "docx", "doc", "rtf", "xlsx", "xls",
    "log",
];

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Bytes sniffed when classifying a JSONL file by content.
const SNIFF_BYTES: usize = 64 * 1024;

/// What the import pipeline does with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    WorkflowPolicy,
    KnowledgeBase,
    Inventory(SourceType),
    Unsupported,
}

pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension(path).as_str())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Discover dataset files under `config.root`.
///
/// A missing root yields an empty list rather than an error.
pub fn discover_files(config: &DatasetConfig) -> Result<Vec<PathBuf>> {
    let root = &config.root;
    let mut found = BTreeSet::new();

    for name in &config.well_known_files {
        let path = root.join(name);
        if path.is_file() {
            found.insert(canonical(&path));
        }
    }
    if let Some(policy) = &config.policy_file {
        if policy.is_file() {
            found.insert(canonical(policy));
        }
    }

    if !root.is_dir() {
        debug!(root = %root.display(), "dataset root does not exist");
        return Ok(found.into_iter().collect());
    }

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable dataset entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) || !is_supported(path) {
            continue;
        }
        found.insert(canonical(path));
    }

    Ok(found.into_iter().collect())
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// SHA-256 content hash and modification time of a file.
pub fn fingerprint_file(path: &Path) -> Result<FileFingerprint> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let modified_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(FileFingerprint {
        path: path.to_string_lossy().to_string(),
        content_hash: format!("{:x}", Sha256::digest(&bytes)),
        modified_at,
    })
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn kb_name_hint(name: &str) -> bool {
    ["kb", "knowledge", "article", "faq", "runbook"]
        .iter()
        .any(|h| name.contains(h))
}

/// First record of a JSON / JSONL file. JSONL is read from a bounded prefix.
fn sniff_record(path: &Path) -> Option<serde_json::Value> {
    use std::io::Read;

    if extension(path) != "jsonl" {
        let text = std::fs::read_to_string(path).ok()?;
        return jsonl::parse_json(&text).ok()?.into_iter().next();
    }

    let mut buf = Vec::new();
    std::fs::File::open(path)
        .ok()?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut buf)
        .ok()?;
    String::from_utf8_lossy(&buf)
        .lines()
        .map(|l| l.trim().trim_start_matches('\u{feff}'))
        .filter(|l| !l.is_empty())
        .find_map(|l| serde_json::from_str(l).ok())
}

/// Classify a file by name, extension, and (for JSON) content.
pub fn detect_role(path: &Path) -> FileRole {
    if policy::is_policy_file(path) {
        return FileRole::WorkflowPolicy;
    }
    let name = name_of(path);
    match extension(path).as_str() {
        "txt" | "md" | "markdown" | "log" | "pdf" | "docx" | "doc" | "rtf" | "xlsx" | "xls" => {
            FileRole::KnowledgeBase
        }
        "csv" => FileRole::Inventory(SourceType::from_file_name(&name)),
        "json" | "jsonl" => {
            if kb_name_hint(&name) {
                return FileRole::KnowledgeBase;
            }
            let by_name = SourceType::from_file_name(&name);
            if by_name != SourceType::Unknown {
                return FileRole::Inventory(by_name);
            }
            // Records without identity fields import as articles; ones
            // without text fall back to their pretty-printed JSON.
            match sniff_record(path) {
                Some(record) if inventory_import::looks_like_inventory(&record) => {
                    FileRole::Inventory(SourceType::Unknown)
                }
                Some(_) => FileRole::KnowledgeBase,
                None => FileRole::Unsupported,
            }
        }
        _ => FileRole::Unsupported,
    }
}
