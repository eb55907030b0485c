//! Ranked KB search, inventory lookup, and cross-source linking.
//!
//! Everything here runs through the repository traits in [`crate::store`],
//! so the same algorithms serve the SQLite store and the in-memory store.
//!
//! # KB scoring
//!
//! 1. Tokenize the query (lowercase alphanumeric, length > 1), dedupe, and
//!    cap at `max_query_tokens`.
//! 2. Fetch up to `limit * CANDIDATE_POOL_FACTOR` prefix-AND matches from
//!    the keyword index, so boosts can surface articles below the raw top-N.
//! 3. Base score: `1 / (1 + |rank|)`.
//! 4. Add `device_boost` when the article's platforms contain the preferred
//!    device's platform, `app_boost` when its apps contain the preferred app.
//! 5. Stable sort by adjusted score, descending, then keep `limit`.
//!
//! # Link confidence
//!
//! | Evidence | Confidence |
//! |----------|------------|
//! | a record's serial equals the query serial | 1.0 |
//! | a record's username contains the query username | 0.8 |
//! | any record returned | 0.45 |
//! | nothing | 0.0 |

use anyhow::Result;
use tracing::debug;

use crate::config::{Config, RetrievalConfig};
use crate::models::{
    normalize_serial, InventoryRecord, KbHit, KbQuery, LinkedContext, LookupField, RankedArticle,
};
use crate::normalize::tokenize;
use crate::parser::infer_device;
use crate::store::{InventoryStore, KnowledgeStore};
use crate::workspace::Workspace;

pub const DEFAULT_DEVICE_BOOST: f64 = 0.35;
pub const DEFAULT_APP_BOOST: f64 = 0.25;

/// Raw matches fetched per requested result before reranking.
pub const CANDIDATE_POOL_FACTOR: i64 = 4;

pub const CONFIDENCE_SERIAL: f64 = 1.0;
pub const CONFIDENCE_USERNAME: f64 = 0.8;
pub const CONFIDENCE_ANY: f64 = 0.45;

/// Retrieval tuning, decoupled from the application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub kb_limit: i64,
    pub max_query_tokens: usize,
    pub device_boost: f64,
    pub app_boost: f64,
    pub link_candidate_limit: i64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            kb_limit: config.kb_limit,
            max_query_tokens: config.max_query_tokens,
            device_boost: config.device_boost,
            app_boost: config.app_boost,
            link_candidate_limit: config.link_candidate_limit,
        }
    }
}

/// Query tokens in first-seen order, deduplicated and capped.
pub fn query_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if tokens.len() >= max_tokens {
            break;
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Map a raw index rank to a positive score in `(0, 1]`.
pub fn base_score(rank: f64) -> f64 {
    1.0 / (1.0 + rank.abs())
}

/// Apply device/app preference boosts and sort, keeping index order on ties.
pub fn rerank(
    candidates: Vec<RankedArticle>,
    query: &KbQuery,
    params: &RetrievalParams,
) -> Vec<KbHit> {
    let platform = query.preferred_device.and_then(|d| d.platform_tag());
    let app = query
        .preferred_app
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    let mut hits: Vec<KbHit> = candidates
        .into_iter()
        .map(|candidate| {
            let mut score = base_score(candidate.rank);
            if let Some(platform) = platform {
                if candidate.article.platforms.iter().any(|p| p == platform) {
                    score += params.device_boost;
                }
            }
            if let Some(app) = app {
                if candidate
                    .article
                    .apps
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(app))
                {
                    score += params.app_boost;
                }
            }
            KbHit {
                article: candidate.article,
                score,
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

/// Ranked KB search. An empty token set returns no results.
pub async fn search_kb(
    store: &dyn KnowledgeStore,
    query: &KbQuery,
    params: &RetrievalParams,
) -> Result<Vec<KbHit>> {
    let tokens = query_tokens(&query.text, params.max_query_tokens);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let limit = query.limit.unwrap_or(params.kb_limit).max(1);
    let pool = limit.saturating_mul(CANDIDATE_POOL_FACTOR);
    let candidates = store.match_articles(&tokens, pool).await?;
    debug!(tokens = ?tokens, candidates = candidates.len(), "kb search");
    let mut hits = rerank(candidates, query, params);
    hits.truncate(limit as usize);
    Ok(hits)
}

/// Field-routed inventory lookup.
pub async fn lookup_inventory(
    store: &dyn InventoryStore,
    text: &str,
    field: LookupField,
    limit: i64,
) -> Result<Vec<InventoryRecord>> {
    store.lookup_inventory(text, field, limit.max(1)).await
}

/// Confidence that `records` identify the person/device behind the query.
pub fn link_confidence(
    records: &[InventoryRecord],
    serial: Option<&str>,
    username: Option<&str>,
) -> f64 {
    let serial = serial.map(normalize_serial).filter(|s| !s.is_empty());
    let username = username
        .map(|u| u.trim().to_lowercase())
        .filter(|u| !u.is_empty());

    if let Some(serial) = &serial {
        if records
            .iter()
            .any(|r| r.serial_number.as_deref().map(normalize_serial).as_ref() == Some(serial))
        {
            return CONFIDENCE_SERIAL;
        }
    }
    if let Some(username) = &username {
        if records.iter().any(|r| {
            r.username
                .as_deref()
                .is_some_and(|u| u.to_lowercase().contains(username.as_str()))
        }) {
            return CONFIDENCE_USERNAME;
        }
    }
    if records.is_empty() {
        0.0
    } else {
        CONFIDENCE_ANY
    }
}

/// Inventory records linked to a serial and/or username, with confidence.
pub async fn linked_context(
    store: &dyn InventoryStore,
    serial: Option<&str>,
    username: Option<&str>,
    params: &RetrievalParams,
) -> Result<LinkedContext> {
    let records = store
        .find_linked(serial, username, params.link_candidate_limit)
        .await?;
    let confidence = link_confidence(&records, serial, username);
    Ok(LinkedContext {
        records,
        confidence,
    })
}

/// `triage search`: ranked KB search with optional device/app hints.
pub async fn run_search(
    config: &Config,
    query: &str,
    device: Option<String>,
    app: Option<String>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let query = KbQuery {
        text: query.to_string(),
        preferred_device: device
            .as_deref()
            .map(infer_device)
            .filter(|d| d.is_apple()),
        preferred_app: app,
        limit,
    };
    let hits = workspace.search(&query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.article.title);
        println!("    source: {}", hit.article.source_path);
        if !hit.article.platforms.is_empty() {
            println!("    platforms: {}", hit.article.platforms.join(", "));
        }
        if !hit.article.apps.is_empty() {
            println!("    apps: {}", hit.article.apps.join(", "));
        }
        println!("    id: {}", hit.article.id);
        println!();
    }
    Ok(())
}

fn print_record(record: &InventoryRecord) {
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!(
        "{} [{}] {}",
        show(&record.serial_number),
        record.source_type.as_str(),
        record.source_file
    );
    println!("    user:    {} ({})", show(&record.display_name), show(&record.username));
    println!("    asset:   {}", show(&record.asset_tag));
    println!("    phone:   {}", show(&record.phone));
    println!("    model:   {} / OS {}", show(&record.model), show(&record.os_version));
    println!();
}

/// `triage lookup`: field-routed inventory lookup.
pub async fn run_lookup(
    config: &Config,
    text: &str,
    field: LookupField,
    limit: i64,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let records = workspace.lookup(text, field, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

/// `triage link`: cross-source linked context for a serial and/or username.
pub async fn run_link(
    config: &Config,
    serial: Option<String>,
    username: Option<String>,
    json: bool,
) -> Result<()> {
    if serial.is_none() && username.is_none() {
        anyhow::bail!("link needs --serial and/or --username");
    }
    let workspace = Workspace::open(config).await?;
    let linked = workspace
        .linked_context(serial.as_deref(), username.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&linked)?);
        return Ok(());
    }
    println!(
        "confidence: {:.2} ({} records)",
        linked.confidence,
        linked.records.len()
    );
    println!();
    for record in &linked.records {
        print_record(record);
    }
    Ok(())
}
