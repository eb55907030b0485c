//! Text normalization for knowledge-base articles.
//!
//! Turns raw title/body/path text into the derived tag sets stored with each
//! [`KbArticle`]: platforms, applications, topic tags, and frequency-ranked
//! keywords. The dictionaries are plain ordered tables so they can be
//! enumerated in tests and extended without touching the matching code.

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::models::KbArticle;

/// Maximum number of keyword tokens kept per article.
pub const MAX_KEYWORDS: usize = 24;

/// Token or phrase → canonical platform name.
pub const PLATFORM_TERMS: &[(&str, &str)] = &[
    ("macos", "macos"),
    ("mac os", "macos"),
    ("os x", "macos"),
    ("mac", "macos"),
    ("macbook", "macos"),
    ("imac", "macos"),
    ("ios", "ios"),
    ("iphone", "ios"),
    ("ipados", "ipados"),
    ("ipad", "ipados"),
    ("windows", "windows"),
    ("android", "android"),
    ("linux", "linux"),
];

/// Token or phrase → canonical application name.
pub const APP_TERMS: &[(&str, &str)] = &[
    ("outlook", "outlook"),
    ("microsoft teams", "teams"),
    ("teams", "teams"),
    ("onedrive", "onedrive"),
    ("sharepoint", "sharepoint"),
    ("excel", "excel"),
    ("powerpoint", "powerpoint"),
    ("zoom", "zoom"),
    ("slack", "slack"),
    ("safari", "safari"),
    ("chrome", "chrome"),
    ("firefox", "firefox"),
    ("globalprotect", "globalprotect"),
    ("anyconnect", "anyconnect"),
    ("self service", "self service"),
    ("company portal", "company portal"),
    ("keychain", "keychain"),
    ("filevault", "filevault"),
    ("okta", "okta"),
];

/// Token or phrase → topic tag.
pub const TOPIC_TERMS: &[(&str, &str)] = &[
    ("password", "authentication"),
    ("credential", "authentication"),
    ("login", "authentication"),
    ("sign in", "authentication"),
    ("mfa", "authentication"),
    ("sso", "authentication"),
    ("wifi", "network"),
    ("wi-fi", "network"),
    ("ssid", "network"),
    ("vpn", "network"),
    ("dns", "network"),
    ("email", "email"),
    ("mailbox", "email"),
    ("printer", "printing"),
    ("battery", "hardware"),
    ("keyboard", "hardware"),
    ("display", "hardware"),
    ("mdm", "device-management"),
    ("enroll", "device-management"),
    ("profile", "device-management"),
    ("update", "software-update"),
    ("upgrade", "software-update"),
    ("cache", "performance"),
    ("slow", "performance"),
    ("crash", "stability"),
    ("freeze", "stability"),
];

/// Words never kept as keywords.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "from",
    "have", "has", "had", "was", "were", "will", "can", "cannot", "its", "into", "then", "than",
    "they", "them", "their", "there", "when", "what", "which", "who", "how", "all", "any", "our",
    "out", "use", "using", "used", "also", "may", "should", "would", "could", "been", "being",
    "does", "did", "doing", "each", "more", "most", "other", "some", "such", "only", "own",
    "same", "too", "very", "just", "after", "before", "again", "once", "here", "why", "where",
    "keeps", "keep", "still", "get", "gets", "got", "step", "steps",
];

/// Derived tag sets for one article.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
    pub apps: Vec<String>,
    pub keywords: Vec<String>,
}

/// Split text into lowercase alphanumeric tokens longer than one character.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Tokens that carry meaning: longer than two characters and not stop words.
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Recompute every derived field from an article's title, body, and path.
pub fn derive_fields(title: &str, body: &str, source_path: &str) -> DerivedFields {
    let text = format!("{}\n{}", title, body);
    let lowered = text.to_lowercase();
    let tokens: BTreeSet<String> = tokenize(&text).into_iter().collect();

    let platforms = match_terms(PLATFORM_TERMS, &tokens, &lowered);
    let apps = match_terms(APP_TERMS, &tokens, &lowered);

    let mut tags: BTreeSet<String> = match_terms(TOPIC_TERMS, &tokens, &lowered)
        .into_iter()
        .collect();
    tags.extend(path_tags(source_path));

    DerivedFields {
        tags: tags.into_iter().collect(),
        platforms,
        apps,
        keywords: rank_keywords(&text, MAX_KEYWORDS),
    }
}

/// Build a [`KbArticle`] with freshly derived fields.
pub fn build_article(id: String, title: &str, body: &str, source_path: &str) -> KbArticle {
    let derived = derive_fields(title, body, source_path);
    KbArticle {
        id,
        title: title.trim().to_string(),
        body: body.trim().to_string(),
        source_path: source_path.to_string(),
        tags: derived.tags,
        platforms: derived.platforms,
        apps: derived.apps,
        keywords: derived.keywords,
    }
}

/// Deterministic article id from its source path and position.
pub fn derived_article_id(source_path: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(b"#");
    hasher.update(index.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("kb-{}", &digest[..16])
}

/// Title for a plain-text document: a leading markdown heading, else the
/// file stem, else the truncated body.
pub fn title_from_text(body: &str, path: &Path) -> String {
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim();
            if !heading.is_empty() {
                return heading.to_string();
            }
        }
        break;
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| truncate_chars(body.trim(), 80))
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

fn match_terms(table: &[(&str, &str)], tokens: &BTreeSet<String>, lowered: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (term, canonical) in table {
        let hit = if term.contains(' ') || term.contains('-') {
            lowered.contains(term)
        } else {
            tokens.contains(*term) || tokens.contains(&format!("{}s", term))
        };
        if hit {
            found.insert(canonical.to_string());
        }
    }
    found.into_iter().collect()
}

/// Directory names between the dataset root and the file become tags
/// (`kb/networking/vpn.md` → `networking`).
fn path_tags(source_path: &str) -> Vec<String> {
    let path = Path::new(source_path);
    let parent = match path.parent() {
        Some(p) => p,
        None => return Vec::new(),
    };
    parent
        .components()
        .rev()
        .take(2)
        .filter_map(|c| c.as_os_str().to_str())
        .map(|s| s.to_lowercase())
        .filter(|s| {
            s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
                && s.chars().any(|c| c.is_alphabetic())
                && !STOPWORDS.contains(&s.as_str())
                && !["data", "dataset", "datasets", "kb", "docs", "tmp"].contains(&s.as_str())
        })
        .collect()
}

/// Most frequent content tokens, ties broken alphabetically.
fn rank_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in content_tokens(text) {
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max).map(|(t, _)| t).collect()
}
