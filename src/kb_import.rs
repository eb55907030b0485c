//! Knowledge-base normalization: JSON / JSONL records and plain or extracted
//! documents into [`KbArticle`]s with derived fields.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use crate::jsonl;
use crate::models::KbArticle;
use crate::normalize::{build_article, derived_article_id, title_from_text, truncate_chars};

/// Text fields tried in order; the first populated one is the body.
pub const TEXT_FIELDS: &[&str] = &["text", "body", "content", "description", "summary"];

pub const TITLE_FIELDS: &[&str] = &["title", "name", "subject", "heading"];

pub const ID_FIELDS: &[&str] = &["id", "article_id", "kb_id"];

/// Articles parsed from one KB file.
#[derive(Debug, Default)]
pub struct KbBatch {
    pub articles: Vec<KbArticle>,
    /// Records with no extractable text plus malformed JSONL lines.
    pub dropped: usize,
}

fn field_text(object: &serde_json::Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find_map(jsonl::scalar_text)
}

/// `steps` as a string, or an array of strings / `{ "text": .. }` objects
/// joined one per line.
fn steps_text(object: &serde_json::Map<String, Value>) -> Option<String> {
    match object.get("steps")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(o) => field_text(o, TEXT_FIELDS),
                    other => jsonl::scalar_text(other),
                })
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        _ => None,
    }
}

/// Body text of one record: first populated text field, then `steps`,
/// then the pretty-printed record itself.
pub fn record_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(object) if object.is_empty() => None,
        Value::Object(object) => field_text(object, TEXT_FIELDS)
            .or_else(|| steps_text(object))
            .or_else(|| serde_json::to_string_pretty(value).ok()),
        other => jsonl::scalar_text(other),
    }
}

/// Convert one JSON record into an article. `None` when it has no text.
pub fn article_from_record(value: &Value, source_path: &str, index: usize) -> Option<KbArticle> {
    let body = record_text(value)?;
    let object = value.as_object();

    let id = object
        .and_then(|o| field_text(o, ID_FIELDS))
        .unwrap_or_else(|| derived_article_id(source_path, index));
    let title = object
        .and_then(|o| field_text(o, TITLE_FIELDS))
        .unwrap_or_else(|| title_from_text(&body, Path::new(source_path)));

    Some(build_article(id, &title, &body, source_path))
}

fn from_values(values: &[Value], source_path: &str) -> KbBatch {
    let mut batch = KbBatch::default();
    for (index, value) in values.iter().enumerate() {
        match article_from_record(value, source_path, index) {
            Some(article) => batch.articles.push(article),
            None => batch.dropped += 1,
        }
    }
    batch
}

pub fn articles_from_jsonl(content: &str, source_path: &str) -> Result<KbBatch> {
    let parsed = jsonl::parse_jsonl(content)?;
    let mut batch = from_values(&parsed.values, source_path);
    batch.dropped += parsed.malformed;
    Ok(batch)
}

pub fn articles_from_json(content: &str, source_path: &str) -> Result<KbBatch> {
    Ok(from_values(&jsonl::parse_json(content)?, source_path))
}

/// A whole plain-text or extracted document as one article.
pub fn article_from_document(text: &str, source_path: &str) -> Option<KbArticle> {
    let body = text.trim();
    if body.is_empty() {
        return None;
    }
    let title = title_from_text(body, Path::new(source_path));
    Some(build_article(
        derived_article_id(source_path, 0),
        &truncate_chars(&title, 200),
        body,
        source_path,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_fields_are_tried_in_order() {
        let value = json!({"summary": "short", "body": "long body"});
        assert_eq!(record_text(&value).as_deref(), Some("long body"));
    }

    #[test]
    fn steps_are_joined_when_no_text_field() {
        let value = json!({"title": "VPN", "steps": ["Quit GlobalProtect", {"text": "Reconnect"}]});
        assert_eq!(
            record_text(&value).as_deref(),
            Some("Quit GlobalProtect\nReconnect")
        );
    }

    #[test]
    fn records_without_text_fall_back_to_pretty_json() {
        let value = json!({"title": "Printer", "printer": "HP-4"});
        let text = record_text(&value).unwrap();
        assert!(text.contains("\"printer\": \"HP-4\""));
        assert_eq!(record_text(&json!({})), None);
    }

    #[test]
    fn explicit_ids_are_kept_and_missing_ids_are_derived() {
        let batch = articles_from_jsonl(
            "{\"id\":\"KB-7\",\"title\":\"Outlook login\",\"text\":\"Reset the Outlook password\"}\n{\"text\":\"Clear the Teams cache\"}\n{}\n",
            "/data/kb_corpus.jsonl",
        )
        .unwrap();
        assert_eq!(batch.articles.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.articles[0].id, "KB-7");
        assert!(batch.articles[0].apps.contains(&"outlook".to_string()));
        assert_eq!(
            batch.articles[1].id,
            derived_article_id("/data/kb_corpus.jsonl", 1)
        );
    }

    #[test]
    fn json_articles_wrapper() {
        let batch = articles_from_json(
            r#"{"articles": [{"title": "A", "body": "Restart the Mac"}]}"#,
            "/data/kb.json",
        )
        .unwrap();
        assert_eq!(batch.articles.len(), 1);
        assert!(batch.articles[0].platforms.contains(&"macos".to_string()));
    }

    #[test]
    fn documents_take_heading_as_title() {
        let article =
            article_from_document("# Wi-Fi drops\nForget the network and rejoin.", "/d/wifi.md")
                .unwrap();
        assert_eq!(article.title, "Wi-Fi drops");
        assert!(article_from_document("   \n", "/d/empty.txt").is_none());
    }
}
