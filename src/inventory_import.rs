//! Inventory normalization: CSV / JSON / JSONL exports into
//! [`InventoryRecord`]s.
//!
//! Each logical field has an ordered list of header synonyms. A source key
//! matches a synonym when either its whole dotted path or its leaf name
//! normalizes to it; the first synonym with a populated value wins. Fields
//! with no match stay `None`.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::csv;
use crate::jsonl::{self, normalize_key};
use crate::models::{normalize_serial, InventoryRecord, SourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryField {
    Serial,
    Username,
    DisplayName,
    AssetTag,
    Phone,
    OsVersion,
    Model,
}

/// Ordered header synonyms per logical field (already key-normalized).
pub const FIELD_SYNONYMS: &[(InventoryField, &[&str])] = &[
    (
        InventoryField::Serial,
        &[
            "serial_number",
            "serialnumber",
            "serial",
            "serial_no",
            "hardware_serial",
            "device_serial",
            "sn",
        ],
    ),
    (
        InventoryField::Username,
        &[
            "username",
            "user_name",
            "assigned_user",
            "user",
            "email_address",
            "email",
            "owner",
            "login",
        ],
    ),
    (
        InventoryField::DisplayName,
        &[
            "display_name",
            "device_name",
            "computer_name",
            "full_name",
            "hostname",
            "name",
        ],
    ),
    (
        InventoryField::AssetTag,
        &["asset_tag", "assettag", "asset_number", "asset_id", "asset", "tag"],
    ),
    (
        InventoryField::Phone,
        &[
            "phone",
            "phone_number",
            "mobile_number",
            "mobile_phone",
            "telephone",
        ],
    ),
    (
        InventoryField::OsVersion,
        &[
            "os_version",
            "osversion",
            "operating_system_version",
            "system_version",
            "macos_version",
            "ios_version",
            "os",
        ],
    ),
    (
        InventoryField::Model,
        &[
            "model",
            "model_name",
            "model_identifier",
            "hardware_model",
            "product",
        ],
    ),
];

/// Records parsed from one inventory file.
#[derive(Debug, Default)]
pub struct InventoryBatch {
    pub records: Vec<InventoryRecord>,
    /// Lines or rows that could not be turned into a record.
    pub dropped: usize,
}

fn synonyms(field: InventoryField) -> &'static [&'static str] {
    FIELD_SYNONYMS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, s)| *s)
        .unwrap_or(&[])
}

/// Resolve one logical field from flattened `(key, value)` pairs.
pub fn resolve_field(pairs: &[(String, String)], field: InventoryField) -> Option<String> {
    let keys: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, _)| {
            let full = normalize_key(k);
            let leaf = normalize_key(k.rsplit('.').next().unwrap_or(k));
            (full, leaf)
        })
        .collect();

    for synonym in synonyms(field) {
        for ((full, leaf), (_, value)) in keys.iter().zip(pairs) {
            if (full.as_str() == *synonym || leaf.as_str() == *synonym) && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Build a record from flattened pairs. Returns `None` for an empty payload.
pub fn map_record(
    pairs: &[(String, String)],
    source_file: &str,
    source_type: SourceType,
) -> Option<InventoryRecord> {
    if pairs.is_empty() {
        return None;
    }
    let raw: Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    Some(InventoryRecord {
        id: uuid::Uuid::new_v4().to_string(),
        source_file: source_file.to_string(),
        source_type,
        serial_number: resolve_field(pairs, InventoryField::Serial)
            .map(|s| normalize_serial(&s))
            .filter(|s| !s.is_empty()),
        username: resolve_field(pairs, InventoryField::Username),
        display_name: resolve_field(pairs, InventoryField::DisplayName),
        asset_tag: resolve_field(pairs, InventoryField::AssetTag),
        phone: resolve_field(pairs, InventoryField::Phone),
        os_version: resolve_field(pairs, InventoryField::OsVersion),
        model: resolve_field(pairs, InventoryField::Model),
        raw_json: Value::Object(raw).to_string(),
    })
}

fn from_values(values: Vec<Value>, source_file: &str, source_type: SourceType) -> InventoryBatch {
    let mut batch = InventoryBatch::default();
    for value in values {
        match map_record(&jsonl::flatten(&value), source_file, source_type) {
            Some(record) => batch.records.push(record),
            None => batch.dropped += 1,
        }
    }
    batch
}

pub fn records_from_csv(content: &str, source_file: &str, source_type: SourceType) -> InventoryBatch {
    let mut batch = InventoryBatch::default();
    for row in csv::parse_records(content) {
        let pairs: Vec<(String, String)> = row.into_iter().filter(|(_, v)| !v.is_empty()).collect();
        match map_record(&pairs, source_file, source_type) {
            Some(record) => batch.records.push(record),
            None => batch.dropped += 1,
        }
    }
    batch
}

pub fn records_from_json(
    content: &str,
    source_file: &str,
    source_type: SourceType,
) -> Result<InventoryBatch> {
    Ok(from_values(jsonl::parse_json(content)?, source_file, source_type))
}

pub fn records_from_jsonl(
    content: &str,
    source_file: &str,
    source_type: SourceType,
) -> Result<InventoryBatch> {
    let parsed = jsonl::parse_jsonl(content)?;
    let mut batch = from_values(parsed.values, source_file, source_type);
    batch.dropped += parsed.malformed;
    Ok(batch)
}

/// Content heuristic: does this record carry device identity fields?
pub fn looks_like_inventory(value: &Value) -> bool {
    let pairs = jsonl::flatten(value);
    [
        InventoryField::Serial,
        InventoryField::AssetTag,
        InventoryField::Username,
    ]
    .iter()
    .any(|f| {
        pairs.iter().any(|(k, _)| {
            let leaf = normalize_key(k.rsplit('.').next().unwrap_or(k));
            synonyms(*f).contains(&leaf.as_str())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn synonym_table_covers_every_field() {
        for field in [
            InventoryField::Serial,
            InventoryField::Username,
            InventoryField::DisplayName,
            InventoryField::AssetTag,
            InventoryField::Phone,
            InventoryField::OsVersion,
            InventoryField::Model,
        ] {
            assert!(!synonyms(field).is_empty(), "{:?}", field);
        }
    }

    #[test]
    fn csv_headers_map_through_synonyms() {
        let batch = records_from_csv(
            "Serial Number,Assigned User,Asset Tag,Phone Number\nc02 abc 12345,jdoe,AT-1,555\n",
            "assets.csv",
            SourceType::Asset,
        );
        assert_eq!(batch.records.len(), 1);
        let r = &batch.records[0];
        assert_eq!(r.serial_number.as_deref(), Some("C02ABC12345"));
        assert_eq!(r.username.as_deref(), Some("jdoe"));
        assert_eq!(r.asset_tag.as_deref(), Some("AT-1"));
        assert_eq!(r.phone.as_deref(), Some("555"));
        assert_eq!(r.os_version, None);
    }

    #[test]
    fn first_synonym_wins_over_later_ones() {
        let pairs = vec![
            ("serial".to_string(), "LOSER".to_string()),
            ("Serial Number".to_string(), "WINNER".to_string()),
        ];
        assert_eq!(
            resolve_field(&pairs, InventoryField::Serial).as_deref(),
            Some("WINNER")
        );
    }

    #[test]
    fn nested_json_matches_on_leaf_keys() {
        let value = json!({
            "general": {"name": "Jane's MacBook", "serial_number": "C02ABC12345"},
            "location": {"username": "jane"},
            "hardware": {"os_version": "14.5", "model": "MacBook Pro"}
        });
        let record = map_record(&jsonl::flatten(&value), "managed_macs.jsonl", SourceType::ManagedMac)
            .unwrap();
        assert_eq!(record.display_name.as_deref(), Some("Jane's MacBook"));
        assert_eq!(record.username.as_deref(), Some("jane"));
        assert_eq!(record.os_version.as_deref(), Some("14.5"));
        assert_eq!(record.model.as_deref(), Some("MacBook Pro"));
        assert!(record.raw_json.contains("general.serial_number"));
    }

    #[test]
    fn jsonl_counts_dropped_lines() {
        let batch = records_from_jsonl(
            "{\"serial\":\"A\"}\n{}\nbroken\n",
            "managed_mobile_devices.jsonl",
            SourceType::ManagedMobile,
        )
        .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.dropped, 2);
    }

    #[test]
    fn json_wrapper_is_unwrapped() {
        let batch = records_from_json(
            r#"{"mobile_devices": [{"serialNumber": "F1"}, {"serialNumber": "F2"}]}"#,
            "mobile.json",
            SourceType::ManagedMobile,
        )
        .unwrap();
        let serials: Vec<_> = batch
            .records
            .iter()
            .filter_map(|r| r.serial_number.clone())
            .collect();
        assert_eq!(serials, vec!["F1", "F2"]);
    }

    #[test]
    fn inventory_heuristic_looks_for_identity_keys() {
        assert!(looks_like_inventory(&json!({"Serial Number": "x"})));
        assert!(looks_like_inventory(&json!({"general": {"asset_tag": "x"}})));
        assert!(!looks_like_inventory(&json!({"title": "VPN", "body": "..."})));
    }
}
