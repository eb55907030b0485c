//! Core data models used throughout Triage Harness.
//!
//! These types represent the intake records, knowledge-base articles,
//! inventory records, and search results that flow through the ingestion,
//! retrieval, and conversation pipeline.

use serde::{Deserialize, Serialize};

/// Normalize a serial number into its canonical join key.
///
/// Strips all whitespace and uppercases. `"C02 ABC 12345"` and
/// `"c02abc12345"` both become `"C02ABC12345"`.
pub fn normalize_serial(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Device category of the machine a support request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    Mac,
    #[serde(rename = "iphone")]
    IPhone,
    #[serde(rename = "ipad")]
    IPad,
    #[default]
    Unknown,
    NonApple,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Mac => "mac",
            DeviceCategory::IPhone => "iphone",
            DeviceCategory::IPad => "ipad",
            DeviceCategory::Unknown => "unknown",
            DeviceCategory::NonApple => "non_apple",
        }
    }

    /// Platform tag used in KB article platform sets.
    pub fn platform_tag(&self) -> Option<&'static str> {
        match self {
            DeviceCategory::Mac => Some("macos"),
            DeviceCategory::IPhone => Some("ios"),
            DeviceCategory::IPad => Some("ipados"),
            DeviceCategory::Unknown | DeviceCategory::NonApple => None,
        }
    }

    pub fn is_apple(&self) -> bool {
        matches!(
            self,
            DeviceCategory::Mac | DeviceCategory::IPhone | DeviceCategory::IPad
        )
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical intake fields, in the order the triage workflow asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeField {
    Ticket,
    Device,
    Serial,
    Issue,
    App,
    Ssid,
    OsVersion,
}

impl IntakeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeField::Ticket => "ticket",
            IntakeField::Device => "device",
            IntakeField::Serial => "serial",
            IntakeField::Issue => "issue",
            IntakeField::App => "app",
            IntakeField::Ssid => "ssid",
            IntakeField::OsVersion => "os_version",
        }
    }

    /// Parse a canonical field name as used in the workflow policy document.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ticket" | "ticket_id" | "ticket_number" => Some(IntakeField::Ticket),
            "device" | "device_type" => Some(IntakeField::Device),
            "serial" | "serial_number" => Some(IntakeField::Serial),
            "issue" | "issue_description" => Some(IntakeField::Issue),
            "app" | "app_in_use" => Some(IntakeField::App),
            "ssid" | "wifi_ssid" => Some(IntakeField::Ssid),
            "os_version" | "os" => Some(IntakeField::OsVersion),
            _ => None,
        }
    }
}

/// Structured intake accumulated over one triage session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub ticket_id: Option<String>,
    pub device: DeviceCategory,
    pub serial: Option<String>,
    pub issue: Option<String>,
    pub app: Option<String>,
    pub ssid: Option<String>,
    pub os_version: Option<String>,
    pub annotations: Vec<String>,
}

impl IntakeRecord {
    /// Serial with whitespace removed and uppercased; `None` when blank.
    pub fn normalized_serial(&self) -> Option<String> {
        self.serial
            .as_deref()
            .map(normalize_serial)
            .filter(|s| !s.is_empty())
    }

    /// Merge a parsed delta into this record.
    ///
    /// Each scalar field keeps its existing value when already populated
    /// (first non-empty wins). Annotations are appended in order. A device
    /// of `Unknown` counts as empty; a `NonApple` device is replaced when
    /// the delta carries an Apple category.
    pub fn merge(&mut self, delta: &IntakeRecord) {
        merge_field(&mut self.ticket_id, &delta.ticket_id);
        merge_field(&mut self.serial, &delta.serial);
        merge_field(&mut self.issue, &delta.issue);
        merge_field(&mut self.app, &delta.app);
        merge_field(&mut self.ssid, &delta.ssid);
        merge_field(&mut self.os_version, &delta.os_version);

        let replace_device = match self.device {
            DeviceCategory::Unknown => delta.device != DeviceCategory::Unknown,
            DeviceCategory::NonApple => delta.device.is_apple(),
            _ => false,
        };
        if replace_device {
            self.device = delta.device;
        }

        self.annotations.extend(
            delta
                .annotations
                .iter()
                .filter(|a| !a.trim().is_empty())
                .cloned(),
        );
    }

    /// Clear a single field (used when a value is retracted).
    pub fn clear(&mut self, field: IntakeField) {
        match field {
            IntakeField::Ticket => self.ticket_id = None,
            IntakeField::Device => self.device = DeviceCategory::Unknown,
            IntakeField::Serial => self.serial = None,
            IntakeField::Issue => self.issue = None,
            IntakeField::App => self.app = None,
            IntakeField::Ssid => self.ssid = None,
            IntakeField::OsVersion => self.os_version = None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == IntakeRecord::default()
    }
}

fn merge_field(target: &mut Option<String>, incoming: &Option<String>) {
    let populated = target.as_deref().is_some_and(|v| !v.trim().is_empty());
    if populated {
        return;
    }
    if let Some(value) = incoming.as_deref().map(str::trim) {
        if !value.is_empty() {
            *target = Some(value.to_string());
        }
    }
}

/// Knowledge-base article with derived tag sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbArticle {
    pub id: String,
    pub title: String,
    pub body: String,
    pub source_path: String,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
    pub apps: Vec<String>,
    pub keywords: Vec<String>,
}

/// Which kind of inventory export a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    ManagedMac,
    ManagedMobile,
    Asset,
    AppleIntake,
    #[default]
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ManagedMac => "managed_mac",
            SourceType::ManagedMobile => "managed_mobile",
            SourceType::Asset => "asset",
            SourceType::AppleIntake => "apple_intake",
            SourceType::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "managed_mac" => SourceType::ManagedMac,
            "managed_mobile" => SourceType::ManagedMobile,
            "asset" => SourceType::Asset,
            "apple_intake" => SourceType::AppleIntake,
            _ => SourceType::Unknown,
        }
    }

    /// Classify an inventory export by its file name.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("intake") {
            SourceType::AppleIntake
        } else if lower.contains("mobile") {
            SourceType::ManagedMobile
        } else if lower.contains("mac") || lower.contains("computer") {
            SourceType::ManagedMac
        } else if lower.contains("asset") {
            SourceType::Asset
        } else {
            SourceType::Unknown
        }
    }
}

/// One normalized device/asset inventory row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: String,
    pub source_file: String,
    pub source_type: SourceType,
    pub serial_number: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub asset_tag: Option<String>,
    pub phone: Option<String>,
    pub os_version: Option<String>,
    pub model: Option<String>,
    /// Flattened source payload, kept for audit/export.
    pub raw_json: String,
}

/// Content hash + modification time of one dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: String,
    pub content_hash: String,
    pub modified_at: i64,
}

/// A KB search request with optional rerank hints.
#[derive(Debug, Clone, Default)]
pub struct KbQuery {
    pub text: String,
    pub preferred_device: Option<DeviceCategory>,
    pub preferred_app: Option<String>,
    pub limit: Option<i64>,
}

/// A KB article paired with its adjusted relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct KbHit {
    pub article: KbArticle,
    pub score: f64,
}

/// An article candidate returned from the keyword index, before rerank.
#[derive(Debug, Clone)]
pub struct RankedArticle {
    pub article: KbArticle,
    /// Raw index rank (FTS5 bm25: more negative is a stronger match).
    pub rank: f64,
}

/// Which inventory column a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupField {
    Serial,
    Display,
    Username,
    AssetTag,
    Phone,
    #[default]
    Any,
}

impl LookupField {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupField::Serial => "serial",
            LookupField::Display => "display",
            LookupField::Username => "username",
            LookupField::AssetTag => "asset_tag",
            LookupField::Phone => "phone",
            LookupField::Any => "any",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "serial" => Some(LookupField::Serial),
            "display" | "display_name" | "name" => Some(LookupField::Display),
            "username" | "user" => Some(LookupField::Username),
            "asset_tag" | "asset" | "tag" => Some(LookupField::AssetTag),
            "phone" => Some(LookupField::Phone),
            "any" => Some(LookupField::Any),
            _ => None,
        }
    }
}

/// Inventory records correlated to a device or person.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkedContext {
    pub records: Vec<InventoryRecord>,
    pub confidence: f64,
}

/// Diagnostics severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "debug" => Severity::Debug,
            "warning" | "warn" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

/// One persisted diagnostics log entry.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub id: i64,
    pub level: Severity,
    pub category: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> IntakeRecord {
        IntakeRecord {
            ticket_id: Some("INC1".into()),
            device: DeviceCategory::Mac,
            serial: Some("C02ABC12345".into()),
            issue: Some("Outlook crashes".into()),
            app: Some("Outlook".into()),
            ssid: Some("Corp".into()),
            os_version: None,
            annotations: vec!["note".into()],
        }
    }

    #[test]
    fn serial_normalization_is_whitespace_and_case_insensitive() {
        assert_eq!(normalize_serial("C02 ABC 12345"), "C02ABC12345");
        assert_eq!(normalize_serial("c02abc12345"), "C02ABC12345");
        assert_eq!(
            normalize_serial("C02 ABC 12345"),
            normalize_serial("c02abc12345")
        );
    }

    #[test]
    fn blank_serial_normalizes_to_none() {
        let intake = IntakeRecord {
            serial: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(intake.normalized_serial(), None);
    }

    #[test]
    fn merging_empty_delta_leaves_record_unchanged() {
        let mut intake = populated();
        intake.merge(&IntakeRecord::default());
        assert_eq!(intake, populated());
    }

    #[test]
    fn first_non_empty_value_wins() {
        let mut intake = populated();
        let delta = IntakeRecord {
            serial: Some("OTHER".into()),
            os_version: Some("14.5".into()),
            annotations: vec!["second".into()],
            ..Default::default()
        };
        intake.merge(&delta);
        assert_eq!(intake.serial.as_deref(), Some("C02ABC12345"));
        assert_eq!(intake.os_version.as_deref(), Some("14.5"));
        assert_eq!(intake.annotations, vec!["note", "second"]);
    }

    #[test]
    fn merge_of_disjoint_deltas_commutes() {
        let a = IntakeRecord {
            app: Some("Teams".into()),
            ..Default::default()
        };
        let b = IntakeRecord {
            ssid: Some("Guest".into()),
            ..Default::default()
        };

        let mut ab = IntakeRecord::default();
        ab.merge(&a);
        ab.merge(&b);
        let mut ba = IntakeRecord::default();
        ba.merge(&b);
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn whitespace_values_never_overwrite() {
        let mut intake = IntakeRecord::default();
        intake.merge(&IntakeRecord {
            app: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(intake.app, None);
    }

    #[test]
    fn apple_device_upgrades_inferred_non_apple() {
        let mut intake = IntakeRecord {
            device: DeviceCategory::NonApple,
            ..Default::default()
        };
        intake.merge(&IntakeRecord {
            device: DeviceCategory::IPad,
            ..Default::default()
        });
        assert_eq!(intake.device, DeviceCategory::IPad);

        intake.merge(&IntakeRecord {
            device: DeviceCategory::Mac,
            ..Default::default()
        });
        assert_eq!(intake.device, DeviceCategory::IPad);
    }

    #[test]
    fn source_type_from_well_known_names() {
        assert_eq!(
            SourceType::from_file_name("managed_macs.jsonl"),
            SourceType::ManagedMac
        );
        assert_eq!(
            SourceType::from_file_name("managed_mobile_devices.jsonl"),
            SourceType::ManagedMobile
        );
        assert_eq!(SourceType::from_file_name("assets.jsonl"), SourceType::Asset);
        assert_eq!(
            SourceType::from_file_name("apple_intake_filtered.jsonl"),
            SourceType::AppleIntake
        );
        assert_eq!(SourceType::from_file_name("misc.csv"), SourceType::Unknown);
    }
}
