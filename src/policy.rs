//! Workflow policy document.
//!
//! The policy is a JSON file shipped alongside the datasets. It controls the
//! ticket marker, the annotation prefix, and which intake details are
//! required. Every field is optional: anything missing or malformed falls
//! back to the built-in default, and a policy file that cannot be read or
//! parsed at all yields [`WorkflowPolicy::default`].

use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::models::{DeviceCategory, IntakeField};

pub const DEFAULT_TICKET_MARKER: &str = "##";
pub const DEFAULT_COMMENT_PREFIX: &str = "//";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPolicy {
    pub supported_platforms: Vec<String>,
    pub device_requirement: String,
    /// Two-character marker that opens a ticket message (`##INC123`).
    pub ticket_marker: String,
    pub comment_prefix: String,
    pub required_details: Vec<IntakeField>,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            supported_platforms: vec!["macOS".into(), "iOS".into(), "iPadOS".into()],
            device_requirement: "Apple devices only (Mac, iPhone, iPad)".into(),
            ticket_marker: DEFAULT_TICKET_MARKER.into(),
            comment_prefix: DEFAULT_COMMENT_PREFIX.into(),
            required_details: default_required_details(),
        }
    }
}

pub fn default_required_details() -> Vec<IntakeField> {
    vec![
        IntakeField::Device,
        IntakeField::Serial,
        IntakeField::Issue,
        IntakeField::App,
        IntakeField::Ssid,
    ]
}

impl WorkflowPolicy {
    /// Parse a policy document, field by field, with defaults for anything
    /// missing or of the wrong shape.
    pub fn from_json(text: &str) -> Self {
        let defaults = Self::default();
        let root: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "workflow policy is not valid JSON, using defaults");
                return defaults;
            }
        };

        let supported_platforms = string_list(root.pointer("/scope/supported_platforms"))
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.supported_platforms);

        let device_requirement = non_empty_str(root.pointer("/scope/device_requirement"))
            .unwrap_or(defaults.device_requirement);

        let ticket_marker = non_empty_str(root.pointer("/ticket_detection/trigger_format"))
            .and_then(|fmt| {
                let marker: String = fmt.chars().take(2).collect();
                (marker.chars().count() == 2 && !marker.trim().is_empty()).then_some(marker)
            })
            .unwrap_or(defaults.ticket_marker);

        let comment_prefix = non_empty_str(root.pointer("/user_annotations/comment_prefix"))
            .unwrap_or(defaults.comment_prefix);

        let required_details =
            string_list(root.pointer("/intake_and_validation/required_details"))
                .map(|names| {
                    let mut fields: Vec<IntakeField> = Vec::new();
                    for name in names {
                        match IntakeField::from_name(&name) {
                            Some(f) if !fields.contains(&f) => fields.push(f),
                            Some(_) => {}
                            None => debug!(field = %name, "ignoring unknown required detail"),
                        }
                    }
                    fields
                })
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.required_details);

        Self {
            supported_platforms,
            device_requirement,
            ticket_marker,
            comment_prefix,
            required_details,
        }
    }

    /// Load a policy file, falling back to defaults when it is unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read workflow policy, using defaults");
                Self::default()
            }
        }
    }

    pub fn requires(&self, field: IntakeField) -> bool {
        self.required_details.contains(&field)
    }

    /// Whether `device` runs one of the supported platforms.
    pub fn supports(&self, device: DeviceCategory) -> bool {
        device.platform_tag().is_some_and(|tag| {
            self.supported_platforms
                .iter()
                .any(|p| p.eq_ignore_ascii_case(tag))
        })
    }

    /// Prompts for an unknown or unsupported device, naming the devices this
    /// policy covers.
    pub fn device_prompts(&self) -> Vec<String> {
        let names: Vec<String> = self
            .supported_platforms
            .iter()
            .map(|p| platform_device_name(p))
            .collect();
        let devices = join_alternatives(&names);
        vec![
            format!("Which device is affected: {}?", devices),
            format!(
                "This workflow supports {}. If the device is not {}, please route the ticket to the appropriate team.",
                self.device_requirement, devices
            ),
        ]
    }
}

fn platform_device_name(platform: &str) -> String {
    match platform.to_lowercase().as_str() {
        "macos" => "a Mac".to_string(),
        "ios" => "an iPhone".to_string(),
        "ipados" => "an iPad".to_string(),
        _ => platform.to_string(),
    }
}

/// `a`, `a or b`, `a, b, or c`.
fn join_alternatives(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} or {}", a, b),
        [rest @ .., last] => format!("{}, or {}", rest.join(", "), last),
    }
}

/// Filename heuristic for workflow-policy documents.
pub fn is_policy_file(path: &Path) -> bool {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    is_json && (name.contains("policy") || name.contains("workflow"))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
