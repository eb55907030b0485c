//! Deterministic chat/ticket message parsing.
//!
//! [`MessageParser::parse`] turns one free-form message into an intake delta
//! and a flag saying whether the message carried a ticket header. The same
//! message always produces the same result.

use regex::Regex;

use crate::models::{DeviceCategory, IntakeField, IntakeRecord};
use crate::normalize::tokenize;
use crate::policy::WorkflowPolicy;

/// Lowercased `key:` → intake field. Order is irrelevant for lookup but kept
/// grouped by field for readability.
pub const FIELD_SYNONYMS: &[(&str, IntakeField)] = &[
    ("ticket", IntakeField::Ticket),
    ("ticket number", IntakeField::Ticket),
    ("ticket id", IntakeField::Ticket),
    ("incident", IntakeField::Ticket),
    ("device", IntakeField::Device),
    ("device type", IntakeField::Device),
    ("hardware", IntakeField::Device),
    ("model", IntakeField::Device),
    ("serial", IntakeField::Serial),
    ("serial number", IntakeField::Serial),
    ("serial no", IntakeField::Serial),
    ("sn", IntakeField::Serial),
    ("s/n", IntakeField::Serial),
    ("issue", IntakeField::Issue),
    ("problem", IntakeField::Issue),
    ("description", IntakeField::Issue),
    ("symptom", IntakeField::Issue),
    ("symptoms", IntakeField::Issue),
    ("app", IntakeField::App),
    ("application", IntakeField::App),
    ("app in use", IntakeField::App),
    ("software", IntakeField::App),
    ("ssid", IntakeField::Ssid),
    ("wifi", IntakeField::Ssid),
    ("wi-fi", IntakeField::Ssid),
    ("wifi ssid", IntakeField::Ssid),
    ("wi-fi ssid", IntakeField::Ssid),
    ("network", IntakeField::Ssid),
    ("os", IntakeField::OsVersion),
    ("os version", IntakeField::OsVersion),
    ("version", IntakeField::OsVersion),
];

/// Tokens that identify each Apple device family, checked in this order.
pub const DEVICE_KEYWORDS: &[(DeviceCategory, &[&str])] = &[
    (
        DeviceCategory::Mac,
        &["mac", "macs", "macbook", "macbooks", "imac", "imacs", "macos", "macmini"],
    ),
    (DeviceCategory::IPhone, &["iphone", "iphones"]),
    (DeviceCategory::IPad, &["ipad", "ipads", "ipados"]),
];

/// Result of parsing a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub delta: IntakeRecord,
    pub is_ticket: bool,
}

/// Message parser configured from the workflow policy.
#[derive(Debug, Clone)]
pub struct MessageParser {
    ticket_pattern: Regex,
    comment_prefix: String,
}

impl MessageParser {
    pub fn new(ticket_marker: &str, comment_prefix: &str) -> Self {
        let pattern = format!(
            r"^\s*{}\s*([A-Za-z0-9][A-Za-z0-9_-]*)",
            regex::escape(ticket_marker)
        );
        // An escaped literal followed by a fixed suffix always compiles.
        let ticket_pattern = Regex::new(&pattern).unwrap_or_else(|_| default_ticket_pattern());
        Self {
            ticket_pattern,
            comment_prefix: comment_prefix.to_string(),
        }
    }

    pub fn from_policy(policy: &WorkflowPolicy) -> Self {
        Self::new(&policy.ticket_marker, &policy.comment_prefix)
    }

    /// Extract a ticket identifier if `line` starts with the ticket marker.
    pub fn ticket_id(&self, line: &str) -> Option<String> {
        self.ticket_pattern
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn parse(&self, message: &str) -> ParsedMessage {
        let mut delta = IntakeRecord::default();
        let mut device_from_field = false;
        let mut candidates: Vec<&str> = Vec::new();

        if let Some(first) = message.lines().next() {
            delta.ticket_id = self.ticket_id(first);
        }

        for line in message.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if !self.comment_prefix.is_empty() {
                if let Some(rest) = line.strip_prefix(self.comment_prefix.as_str()) {
                    let note = rest.trim();
                    if !note.is_empty() {
                        delta.annotations.push(note.to_string());
                    }
                    continue;
                }
            }

            if self.ticket_pattern.is_match(line) {
                continue;
            }

            match split_key_value(line) {
                Some((field, value)) => {
                    if field == IntakeField::Device {
                        assign_device(&mut delta, infer_device(value));
                        device_from_field = true;
                    } else {
                        assign(&mut delta, field, value);
                    }
                }
                None => candidates.push(line),
            }
        }

        if !device_from_field {
            delta.device = infer_device(message);
        }

        if delta.issue.is_none() {
            delta.issue = candidates.first().map(|l| l.to_string());
        }

        ParsedMessage {
            is_ticket: delta.ticket_id.is_some(),
            delta,
        }
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::from_policy(&WorkflowPolicy::default())
    }
}

fn default_ticket_pattern() -> Regex {
    Regex::new(r"^\s*##\s*([A-Za-z0-9][A-Za-z0-9_-]*)").expect("static ticket pattern")
}

/// Split `key: value` where the key is a known synonym and the value is
/// non-empty.
fn split_key_value(line: &str) -> Option<(IntakeField, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim().to_lowercase();
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    FIELD_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, field)| (*field, value))
}

fn assign(delta: &mut IntakeRecord, field: IntakeField, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let slot = match field {
        IntakeField::Ticket => &mut delta.ticket_id,
        IntakeField::Serial => &mut delta.serial,
        IntakeField::Issue => &mut delta.issue,
        IntakeField::App => &mut delta.app,
        IntakeField::Ssid => &mut delta.ssid,
        IntakeField::OsVersion => &mut delta.os_version,
        IntakeField::Device => return,
    };
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

/// Later device lines (`Model: A2442`) never demote an Apple category.
fn assign_device(delta: &mut IntakeRecord, category: DeviceCategory) {
    let replace = match delta.device {
        DeviceCategory::Unknown => true,
        DeviceCategory::NonApple => category.is_apple(),
        _ => false,
    };
    if replace {
        delta.device = category;
    }
}

/// Infer the device family from free text.
///
/// Blank text is `Unknown`; text that names no Apple device is `NonApple`.
pub fn infer_device(text: &str) -> DeviceCategory {
    if text.trim().is_empty() {
        return DeviceCategory::Unknown;
    }
    let tokens = tokenize(text);
    for (category, keywords) in DEVICE_KEYWORDS {
        if tokens.iter().any(|t| keywords.contains(&t.as_str())) {
            return *category;
        }
    }
    DeviceCategory::NonApple
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "##INC12345\nDevice: MacBook Pro\nSerial: C02TEST12345\nApp: Outlook\nSSID: TC-Corp\n// started after password change\nIssue: Outlook keeps prompting for credentials";

    #[test]
    fn parses_full_ticket_message() {
        let parsed = MessageParser::default().parse(SCENARIO);
        assert!(parsed.is_ticket);
        let d = parsed.delta;
        assert_eq!(d.ticket_id.as_deref(), Some("INC12345"));
        assert_eq!(d.device, DeviceCategory::Mac);
        assert_eq!(d.serial.as_deref(), Some("C02TEST12345"));
        assert_eq!(d.app.as_deref(), Some("Outlook"));
        assert_eq!(d.ssid.as_deref(), Some("TC-Corp"));
        assert_eq!(
            d.issue.as_deref(),
            Some("Outlook keeps prompting for credentials")
        );
        assert_eq!(d.annotations, vec!["started after password change"]);
    }

    #[test]
    fn parsing_is_deterministic() {
        let parser = MessageParser::default();
        assert_eq!(parser.parse(SCENARIO), parser.parse(SCENARIO));
    }

    #[test]
    fn plain_chat_is_not_a_ticket() {
        let parsed = MessageParser::default().parse("my iphone won't join wifi");
        assert!(!parsed.is_ticket);
        assert_eq!(parsed.delta.device, DeviceCategory::IPhone);
        assert_eq!(
            parsed.delta.issue.as_deref(),
            Some("my iphone won't join wifi")
        );
    }

    #[test]
    fn ticket_marker_only_counts_on_first_line() {
        let parsed = MessageParser::default().parse("hello\n##INC9 follow-up");
        assert!(!parsed.is_ticket);
        assert_eq!(parsed.delta.issue.as_deref(), Some("hello"));
    }

    #[test]
    fn synonyms_map_to_fields() {
        let parsed = MessageParser::default()
            .parse("SN: c02 abc 12345\nApplication: Teams\nWi-Fi: Guest\nOS Version: 14.4");
        let d = parsed.delta;
        assert_eq!(d.serial.as_deref(), Some("c02 abc 12345"));
        assert_eq!(d.normalized_serial().as_deref(), Some("C02ABC12345"));
        assert_eq!(d.app.as_deref(), Some("Teams"));
        assert_eq!(d.ssid.as_deref(), Some("Guest"));
        assert_eq!(d.os_version.as_deref(), Some("14.4"));
    }

    #[test]
    fn every_synonym_resolves() {
        for (key, field) in FIELD_SYNONYMS {
            let line = format!("{}: value", key);
            assert_eq!(split_key_value(&line), Some((*field, "value")), "{}", key);
        }
    }

    #[test]
    fn unknown_keys_become_issue_candidates() {
        let parsed = MessageParser::default().parse("Error: cannot sign in\nSerial: X1");
        assert_eq!(parsed.delta.issue.as_deref(), Some("Error: cannot sign in"));
        assert_eq!(parsed.delta.serial.as_deref(), Some("X1"));
    }

    #[test]
    fn blank_values_are_not_assigned() {
        let parsed = MessageParser::default().parse("Serial:   \nApp:");
        assert_eq!(parsed.delta.serial, None);
        assert_eq!(parsed.delta.app, None);
        assert_eq!(parsed.delta.issue.as_deref(), Some("Serial:"));
    }

    #[test]
    fn device_field_value_is_categorized() {
        let parsed = MessageParser::default().parse("Device: Dell Latitude\nmy mac is fine");
        assert_eq!(parsed.delta.device, DeviceCategory::NonApple);
    }

    #[test]
    fn model_line_keeps_apple_device() {
        let parser = MessageParser::default();
        let parsed =
            parser.parse("##INC1\nDevice: MacBook Pro\nModel: A2442\nSerial: C02X\nIssue: Outlook crashes");
        assert_eq!(parsed.delta.device, DeviceCategory::Mac);

        let reversed = parser.parse("Model: A2442\nHardware: iPad Pro");
        assert_eq!(reversed.delta.device, DeviceCategory::IPad);

        let first_apple_wins = parser.parse("Device: iPhone 15\nModel: MacBook Air");
        assert_eq!(first_apple_wins.delta.device, DeviceCategory::IPhone);
    }

    #[test]
    fn ticket_marker_must_open_the_message() {
        let parsed = MessageParser::default().parse("\n##INC9\nVPN drops");
        assert!(!parsed.is_ticket);
        assert_eq!(parsed.delta.issue.as_deref(), Some("VPN drops"));
    }

    #[test]
    fn device_inference_table() {
        assert_eq!(infer_device(""), DeviceCategory::Unknown);
        assert_eq!(infer_device("   "), DeviceCategory::Unknown);
        assert_eq!(infer_device("iMac 24"), DeviceCategory::Mac);
        assert_eq!(infer_device("my iPad Air"), DeviceCategory::IPad);
        assert_eq!(infer_device("Surface laptop"), DeviceCategory::NonApple);
    }

    #[test]
    fn custom_markers_from_policy() {
        let parser = MessageParser::new("!!", "#");
        let parsed = parser.parse("!! REQ-77\n# user is remote\nIssue: VPN drops");
        assert_eq!(parsed.delta.ticket_id.as_deref(), Some("REQ-77"));
        assert_eq!(parsed.delta.annotations, vec!["user is remote"]);
        assert_eq!(parsed.delta.issue.as_deref(), Some("VPN drops"));
    }
}
