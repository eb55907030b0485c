//! Intake completeness state machine.
//!
//! [`assess`] is a pure function over an [`IntakeRecord`]: five ordered
//! checks, the first one that fails decides the state. Device legitimacy
//! gates everything else, then serial, issue, and finally app/SSID.
//! [`assess_policy`] additionally rejects Apple devices whose platform the
//! workflow policy does not list.

use serde::Serialize;

use crate::models::{IntakeField, IntakeRecord};
use crate::policy::{default_required_details, WorkflowPolicy};

/// Minimum trimmed length for an issue description to count as present.
pub const MIN_ISSUE_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    UnknownOrNonApple,
    MissingSerial,
    MissingIssue,
    MissingAppOrSsid,
    Ready,
}

impl IntakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeState::UnknownOrNonApple => "unknown_or_non_apple",
            IntakeState::MissingSerial => "missing_serial",
            IntakeState::MissingIssue => "missing_issue",
            IntakeState::MissingAppOrSsid => "missing_app_or_ssid",
            IntakeState::Ready => "ready",
        }
    }

    /// Follow-up prompts for this state, in the order they are asked. The
    /// device prompts name the devices `policy` supports.
    pub fn prompts(&self, policy: &WorkflowPolicy) -> Vec<String> {
        if *self == IntakeState::UnknownOrNonApple {
            return policy.device_prompts();
        }
        self.fixed_prompts().iter().map(|p| p.to_string()).collect()
    }

    fn fixed_prompts(&self) -> &'static [&'static str] {
        match self {
            IntakeState::UnknownOrNonApple | IntakeState::Ready => &[],
            IntakeState::MissingSerial => &[
                "What is the device serial number? On a Mac: Apple menu > About This Mac. On iPhone/iPad: Settings > General > About.",
            ],
            IntakeState::MissingIssue => &[
                "Please describe the issue: what happens, when it started, and any error message shown.",
            ],
            IntakeState::MissingAppOrSsid => &[
                "Which app was in use when the problem occurred?",
                "Which Wi-Fi network (SSID) is the device connected to?",
            ],
        }
    }
}

impl std::fmt::Display for IntakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`assess`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub state: IntakeState,
    pub missing: Vec<IntakeField>,
}

impl Assessment {
    fn new(state: IntakeState, missing: Vec<IntakeField>) -> Self {
        Self { state, missing }
    }

    pub fn is_ready(&self) -> bool {
        self.state == IntakeState::Ready
    }

    pub fn prompts(&self, policy: &WorkflowPolicy) -> Vec<String> {
        self.state.prompts(policy)
    }
}

/// Assess intake completeness with every detail required.
pub fn assess(intake: &IntakeRecord) -> Assessment {
    assess_with(intake, &default_required_details())
}

/// Assess intake completeness against a policy's required details.
///
/// The device check always runs. Serial, issue, app, and SSID checks run
/// only when the field is listed in `required`.
pub fn assess_with(intake: &IntakeRecord, required: &[IntakeField]) -> Assessment {
    if !intake.device.is_apple() {
        return Assessment::new(IntakeState::UnknownOrNonApple, vec![IntakeField::Device]);
    }

    if required.contains(&IntakeField::Serial) && intake.normalized_serial().is_none() {
        return Assessment::new(IntakeState::MissingSerial, vec![IntakeField::Serial]);
    }

    if required.contains(&IntakeField::Issue) {
        let issue_len = intake
            .issue
            .as_deref()
            .map(|s| s.trim().chars().count())
            .unwrap_or(0);
        if issue_len < MIN_ISSUE_CHARS {
            return Assessment::new(IntakeState::MissingIssue, vec![IntakeField::Issue]);
        }
    }

    let mut missing = Vec::new();
    if required.contains(&IntakeField::App) && is_blank(&intake.app) {
        missing.push(IntakeField::App);
    }
    if required.contains(&IntakeField::Ssid) && is_blank(&intake.ssid) {
        missing.push(IntakeField::Ssid);
    }
    if !missing.is_empty() {
        return Assessment::new(IntakeState::MissingAppOrSsid, missing);
    }

    Assessment::new(IntakeState::Ready, Vec::new())
}

/// Assess against a full workflow policy: an Apple device on a platform the
/// policy does not list is treated like a non-Apple device.
pub fn assess_policy(intake: &IntakeRecord, policy: &WorkflowPolicy) -> Assessment {
    if intake.device.is_apple() && !policy.supports(intake.device) {
        return Assessment::new(IntakeState::UnknownOrNonApple, vec![IntakeField::Device]);
    }
    assess_with(intake, &policy.required_details)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
