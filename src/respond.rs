//! Response composition and plain-text rendering.
//!
//! A [`Composer`] turns search hits, the session intake, and optional linked
//! inventory context into a [`TriageResponse`]. [`render_text`] prints it
//! for the terminal; the same value serializes to JSON for automation.

use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::intake::{Assessment, IntakeState};
use crate::models::{IntakeRecord, KbHit, LinkedContext};
use crate::policy::WorkflowPolicy;

/// Maximum number of troubleshooting steps taken from one article.
pub const MAX_STEPS: usize = 8;

pub const ESCALATION_MESSAGE: &str = "No matching knowledge-base article was found. Escalate to the next support tier with the collected intake details.";

/// Opening lines for a newly started ticket, chosen by an explicit index.
pub const EMPATHY_OPENERS: &[&str] = &[
    "Thanks for the details, let's get this sorted out.",
    "Sorry you're running into this. Here's what to try.",
    "Thanks for your patience. Let's work through it.",
    "I understand how disruptive this is. Let's start here.",
];

/// Keyword triggers (matched as lowercase substrings) and the cause they
/// suggest, in the order causes are listed.
pub const CAUSE_TRIGGERS: &[(&[&str], &str)] = &[
    (
        &["password", "credential"],
        "Saved credentials may be out of date after a recent password change.",
    ),
    (
        &["cache"],
        "Corrupted local cache data can cause repeated failures.",
    ),
    (
        &["vpn"],
        "The VPN connection or its configuration may be blocking access.",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    FollowUp,
    Troubleshooting,
    Escalation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub source_path: String,
    pub score: f64,
}

impl From<&KbHit> for Citation {
    fn from(hit: &KbHit) -> Self {
        Self {
            id: hit.article.id.clone(),
            title: hit.article.title.clone(),
            source_path: hit.article.source_path.clone(),
            score: hit.score,
        }
    }
}

/// One turn's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageResponse {
    pub kind: ResponseKind,
    pub state: Option<IntakeState>,
    pub ticket_id: Option<String>,
    /// True on the turn a ticket identifier first appears.
    pub new_ticket: bool,
    pub prompts: Vec<String>,
    pub steps: Vec<String>,
    pub causes: Vec<String>,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked: Option<LinkedContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<String>,
}

impl TriageResponse {
    fn empty(kind: ResponseKind) -> Self {
        Self {
            kind,
            state: None,
            ticket_id: None,
            new_ticket: false,
            prompts: Vec::new(),
            steps: Vec::new(),
            causes: Vec::new(),
            citations: Vec::new(),
            linked: None,
            escalation: None,
        }
    }

    /// Attach ticket identity and intake state.
    pub fn for_ticket(
        mut self,
        ticket_id: Option<String>,
        new_ticket: bool,
        state: Option<IntakeState>,
    ) -> Self {
        self.ticket_id = ticket_id;
        self.new_ticket = new_ticket;
        self.state = state;
        self
    }
}

/// Builds responses with the configured citation and cause limits.
#[derive(Debug, Clone)]
pub struct Composer {
    pub citation_limit: usize,
    pub max_causes: usize,
}

impl Default for Composer {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for Composer {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            citation_limit: config.citation_limit,
            max_causes: config.max_causes,
        }
    }
}

impl Composer {
    /// Follow-up prompts only; no retrieval results.
    pub fn follow_up(&self, assessment: &Assessment, policy: &WorkflowPolicy) -> TriageResponse {
        let mut response = TriageResponse::empty(ResponseKind::FollowUp);
        response.prompts = assessment.prompts(policy);
        response
    }

    /// The fixed response for a query with no matching article.
    pub fn escalation(&self) -> TriageResponse {
        let mut response = TriageResponse::empty(ResponseKind::Escalation);
        response.escalation = Some(ESCALATION_MESSAGE.to_string());
        response
    }

    /// Steps from the top hit, causes from intake and article content, and
    /// citations from the leading hits. No hits means escalation, with
    /// intake-derived causes still listed.
    pub fn answer(
        &self,
        hits: &[KbHit],
        intake: &IntakeRecord,
        linked: Option<LinkedContext>,
    ) -> TriageResponse {
        let top = hits.first();
        let mut response = match top {
            Some(hit) => {
                let mut r = TriageResponse::empty(ResponseKind::Troubleshooting);
                r.steps = steps_from_body(&hit.article.body);
                r
            }
            None => self.escalation(),
        };

        let article_text = top
            .map(|h| format!("{}\n{}", h.article.title, h.article.body))
            .unwrap_or_default();
        response.causes = self.causes(intake, &article_text, linked.as_ref());
        response.citations = hits
            .iter()
            .take(self.citation_limit)
            .map(Citation::from)
            .collect();
        response.linked = linked.filter(|l| !l.records.is_empty());
        response
    }

    fn causes(
        &self,
        intake: &IntakeRecord,
        article_text: &str,
        linked: Option<&LinkedContext>,
    ) -> Vec<String> {
        let mut causes: Vec<String> = Vec::new();
        let mut push = |cause: String| {
            if !causes.contains(&cause) {
                causes.push(cause);
            }
        };

        if let Some(sentence) = linked.and_then(linked_sentence) {
            push(sentence);
        }

        let mut haystack = String::new();
        for part in intake.issue.iter().chain(intake.annotations.iter()) {
            haystack.push_str(part);
            haystack.push('\n');
        }
        haystack.push_str(article_text);
        for cause in trigger_causes(&haystack) {
            push(cause.to_string());
        }

        if let Some(os) = non_blank(&intake.os_version) {
            push(format!(
                "The device is on {}; confirm it meets the minimum supported version.",
                os
            ));
        }
        if let Some(ssid) = non_blank(&intake.ssid) {
            push(format!(
                "Network restrictions on the \"{}\" Wi-Fi network may interfere.",
                ssid
            ));
        }
        if let Some(app) = non_blank(&intake.app) {
            push(format!(
                "{} may need an update or a local reset of its settings.",
                app
            ));
        }

        causes.truncate(self.max_causes);
        causes
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Causes whose trigger words appear in `text`, in table order.
pub fn trigger_causes(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    CAUSE_TRIGGERS
        .iter()
        .filter(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, cause)| *cause)
        .collect()
}

/// One sentence summarizing the best linked inventory record.
pub fn linked_sentence(linked: &LinkedContext) -> Option<String> {
    let record = linked.records.first()?;
    let who = record
        .display_name
        .as_deref()
        .or(record.username.as_deref())
        .unwrap_or("an unassigned user");
    let mut sentence = format!(
        "Inventory ({}) links this device to {}",
        record.source_type.as_str(),
        who
    );
    if let Some(model) = record.model.as_deref() {
        sentence.push_str(&format!(", model {}", model));
    }
    if let Some(os) = record.os_version.as_deref() {
        sentence.push_str(&format!(", OS {}", os));
    }
    sentence.push_str(&format!(" (confidence {:.2}).", linked.confidence));
    Some(sentence)
}

/// Strip a leading list marker: `1.`, `2)`, `-`, `*`, `•`, or `Step 3:`.
fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }

    let lower = line.to_ascii_lowercase();
    let body = if lower.starts_with("step ") { &line[5..] } else { line };
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &body[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')', ':']) {
            return rest.trim_start();
        }
    }
    line
}

/// Troubleshooting steps from an article body.
///
/// Each non-empty line is a step with list markers removed; markdown
/// headings are skipped. A single-paragraph body is split into sentences.
pub fn steps_from_body(body: &str) -> Vec<String> {
    let lines: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| strip_marker(l).to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let steps = if lines.len() == 1 {
        split_sentences(&lines[0])
    } else {
        lines
    };
    steps.into_iter().take(MAX_STEPS).collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Render a response for the terminal.
///
/// `opener` picks an entry of [`EMPATHY_OPENERS`] (wrapping) and is only
/// used on the turn a ticket starts. Non-follow-up responses always print
/// the steps section before the causes section.
pub fn render_text(response: &TriageResponse, opener: Option<usize>) -> String {
    let mut out = String::new();

    if response.new_ticket {
        if let Some(index) = opener {
            out.push_str(EMPATHY_OPENERS[index % EMPATHY_OPENERS.len()]);
            out.push_str("\n\n");
        }
    }
    if let Some(ticket) = &response.ticket_id {
        match response.state {
            Some(state) => out.push_str(&format!("Ticket {} [{}]\n\n", ticket, state)),
            None => out.push_str(&format!("Ticket {}\n\n", ticket)),
        }
    }

    if response.kind == ResponseKind::FollowUp {
        out.push_str("More information needed:\n");
        for prompt in &response.prompts {
            out.push_str(&format!("- {}\n", prompt));
        }
        return out;
    }

    out.push_str("Troubleshooting steps:\n");
    if let Some(message) = &response.escalation {
        out.push_str(&format!("1. {}\n", message));
    }
    for (i, step) in response.steps.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }

    out.push_str("\nPossible causes:\n");
    if response.causes.is_empty() {
        out.push_str("- None identified.\n");
    }
    for cause in &response.causes {
        out.push_str(&format!("- {}\n", cause));
    }

    if !response.citations.is_empty() {
        out.push_str("\nSources:\n");
        for (i, c) in response.citations.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} ({}) score {:.2}\n",
                i + 1,
                c.title,
                c.source_path,
                c.score
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceCategory, InventoryRecord, SourceType};
    use crate::normalize::build_article;

    fn hit(id: &str, title: &str, body: &str, score: f64) -> KbHit {
        KbHit {
            article: build_article(id.into(), title, body, "/kb/kb_corpus.jsonl"),
            score,
        }
    }

    fn intake() -> IntakeRecord {
        IntakeRecord {
            ticket_id: Some("INC1".into()),
            device: DeviceCategory::Mac,
            serial: Some("C02TEST12345".into()),
            issue: Some("Outlook keeps prompting".into()),
            app: Some("Outlook".into()),
            ssid: Some("TC-Corp".into()),
            os_version: None,
            annotations: vec!["started after password change".into()],
        }
    }

    #[test]
    fn numbered_steps_are_stripped() {
        let steps = steps_from_body("# Fix\n1. Quit Outlook\n2) Open Keychain Access\n- Remove the entry\nStep 4: Relaunch");
        assert_eq!(
            steps,
            vec![
                "Quit Outlook",
                "Open Keychain Access",
                "Remove the entry",
                "Relaunch"
            ]
        );
    }

    #[test]
    fn single_paragraph_is_split_into_sentences() {
        let steps = steps_from_body("Quit the app. Clear the cache! Version 2.1 is fine. Relaunch");
        assert_eq!(
            steps,
            vec![
                "Quit the app.",
                "Clear the cache!",
                "Version 2.1 is fine.",
                "Relaunch"
            ]
        );
    }

    #[test]
    fn steps_are_capped() {
        let body: String = (1..=12).map(|i| format!("{}. step {}\n", i, i)).collect();
        assert_eq!(steps_from_body(&body).len(), MAX_STEPS);
    }

    #[test]
    fn triggers_follow_table_order() {
        assert_eq!(
            trigger_causes("VPN drops and the CACHE is full; credentials rejected"),
            vec![CAUSE_TRIGGERS[0].1, CAUSE_TRIGGERS[1].1, CAUSE_TRIGGERS[2].1]
        );
        assert!(trigger_causes("printer jam").is_empty());
    }

    #[test]
    fn answer_uses_top_hit_and_caps_citations() {
        let hits = vec![
            hit("a", "Outlook login", "1. Quit Outlook\n2. Clear the cache", 1.2),
            hit("b", "Outlook sync", "Restart", 0.9),
            hit("c", "Outlook rules", "Restart", 0.8),
            hit("d", "Outlook search", "Restart", 0.7),
        ];
        let response = Composer::default().answer(&hits, &intake(), None);
        assert_eq!(response.kind, ResponseKind::Troubleshooting);
        assert_eq!(response.steps, vec!["Quit Outlook", "Clear the cache"]);
        assert_eq!(response.citations.len(), 3);
        assert_eq!(response.citations[0].id, "a");
        assert_eq!(response.causes[0], CAUSE_TRIGGERS[0].1);
        assert!(response.causes.contains(&CAUSE_TRIGGERS[1].1.to_string()));
        assert!(response.causes.iter().any(|c| c.contains("TC-Corp")));
    }

    #[test]
    fn linked_sentence_comes_first_and_causes_are_capped() {
        let linked = LinkedContext {
            records: vec![InventoryRecord {
                id: "r1".into(),
                source_file: "managed_macs.jsonl".into(),
                source_type: SourceType::ManagedMac,
                serial_number: Some("C02TEST12345".into()),
                username: Some("jdoe".into()),
                display_name: Some("Jane Doe".into()),
                asset_tag: None,
                phone: None,
                os_version: Some("14.4".into()),
                model: Some("MacBook Pro".into()),
                raw_json: "{}".into(),
            }],
            confidence: 1.0,
        };
        let mut record = intake();
        record.os_version = Some("14.4".into());
        record.issue = Some("vpn cache password".into());
        let composer = Composer {
            citation_limit: 3,
            max_causes: 6,
        };
        let response = composer.answer(&[hit("a", "A", "Restart", 1.0)], &record, Some(linked));
        assert!(response.causes[0].starts_with("Inventory (managed_mac) links this device to Jane Doe"));
        assert_eq!(response.causes.len(), 6);
        assert!(response.linked.is_some());
    }

    #[test]
    fn no_hits_escalates_with_intake_causes() {
        let response = Composer::default().answer(&[], &intake(), None);
        assert_eq!(response.kind, ResponseKind::Escalation);
        assert_eq!(response.escalation.as_deref(), Some(ESCALATION_MESSAGE));
        assert!(response.steps.is_empty());
        assert!(!response.causes.is_empty());
    }

    #[test]
    fn rendered_steps_precede_causes() {
        let composer = Composer::default();
        let responses = vec![
            composer.answer(&[hit("a", "A", "Do the thing", 1.0)], &intake(), None),
            composer.answer(&[], &IntakeRecord::default(), None),
            composer.escalation(),
        ];
        for response in responses {
            let text = render_text(&response, None);
            let steps = text.find("Troubleshooting steps").unwrap();
            let causes = text.find("Possible causes").unwrap();
            assert!(steps < causes, "{}", text);
        }
    }

    #[test]
    fn opener_only_on_new_ticket() {
        let response = Composer::default()
            .escalation()
            .for_ticket(Some("INC9".into()), true, None);
        let text = render_text(&response, Some(EMPATHY_OPENERS.len() + 1));
        assert!(text.starts_with(EMPATHY_OPENERS[1]));

        let repeat = response.for_ticket(Some("INC9".into()), false, None);
        assert!(render_text(&repeat, Some(1)).starts_with("Ticket INC9"));
    }

    #[test]
    fn follow_up_renders_prompts_only() {
        let assessment = crate::intake::assess(&IntakeRecord::default());
        let response = Composer::default().follow_up(&assessment, &WorkflowPolicy::default());
        let text = render_text(&response, None);
        assert!(text.contains("More information needed"));
        assert!(!text.contains("Troubleshooting steps"));
        assert_eq!(response.prompts.len(), 2);
    }
}
