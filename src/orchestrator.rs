//! Conversation orchestration over one session-accumulated intake.
//!
//! Each turn parses the message, merges the delta into the session intake,
//! and branches: a ticket identifier (this turn or earlier) runs the ticket
//! workflow, anything else is an ad-hoc KB query.
//!
//! The ticket workflow assesses intake first and answers with follow-up
//! prompts until it is `ready`; no search runs on incomplete intake.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::intake::{assess_policy, Assessment};
use crate::models::{DeviceCategory, IntakeField, IntakeRecord, KbHit, KbQuery};
use crate::normalize::content_tokens;
use crate::parser::MessageParser;
use crate::policy::WorkflowPolicy;
use crate::respond::{render_text, Composer, TriageResponse};
use crate::store::sqlite::SqliteStore;
use crate::workspace::Workspace;

/// Search texts tried in order until one returns hits: the primary text,
/// then the app plus the primary's content tokens, then the app alone.
pub fn query_ladder(primary: &str, app: Option<&str>) -> Vec<String> {
    let app = app.map(str::trim).filter(|a| !a.is_empty());
    let content = content_tokens(primary).join(" ");

    let mut candidates = vec![primary.trim().to_string()];
    match app {
        Some(app) => {
            candidates.push(format!("{} {}", app, content));
            candidates.push(app.to_string());
        }
        None => candidates.push(content),
    }

    let mut ladder: Vec<String> = Vec::new();
    for candidate in candidates {
        let candidate = candidate.trim().to_string();
        if !candidate.is_empty() && !ladder.contains(&candidate) {
            ladder.push(candidate);
        }
    }
    ladder
}

pub struct Conversation<'a> {
    workspace: &'a Workspace,
    parser: MessageParser,
    policy: WorkflowPolicy,
    intake: IntakeRecord,
    composer: Composer,
}

impl<'a> Conversation<'a> {
    /// A conversation using the workspace's workflow policy.
    pub fn new(workspace: &'a Workspace) -> Self {
        let policy = workspace.policy();
        Self::with_policy(workspace, &policy)
    }

    pub fn with_policy(workspace: &'a Workspace, policy: &WorkflowPolicy) -> Self {
        Self {
            workspace,
            parser: MessageParser::from_policy(policy),
            policy: policy.clone(),
            intake: IntakeRecord::default(),
            composer: Composer::from(workspace.retrieval_config()),
        }
    }

    pub fn intake(&self) -> &IntakeRecord {
        &self.intake
    }

    /// Retract one field from the session intake.
    pub fn clear_field(&mut self, field: IntakeField) {
        self.intake.clear(field);
    }

    /// Discard the session intake.
    pub fn reset(&mut self) {
        self.intake = IntakeRecord::default();
    }

    /// Assess the session intake against the active policy.
    pub fn assess(&self) -> Assessment {
        assess_policy(&self.intake, &self.policy)
    }

    /// Handle one message and compose the response.
    pub async fn handle(&mut self, message: &str) -> Result<TriageResponse> {
        let parsed = self.parser.parse(message);

        let switching = matches!(
            (&self.intake.ticket_id, &parsed.delta.ticket_id),
            (Some(current), Some(incoming)) if current != incoming
        );
        let new_ticket =
            parsed.delta.ticket_id.is_some() && (switching || self.intake.ticket_id.is_none());
        if switching {
            info!(ticket = ?parsed.delta.ticket_id, "new ticket, starting a fresh intake");
            self.reset();
        }
        self.intake.merge(&parsed.delta);

        if self.intake.ticket_id.is_some() {
            self.ticket_turn(message, new_ticket).await
        } else {
            self.ad_hoc_turn(message, &parsed.delta).await
        }
    }

    async fn ticket_turn(&self, message: &str, new_ticket: bool) -> Result<TriageResponse> {
        let assessment = self.assess();
        let ticket_id = self.intake.ticket_id.clone();
        if !assessment.is_ready() {
            debug!(state = %assessment.state, "intake incomplete");
            return Ok(self
                .composer
                .follow_up(&assessment, &self.policy)
                .for_ticket(ticket_id, new_ticket, Some(assessment.state)));
        }

        let primary = self
            .intake
            .issue
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(message);
        let hits = self
            .search_ladder(primary, self.intake.app.as_deref(), self.intake.device)
            .await?;

        let linked = match self.intake.normalized_serial() {
            Some(serial) => {
                let linked = self
                    .workspace
                    .linked_context(Some(serial.as_str()), None)
                    .await?;
                (!linked.records.is_empty()).then_some(linked)
            }
            None => None,
        };

        Ok(self
            .composer
            .answer(&hits, &self.intake, linked)
            .for_ticket(ticket_id, new_ticket, Some(assessment.state)))
    }

    async fn ad_hoc_turn(&self, message: &str, delta: &IntakeRecord) -> Result<TriageResponse> {
        let hits = self
            .search_ladder(message, delta.app.as_deref(), delta.device)
            .await?;
        match hits.first() {
            None => Ok(self.composer.escalation()),
            Some(top) => Ok(self
                .composer
                .answer(std::slice::from_ref(top), delta, None)),
        }
    }

    async fn search_ladder(
        &self,
        primary: &str,
        app: Option<&str>,
        device: DeviceCategory,
    ) -> Result<Vec<KbHit>> {
        let preferred_device = device.is_apple().then_some(device);
        for text in query_ladder(primary, app) {
            let query = KbQuery {
                text: text.clone(),
                preferred_device,
                preferred_app: app.map(str::to_string),
                limit: None,
            };
            let hits = self.workspace.search(&query).await?;
            if !hits.is_empty() {
                debug!(query = %text, hits = hits.len(), "kb matches");
                return Ok(hits);
            }
        }
        Ok(Vec::new())
    }
}

/// `ui_preferences` key of the empathy-opener rotation counter.
pub const OPENER_COUNTER_KEY: &str = "empathy_opener_index";

const CHAT_HELP: &str = "Enter a message and finish it with a blank line. \
Commands: /intake, /clear <field>, /reset, /quit";

/// `triage chat`: an interactive session over stdin.
///
/// Lines accumulate until a blank line (or end of input) submits them as one
/// message. Ticket state is recorded in the ticket history, and a new ticket
/// advances the persisted opener counter.
pub async fn run_chat(config: &Config, json: bool) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let sqlite = workspace.sqlite();
    let mut conversation = Conversation::new(&workspace);

    if !json {
        println!("{}", CHAT_HELP);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer: Vec<String> = Vec::new();
    loop {
        let line = lines.next_line().await?;
        let submit = match &line {
            None => true,
            Some(l) if l.trim().is_empty() => true,
            Some(l) if buffer.is_empty() && is_chat_command(l) => {
                if !chat_command(&mut conversation, l.trim()) {
                    break;
                }
                continue;
            }
            Some(l) => {
                buffer.push(l.clone());
                false
            }
        };

        if submit && !buffer.is_empty() {
            let message = buffer.join("\n");
            buffer.clear();
            let response = conversation.handle(&message).await?;

            let mut opener = None;
            if let (Some(store), Some(state)) = (sqlite, response.state) {
                if let Err(e) = store.upsert_ticket(conversation.intake(), state.as_str()).await {
                    warn!(error = %e, "failed to record ticket history");
                }
                if response.new_ticket {
                    opener = opener_index(store).await;
                }
            }

            if json {
                println!("{}", serde_json::to_string(&response)?);
            } else {
                println!("{}", render_text(&response, opener));
            }
        }

        if line.is_none() {
            break;
        }
    }
    Ok(())
}

/// Advance the persisted opener counter. A failure only drops the opener.
async fn opener_index(store: &SqliteStore) -> Option<usize> {
    match store.next_counter(OPENER_COUNTER_KEY).await {
        Ok(index) => usize::try_from(index).ok(),
        Err(e) => {
            warn!(error = %e, "failed to advance opener counter");
            None
        }
    }
}

const CHAT_COMMANDS: &[&str] = &["/quit", "/exit", "/reset", "/intake", "/clear", "/help"];

fn is_chat_command(line: &str) -> bool {
    let word = line.split_whitespace().next().unwrap_or("");
    CHAT_COMMANDS.contains(&word)
}

/// Apply a `/command`. Returns false when the session should end.
fn chat_command(conversation: &mut Conversation<'_>, command: &str) -> bool {
    let mut parts = command.splitn(2, char::is_whitespace);
    match (parts.next().unwrap_or(""), parts.next().map(str::trim)) {
        ("/quit", _) | ("/exit", _) => return false,
        ("/reset", _) => {
            conversation.reset();
            println!("intake cleared");
        }
        ("/intake", _) => match serde_json::to_string_pretty(conversation.intake()) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!(error = %e, "failed to serialize intake"),
        },
        ("/clear", Some(name)) => match IntakeField::from_name(name) {
            Some(field) => {
                conversation.clear_field(field);
                println!("cleared {} -> {}", field.as_str(), conversation.assess().state);
            }
            None => println!("unknown field '{}'", name),
        },
        _ => println!("{}", CHAT_HELP),
    }
    true
}
