//! # Triage Harness CLI (`triage`)
//!
//! The `triage` binary imports a support dataset, searches it, and runs
//! interactive triage sessions against it.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite database and run schema migrations |
//! | `triage import` | Import the dataset (no-op when nothing changed) |
//! | `triage search "<query>"` | Ranked KB search |
//! | `triage lookup <text>` | Inventory lookup by serial, user, asset tag, phone |
//! | `triage link --serial <sn>` | Cross-source linked context with confidence |
//! | `triage chat` | Interactive triage session over stdin |
//! | `triage stats` | Database summary |
//! | `triage diagnostics` | Recent diagnostics entries, or `--prune` |
//! | `triage templates ...` | Saved response templates |
//! | `triage tickets` | Tracked ticket history |
//!
//! ## Examples
//!
//! ```bash
//! triage import --config ./config/triage.toml
//! triage search "outlook login" --device mac --app outlook
//! triage lookup "C02 ABC 12345" --field serial
//! triage chat < ticket.txt
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_harness::models::LookupField;
use triage_harness::{
    config, diagnostics, ingest, migrate, orchestrator, retrieval, stats, tickets,
};

/// Triage Harness CLI: dataset import, KB search, inventory lookup, and
/// guided IT-support triage.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Triage Harness: local-first IT support triage over an imported dataset",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import the configured dataset.
    ///
    /// Fingerprints every discovered file first; when nothing changed the
    /// import is a no-op. Any change triggers a full refresh.
    Import {
        /// Re-import even when every fingerprint matches.
        #[arg(long)]
        force: bool,

        /// Print the import report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the knowledge base.
    Search {
        /// The search query string.
        query: String,

        /// Preferred device (`mac`, `iphone`, `ipad`) for reranking.
        #[arg(long)]
        device: Option<String>,

        /// Preferred app for reranking.
        #[arg(long)]
        app: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Look up inventory records.
    Lookup {
        /// Free text to match.
        text: String,

        /// Field to match: serial, display, username, asset_tag, phone, any.
        #[arg(long, default_value = "any")]
        field: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,

        #[arg(long)]
        json: bool,
    },

    /// Show inventory records linked to a serial and/or username.
    Link {
        #[arg(long)]
        serial: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Run an interactive triage session on stdin.
    ///
    /// Finish each message with a blank line.
    Chat {
        /// Print one JSON response per message instead of rendered text.
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show recent diagnostics entries.
    Diagnostics {
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Delete entries older than the configured retention instead.
        #[arg(long)]
        prune: bool,

        #[arg(long)]
        json: bool,
    },

    /// Manage saved response templates.
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// List tracked tickets, most recently updated first.
    Tickets {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List saved templates.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create or replace a template.
    Set { name: String, body: String },
    /// Delete a template.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("triage_harness={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { force, json } => {
            ingest::run_import(&cfg, force, json).await?;
        }
        Commands::Search {
            query,
            device,
            app,
            limit,
            json,
        } => {
            retrieval::run_search(&cfg, &query, device, app, limit, json).await?;
        }
        Commands::Lookup {
            text,
            field,
            limit,
            json,
        } => {
            let Some(field) = LookupField::parse(&field) else {
                bail!(
                    "Unknown lookup field: {}. Use serial, display, username, asset_tag, phone, or any.",
                    field
                );
            };
            retrieval::run_lookup(&cfg, &text, field, limit, json).await?;
        }
        Commands::Link {
            serial,
            username,
            json,
        } => {
            retrieval::run_link(&cfg, serial, username, json).await?;
        }
        Commands::Chat { json } => {
            orchestrator::run_chat(&cfg, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Diagnostics { limit, prune, json } => {
            diagnostics::run_diagnostics(&cfg, limit, prune, json).await?;
        }
        Commands::Templates { action } => match action {
            TemplateAction::List { json } => tickets::run_template_list(&cfg, json).await?,
            TemplateAction::Set { name, body } => {
                tickets::run_template_set(&cfg, &name, &body).await?
            }
            TemplateAction::Delete { name } => tickets::run_template_delete(&cfg, &name).await?,
        },
        Commands::Tickets { limit, json } => {
            tickets::run_tickets(&cfg, limit, json).await?;
        }
    }

    Ok(())
}
