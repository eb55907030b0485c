//! # Triage Harness
//!
//! A local-first IT support triage engine for Apple devices.
//!
//! Triage Harness imports a heterogeneous support dataset (knowledge-base
//! articles, device inventories, asset registers, intake exports, and a
//! workflow policy) into SQLite, then answers support messages: it parses
//! free-form ticket text into structured intake, asks for whatever is
//! missing, and once intake is complete returns troubleshooting steps,
//! likely causes, and citations from the knowledge base, linked to the
//! matching inventory records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Dataset    │──▶│ Import       │──▶│  SQLite   │
//! │ JSONL/CSV/  │   │ discover +   │   │ FTS5 +    │
//! │ PDF/Office  │   │ fingerprint  │   │ inventory │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                   ┌──────────────┐   ┌─────▼─────┐
//!      message ───▶ │ Conversation │──▶│ Retrieval │
//!                   │ parse+assess │   │ rerank +  │
//!                   └──────┬───────┘   │ linking   │
//!                          ▼           └───────────┘
//!                   TriageResponse
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                        # create database
//! triage import                      # import the dataset root
//! triage search "outlook login"      # ranked KB search
//! triage chat                        # interactive triage session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`policy`] | Workflow policy document |
//! | [`parser`] | Free-form message → intake delta |
//! | [`intake`] | Intake completeness state machine |
//! | [`discover`] | Dataset discovery, fingerprints, file roles |
//! | [`extract`] | PDF / Office / RTF text extraction |
//! | [`kb_import`] | KB article normalization |
//! | [`inventory_import`] | Inventory field mapping |
//! | [`ingest`] | Import pipeline |
//! | [`store`] | Repository traits, SQLite and in-memory stores |
//! | [`retrieval`] | KB search, inventory lookup, linking |
//! | [`respond`] | Response composition and rendering |
//! | [`orchestrator`] | Conversation orchestration |
//! | [`workspace`] | Store/diagnostics facade with the import gate |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod csv;
pub mod db;
pub mod diagnostics;
pub mod discover;
pub mod extract;
pub mod ingest;
pub mod intake;
pub mod inventory_import;
pub mod jsonl;
pub mod kb_import;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod parser;
pub mod policy;
pub mod respond;
pub mod retrieval;
pub mod stats;
pub mod store;
pub mod tickets;
pub mod workspace;
