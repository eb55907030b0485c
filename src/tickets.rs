//! `triage templates` and `triage tickets`: saved response templates and
//! tracked ticket history.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::stats::format_ts_relative;
use crate::store::sqlite::SqliteStore;
use crate::workspace::Workspace;

fn sqlite(workspace: &Workspace) -> Result<&SqliteStore> {
    match workspace.sqlite() {
        Some(store) => Ok(store),
        None => bail!("templates and tickets need a database-backed workspace"),
    }
}

pub async fn run_template_list(config: &Config, json: bool) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let templates = sqlite(&workspace)?.list_templates().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }
    if templates.is_empty() {
        println!("No templates.");
        return Ok(());
    }
    for template in &templates {
        println!(
            "{} (updated {})",
            template.name,
            format_ts_relative(template.updated_at)
        );
        for line in template.body.lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

pub async fn run_template_set(config: &Config, name: &str, body: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("template name must not be empty");
    }
    let workspace = Workspace::open(config).await?;
    sqlite(&workspace)?.upsert_template(name.trim(), body).await?;
    println!("saved template '{}'", name.trim());
    Ok(())
}

pub async fn run_template_delete(config: &Config, name: &str) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    if sqlite(&workspace)?.delete_template(name).await? {
        println!("deleted template '{}'", name);
    } else {
        println!("no template named '{}'", name);
    }
    Ok(())
}

pub async fn run_tickets(config: &Config, limit: i64, json: bool) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let tickets = sqlite(&workspace)?.list_tickets(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tickets)?);
        return Ok(());
    }
    if tickets.is_empty() {
        println!("No tickets.");
        return Ok(());
    }
    println!(
        "  {:<16} {:<10} {:<14} {:<22} {}",
        "TICKET", "DEVICE", "SERIAL", "STATE", "UPDATED"
    );
    println!("  {}", "-".repeat(80));
    for t in &tickets {
        println!(
            "  {:<16} {:<10} {:<14} {:<22} {}",
            t.ticket_number,
            t.device.as_deref().unwrap_or("-"),
            t.serial_number.as_deref().unwrap_or("-"),
            t.state,
            format_ts_relative(t.updated_at)
        );
    }
    Ok(())
}
