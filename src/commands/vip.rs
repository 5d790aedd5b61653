//! Whitelist management (`bip vip add|del|list`).

use anyhow::{Context as _, Result};
use std::path::Path;

use super::Context;
use crate::cli::VipAction;
use crate::firewall::check_root;
use crate::validation::parse_target;

/// Run the vip command
pub async fn run(action: VipAction, config_path: &Path) -> Result<()> {
    match action {
        VipAction::Add { ip } => add(&ip, config_path).await,
        VipAction::Del { ip } => del(&ip, config_path).await,
        VipAction::List => list(config_path),
    }
}

async fn add(ip: &str, config_path: &Path) -> Result<()> {
    let target = parse_target(ip)?;
    check_root()?;

    let ctx = Context::load(config_path)?;
    let added = ctx
        .orchestrator
        .whitelist_add(ip)
        .await
        .with_context(|| format!("Failed to whitelist {}", target))?;

    if added {
        println!("[OK] Added {} to whitelist", target);
    } else {
        println!("{} is already in the whitelist", target);
    }
    Ok(())
}

async fn del(ip: &str, config_path: &Path) -> Result<()> {
    let target = parse_target(ip)?;
    check_root()?;

    let ctx = Context::load(config_path)?;
    if ctx.orchestrator.whitelist_remove(ip).await? {
        println!("[OK] Removed {} from whitelist", target);
    } else {
        println!("{} was not in the whitelist", target);
    }
    Ok(())
}

fn list(config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let entries = ctx.orchestrator.whitelist_list()?;

    println!("Whitelist ({} entries):", entries.len());
    if entries.is_empty() {
        println!("  (empty)");
    }
    for entry in &entries {
        println!("  {}", entry);
    }
    Ok(())
}
