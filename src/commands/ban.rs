//! Manual ban and unban.

use anyhow::{Context as _, Result};
use std::path::Path;

use super::Context;
use crate::firewall::check_root;
use crate::orchestrator::BanOutcome;
use crate::validation::parse_target;

/// Run the add command
pub async fn add(ip: &str, config_path: &Path) -> Result<()> {
    let target = parse_target(ip)?;
    check_root()?;

    let ctx = Context::load(config_path)?;
    let outcome = ctx
        .orchestrator
        .ban(ip, true)
        .await
        .with_context(|| format!("Failed to ban {}", target))?;

    match outcome {
        BanOutcome::Banned => println!(
            "[OK] Banned {} ({})",
            target,
            ctx.orchestrator.firewall().ban_duration()
        ),
        BanOutcome::Whitelisted => println!("{} is whitelisted, not banned", target),
    }
    Ok(())
}

/// Run the del command
pub async fn del(ip: &str, config_path: &Path) -> Result<()> {
    let target = parse_target(ip)?;
    check_root()?;

    let ctx = Context::load(config_path)?;
    ctx.orchestrator
        .unban(ip)
        .await
        .with_context(|| format!("Failed to unban {}", target))?;

    println!("[OK] Unbanned {}", target);
    Ok(())
}
