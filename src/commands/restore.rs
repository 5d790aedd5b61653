//! `bip restore`: rebuild firewall state after a reboot or flush.

use anyhow::{Context as _, Result};
use std::path::Path;
use tracing::warn;

use super::Context;
use crate::firewall::check_root;

/// Run the restore command
pub async fn run(config_path: &Path) -> Result<()> {
    check_root()?;

    let ctx = Context::load(config_path)?;
    let summary = ctx
        .orchestrator
        .restore()
        .await
        .context("Failed to restore firewall state")?;

    println!(
        "[OK] Restored {} ban(s) and {} whitelist entr{}",
        summary.bans,
        summary.allows,
        if summary.allows == 1 { "y" } else { "ies" }
    );
    match ctx.orchestrator.firewall().count_bans().await {
        Ok(live) => println!("     {} element(s) now in the ban sets", live),
        Err(e) => warn!("{}", e),
    }
    Ok(())
}
