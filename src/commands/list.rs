//! Overview report: `bip list`, `bip list --json`, `bip list --watch`.

use anyhow::{Context as _, Result};
use std::path::Path;

use super::Context;
use crate::signal::ShutdownToken;
use crate::stats;

/// Run the list command
pub async fn run(watch: bool, json: bool, config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let orchestrator = &ctx.orchestrator;

    if watch {
        let token = ShutdownToken::listen();
        stats::watch(
            orchestrator.firewall(),
            orchestrator.store(),
            orchestrator.events(),
            &token,
        )
        .await?;
        return Ok(());
    }

    let overview = stats::collect(
        orchestrator.firewall(),
        orchestrator.store(),
        orchestrator.events(),
    )
    .await?;

    if json {
        let text =
            serde_json::to_string_pretty(&overview).context("Failed to serialize overview")?;
        println!("{}", text);
    } else {
        print!("{}", stats::render(&overview));
    }
    Ok(())
}
