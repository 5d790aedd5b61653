//! Login hook entry points: `bip check` after a failed login, `bip clean`
//! after a successful one.
//!
//! Both exit successfully whatever happens so a broken ban setup never
//! locks users out.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, warn};

use super::Context;
use crate::failure::FailureOutcome;

/// Remote address from the argument, else `PAM_RHOST`, else `RHOST`.
fn remote_address(arg: Option<String>) -> Option<String> {
    pick_address(
        arg,
        std::env::var("PAM_RHOST").ok(),
        std::env::var("RHOST").ok(),
    )
}

fn pick_address(
    arg: Option<String>,
    pam_rhost: Option<String>,
    rhost: Option<String>,
) -> Option<String> {
    [arg, pam_rhost, rhost]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Run the check command
pub async fn run(ip: Option<String>, config_path: &Path) -> Result<()> {
    let Some(address) = remote_address(ip) else {
        debug!("No remote address, nothing to record");
        return Ok(());
    };

    if let Err(e) = record(&address, config_path).await {
        warn!("Failed login from {} not recorded: {:#}", address, e);
    }
    Ok(())
}

async fn record(address: &str, config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let outcome = ctx
        .counter
        .on_failed_login(address, &ctx.orchestrator, ctx.config.max_retries)
        .await?;

    match outcome {
        FailureOutcome::Whitelisted => debug!("{} is whitelisted", address),
        FailureOutcome::Counted(n) => {
            debug!("{}: {}/{} failures", address, n, ctx.config.max_retries)
        }
        FailureOutcome::BanTriggered(n) => {
            debug!("{}: ban triggered after {} failures", address, n)
        }
    }
    Ok(())
}

/// Run the clean command
pub async fn run_clean(ip: Option<String>, config_path: &Path) -> Result<()> {
    let Some(address) = remote_address(ip) else {
        debug!("No remote address, nothing to clear");
        return Ok(());
    };

    let cleared = Context::load(config_path).and_then(|ctx| {
        ctx.counter
            .on_success(&address, ctx.orchestrator.events())
            .map_err(Into::into)
    });
    if let Err(e) = cleared {
        warn!("Failure record for {} not cleared: {:#}", address, e);
    }
    Ok(())
}
