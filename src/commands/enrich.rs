//! Hidden `bip enrich <ip>`: the detached child started after a ban.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use super::Context;
use crate::validation::validate_ip;

/// Run the enrich command
pub async fn run(ip: &str, config_path: &Path) -> Result<()> {
    let address = validate_ip(ip)?.to_string();
    let ctx = Context::load(config_path)?;

    let summary = ctx.enricher.enrich(&address).await;
    debug!(
        "{}: country {:?}, {} supplemented",
        address, summary.country, summary.supplemented
    );
    Ok(())
}
