//! `bip show`: the persisted ban list.

use anyhow::Result;
use std::path::Path;

use super::Context;
use crate::stats::render_store;

/// Run the show command
pub async fn run(config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let entries = ctx.orchestrator.store().entries()?;
    print!("{}", render_store(&entries));
    Ok(())
}
