//! `bip config`: show settings, or change one and save atomically.

use anyhow::{Context as _, Result};
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::{BanDuration, Config};
use crate::error::BipError;
use crate::firewall::{check_root, FirewallBackend, NftablesBackend, RuleSettings};
use crate::lock::{lock_path_for, LockGuard};

/// Run the config command
pub async fn run(action: Option<ConfigAction>, config_path: &Path) -> Result<()> {
    match action {
        None => show(config_path),
        Some(action) => set(action, config_path).await,
    }
}

fn show(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let ban_duration = config.ban_duration()?;

    println!("Configuration ({}):", config_path.display());
    println!("  Ban time:        {}", ban_duration);
    println!("  Max retries:     {}", config.max_retries);
    println!("  Rate limit:      {}/minute on port {}", config.rate_limit, config.ssh_port);
    println!("  Rate ban time:   {}", config.rate_ban_time);
    println!("  State directory: {}", config.state_dir.display());
    println!("  Log file:        {}", config.log_file.display());
    Ok(())
}

/// Apply one change. Returns whether the firewall rules depend on it.
fn apply(config: &mut Config, action: &ConfigAction) -> Result<bool> {
    match action {
        ConfigAction::Time { value } => {
            BanDuration::parse(value)?;
            config.ban_time = value.trim().to_string();
            Ok(false)
        }
        ConfigAction::Retries { value } => {
            config.max_retries = *value;
            Ok(false)
        }
        ConfigAction::Ratelimit { value } => {
            config.rate_limit = *value;
            Ok(true)
        }
        ConfigAction::Rateban { value } => {
            config.rate_ban_time = value.trim().to_string();
            Ok(true)
        }
    }
}

async fn set(action: ConfigAction, config_path: &Path) -> Result<()> {
    check_root()?;

    let config = {
        let _lock = LockGuard::acquire(&lock_path_for(config_path))?;
        let mut config = Config::load_or_default(config_path)?;
        let affects_rules = apply(&mut config, &action)?;
        config.validate()?;
        config
            .save(config_path)
            .with_context(|| format!("Failed to save {:?}", config_path))?;
        affects_rules.then_some(config)
    };

    println!("[OK] Configuration saved");

    if let Some(config) = config {
        let backend = NftablesBackend::new(RuleSettings::from_config(&config));
        backend
            .ensure_ready()
            .await
            .map_err(|e| BipError::File(format!("{:#}", e)))
            .context("Failed to apply rate-limit rules")?;
        println!(
            "[OK] Rate limit set to {}/minute, rate ban {}",
            config.rate_limit, config.rate_ban_time
        );
    } else if matches!(action, ConfigAction::Time { .. }) {
        println!("     Applies to new bans; existing bans keep their timeout");
    }
    Ok(())
}
