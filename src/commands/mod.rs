//! CLI command implementations.

pub mod ban;
pub mod check;
pub mod config;
pub mod enrich;
pub mod list;
pub mod restore;
pub mod show;
pub mod vip;

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::BipError;
use crate::events::EventLog;
use crate::failure::FailureCounter;
use crate::firewall::{FirewallSync, NftablesBackend, RuleSettings};
use crate::geo::{GeoEnricher, IpInfoResolver};
use crate::orchestrator::{BanOrchestrator, ProcessScheduler};
use crate::store::BanStore;
use crate::whitelist::WhitelistGuard;

/// Components wired from one configuration file.
pub struct Context {
    pub config: Config,
    pub orchestrator: BanOrchestrator,
    pub enricher: Arc<GeoEnricher>,
    pub counter: FailureCounter,
}

impl Context {
    /// Load the config (defaults when absent) and build the production
    /// nftables backend, ipinfo resolver and detached enrichment scheduler.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = Config::load_or_default(config_path)
            .with_context(|| format!("Cannot load configuration from {:?}", config_path))?;

        let backend = Arc::new(NftablesBackend::new(RuleSettings::from_config(&config)));
        let firewall = FirewallSync::new(backend, config.ban_duration()?);

        let store = BanStore::new(config.blacklist_path());
        let events = EventLog::new(&config.log_file);
        let resolver = Arc::new(IpInfoResolver::new()?);
        let enricher = Arc::new(GeoEnricher::new(resolver, store.clone(), events.clone()));
        let scheduler = ProcessScheduler::new(config_path)?;

        let orchestrator = BanOrchestrator::new(
            WhitelistGuard::new(config.whitelist_path()),
            store,
            firewall,
            Arc::clone(&enricher),
            Box::new(scheduler),
            events,
        );

        Ok(Self {
            counter: FailureCounter::new(config.counts_dir()),
            config,
            orchestrator,
            enricher,
        })
    }
}

/// Exit code for a failed command: the first [`BipError`] in the chain
/// decides, anything else is 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BipError>())
        .map_or(1, BipError::exit_code)
}
