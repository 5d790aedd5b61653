//! Ban lifecycle: whitelist gate, enforcement, persistence and enrichment.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BipError, Result};
use crate::events::{EventKind, EventLog};
use crate::firewall::FirewallSync;
use crate::geo::GeoEnricher;
use crate::store::BanStore;
use crate::validation::{parse_target, AddressKind, Target};
use crate::whitelist::WhitelistGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOutcome {
    /// Address is whitelisted; nothing was done
    Whitelisted,
    Banned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub bans: usize,
    pub allows: usize,
}

/// Starts an enrichment run the caller never waits for.
pub trait EnrichmentScheduler: Send + Sync {
    fn schedule(&self, address: &str) -> Result<()>;
}

/// Re-executes the current binary as `bip enrich <ip>` in its own process
/// group with stdio detached. The child is never waited on.
pub struct ProcessScheduler {
    exe: PathBuf,
    config_path: PathBuf,
}

impl ProcessScheduler {
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| BipError::file("Cannot locate current executable", e))?;
        Ok(Self {
            exe,
            config_path: config_path.into(),
        })
    }
}

impl EnrichmentScheduler for ProcessScheduler {
    fn schedule(&self, address: &str) -> Result<()> {
        use std::os::unix::process::CommandExt;

        let child = Command::new(&self.exe)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--quiet")
            .arg("enrich")
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| BipError::file("Failed to spawn enrichment process", e))?;
        debug!("Enrichment for {} running as pid {}", address, child.id());
        Ok(())
    }
}

/// Runs enrichment as a task on an existing tokio runtime.
pub struct TaskScheduler {
    handle: tokio::runtime::Handle,
    enricher: Arc<GeoEnricher>,
}

impl TaskScheduler {
    pub fn new(handle: tokio::runtime::Handle, enricher: Arc<GeoEnricher>) -> Self {
        Self { handle, enricher }
    }
}

impl EnrichmentScheduler for TaskScheduler {
    fn schedule(&self, address: &str) -> Result<()> {
        let enricher = Arc::clone(&self.enricher);
        let address = address.to_string();
        self.handle.spawn(async move {
            enricher.enrich(&address).await;
        });
        Ok(())
    }
}

pub struct BanOrchestrator {
    whitelist: WhitelistGuard,
    store: BanStore,
    firewall: FirewallSync,
    enricher: Arc<GeoEnricher>,
    scheduler: Box<dyn EnrichmentScheduler>,
    events: EventLog,
}

impl BanOrchestrator {
    pub fn new(
        whitelist: WhitelistGuard,
        store: BanStore,
        firewall: FirewallSync,
        enricher: Arc<GeoEnricher>,
        scheduler: Box<dyn EnrichmentScheduler>,
        events: EventLog,
    ) -> Self {
        Self {
            whitelist,
            store,
            firewall,
            enricher,
            scheduler,
            events,
        }
    }

    pub fn store(&self) -> &BanStore {
        &self.store
    }

    pub fn firewall(&self) -> &FirewallSync {
        &self.firewall
    }

    pub fn whitelist(&self) -> &WhitelistGuard {
        &self.whitelist
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Whitelist test against both the input as given and its canonical form.
    fn gate(&self, input: &str, target: &Target) -> bool {
        let input = input.trim();
        let canonical = target.to_string();
        self.whitelist.is_whitelisted(input)
            || (canonical != input && self.whitelist.is_whitelisted(&canonical))
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        match parse_target(address) {
            Ok(target) => self.gate(address, &target),
            Err(_) => self.whitelist.is_whitelisted(address.trim()),
        }
    }

    /// Ban an address or network.
    ///
    /// Enforcement happens before this returns. With `persist`, the ban is
    /// recorded in the store and, for an IPv4 host, a country lookup is
    /// scheduled in the background.
    pub async fn ban(&self, address: &str, persist: bool) -> Result<BanOutcome> {
        let target = parse_target(address)?;
        let canonical = target.to_string();

        if self.gate(address, &target) {
            self.events.record(
                EventKind::WhitelistBypass,
                format!("{} is whitelisted, ban refused", canonical),
            );
            return Ok(BanOutcome::Whitelisted);
        }

        self.firewall.add_ban(&target).await?;

        if persist {
            self.store.add(&canonical, None)?;
        }
        self.events.record(
            EventKind::Ban,
            format!("{} banned ({})", canonical, self.firewall.ban_duration()),
        );

        if persist && target.kind() == AddressKind::HostV4 {
            self.dispatch_enrichment(&canonical).await;
        }

        Ok(BanOutcome::Banned)
    }

    async fn dispatch_enrichment(&self, address: &str) {
        if let Err(e) = self.scheduler.schedule(address) {
            warn!("{}; enriching {} in-line", e, address);
            self.enricher.enrich(address).await;
        }
    }

    /// Remove a ban from the firewall and the store. Absent addresses are fine.
    pub async fn unban(&self, address: &str) -> Result<()> {
        let target = parse_target(address)?;
        let canonical = target.to_string();

        if let Err(e) = self.firewall.remove_ban(&target).await {
            warn!("{}", e);
        }

        let mut removed = self.store.remove(&canonical)?;
        let input = address.trim();
        if input != canonical {
            removed += self.store.remove(input)?;
        }
        debug!("Removed {} store record(s) for {}", removed, canonical);

        self.events.record(EventKind::Unban, format!("{} unbanned", canonical));
        Ok(())
    }

    /// Rebuild firewall state from the store and the whitelist file.
    pub async fn restore(&self) -> Result<RestoreSummary> {
        self.firewall.ensure_ready().await?;

        let bans = self.store.restore(&self.firewall).await?;

        let mut allows = 0;
        for entry in self.whitelist.entries()? {
            let target = match parse_target(&entry) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping whitelist entry '{}': {}", entry, e);
                    continue;
                }
            };
            match self.firewall.allow(&target).await {
                Ok(()) => allows += 1,
                Err(e) => warn!("{}", e),
            }
        }

        let summary = RestoreSummary { bans, allows };
        self.events.record(
            EventKind::Restore,
            format!(
                "restored {} ban(s) and {} whitelist entr{}",
                bans,
                allows,
                if allows == 1 { "y" } else { "ies" }
            ),
        );
        Ok(summary)
    }

    /// Allow an address in the firewall and add it to the whitelist file.
    ///
    /// Returns `false` when the file already listed it.
    pub async fn whitelist_add(&self, address: &str) -> Result<bool> {
        let target = parse_target(address)?;
        let canonical = target.to_string();

        self.firewall.allow(&target).await?;
        let added = self.whitelist.add(&canonical)?;
        if added {
            self.events
                .record(EventKind::WhitelistAdd, format!("{} whitelisted", canonical));
        }
        Ok(added)
    }

    /// Returns `false` when the file did not list the address.
    pub async fn whitelist_remove(&self, address: &str) -> Result<bool> {
        let target = parse_target(address)?;
        let canonical = target.to_string();

        if let Err(e) = self.firewall.disallow(&target).await {
            warn!("{}", e);
        }
        let removed = self.whitelist.remove(&canonical)?;
        if removed {
            self.events.record(
                EventKind::WhitelistRemove,
                format!("{} removed from whitelist", canonical),
            );
        }
        Ok(removed)
    }

    pub fn whitelist_list(&self) -> Result<Vec<String>> {
        self.whitelist.entries()
    }
}
