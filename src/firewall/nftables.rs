//! nftables backend.
//!
//! Everything lives in one `inet bip` table:
//!
//! ```text
//! table inet bip {
//!     set blacklist      { type ipv4_addr; flags interval,timeout; }
//!     set blacklist_v6   { type ipv6_addr; flags interval,timeout; }
//!     set whitelist      { type ipv4_addr; flags interval; }
//!     set whitelist_v6   { type ipv6_addr; flags interval; }
//!     set ssh-ratelimit  { type ipv4_addr; size 65535; flags dynamic,timeout; }
//!     chain input {
//!         ip saddr @whitelist accept
//!         ip saddr @blacklist drop
//!         tcp dport 22 ct state new add @ssh-ratelimit { ... } drop
//!     }
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use ipnet::IpNet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{element_text, FirewallBackend, SetElement, SetName, TABLE, TABLE_FAMILY};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput, SystemExecutor};
use crate::config::Config;
use crate::utils::parse_duration;

const CHAIN: &str = "input";
const RATE_SET: &str = "ssh-ratelimit";
const RATE_SET_V6: &str = "ssh-ratelimit_v6";

/// Locate the nft binary, falling back to `$PATH` lookup.
fn nft_path() -> &'static str {
    ["/usr/sbin/nft", "/sbin/nft"]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .unwrap_or("nft")
}

/// Only characters that can appear in an address, network or duration.
fn is_safe_nft_element(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/'))
}

fn is_safe_timeout(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parameters of the SSH rate-limit rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSettings {
    pub ssh_port: u16,
    /// New connections per minute
    pub rate_limit: u32,
    pub rate_ban_time: String,
}

impl RuleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ssh_port: config.ssh_port,
            rate_limit: config.rate_limit,
            rate_ban_time: config.rate_ban_time.clone(),
        }
    }
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// nftables backend driving `nft` through a [`CommandExecutor`].
pub struct NftablesBackend<E: CommandExecutor = SystemExecutor> {
    executor: E,
    nft: String,
    rules: RuleSettings,
}

impl NftablesBackend<SystemExecutor> {
    pub fn new(rules: RuleSettings) -> Self {
        Self::with_executor(SystemExecutor, rules)
    }
}

impl<E: CommandExecutor> NftablesBackend<E> {
    pub fn with_executor(executor: E, rules: RuleSettings) -> Self {
        Self {
            executor,
            nft: nft_path().to_string(),
            rules,
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!("nft {}", args.join(" "));
        self.executor.execute(&self.nft, &args_to_strings(args))
    }

    fn run_script(&self, script: &str) -> Result<()> {
        debug!("Executing nft script:\n{}", script);
        let output = self
            .executor
            .execute_with_stdin(&self.nft, &args_to_strings(&["-f", "-"]), script)?;
        if !output.success {
            anyhow::bail!("nft failed: {}", output.stderr.trim());
        }
        Ok(())
    }

    /// Tables, sets and chain. `add` on an existing object is a no-op.
    fn generate_base_script(&self) -> String {
        let mut script = format!("add table {} {}\n", TABLE_FAMILY, TABLE);
        let sets = [
            (SetName::BanV4.as_str(), "ipv4_addr", "flags interval,timeout;"),
            (SetName::BanV6.as_str(), "ipv6_addr", "flags interval,timeout;"),
            (SetName::AllowV4.as_str(), "ipv4_addr", "flags interval;"),
            (SetName::AllowV6.as_str(), "ipv6_addr", "flags interval;"),
            (RATE_SET, "ipv4_addr", "size 65535; flags dynamic,timeout;"),
            (RATE_SET_V6, "ipv6_addr", "size 65535; flags dynamic,timeout;"),
        ];
        for (name, kind, flags) in sets {
            script.push_str(&format!(
                "add set {} {} {} {{ type {}; {} }}\n",
                TABLE_FAMILY, TABLE, name, kind, flags
            ));
        }
        script.push_str(&format!(
            "add chain {} {} {} {{ type filter hook input priority 0; policy accept; }}\n",
            TABLE_FAMILY, TABLE, CHAIN
        ));
        script
    }

    /// Rule changes needed given the current `nft -a list chain` output.
    ///
    /// Allow rules are inserted at the head of the chain so they always
    /// precede the drop rules. Rate-limit rules are replaced wholesale so a
    /// changed limit or port takes effect, and their dynamic sets flushed.
    fn generate_rules_script(&self, chain_listing: &str) -> String {
        let prefix = format!("{} {} {}", TABLE_FAMILY, TABLE, CHAIN);
        let mut script = String::new();

        for handle in rate_rule_handles(chain_listing) {
            script.push_str(&format!("delete rule {} handle {}\n", prefix, handle));
        }
        script.push_str(&format!("flush set {} {} {}\n", TABLE_FAMILY, TABLE, RATE_SET));
        script.push_str(&format!("flush set {} {} {}\n", TABLE_FAMILY, TABLE, RATE_SET_V6));

        for (proto, set) in [("ip6", SetName::AllowV6), ("ip", SetName::AllowV4)] {
            if !references_set(chain_listing, set.as_str()) {
                script.push_str(&format!(
                    "insert rule {} {} saddr @{} accept\n",
                    prefix,
                    proto,
                    set.as_str()
                ));
            }
        }
        for (proto, set) in [("ip", SetName::BanV4), ("ip6", SetName::BanV6)] {
            if !references_set(chain_listing, set.as_str()) {
                script.push_str(&format!(
                    "add rule {} {} saddr @{} drop\n",
                    prefix,
                    proto,
                    set.as_str()
                ));
            }
        }

        let rules = &self.rules;
        for (proto, set) in [("ip", RATE_SET), ("ip6", RATE_SET_V6)] {
            script.push_str(&format!(
                "add rule {} tcp dport {} ct state new add @{} {{ {} saddr timeout {} limit rate over {}/minute burst 5 packets }} drop\n",
                prefix, rules.ssh_port, set, proto, rules.rate_ban_time, rules.rate_limit
            ));
        }

        script
    }

    fn ensure_ready_sync(&self) -> Result<()> {
        if !is_safe_timeout(&self.rules.rate_ban_time) {
            anyhow::bail!("Invalid rate ban time: {}", self.rules.rate_ban_time);
        }
        self.run_script(&self.generate_base_script())
            .context("Failed to create nftables table and sets")?;

        let listing = self.run(&["-a", "list", "chain", TABLE_FAMILY, TABLE, CHAIN])?;
        if !listing.success {
            anyhow::bail!("Failed to list chain: {}", listing.stderr.trim());
        }

        self.run_script(&self.generate_rules_script(&listing.stdout))
            .context("Failed to install nftables rules")?;
        info!(
            "nftables ready (ssh port {}, {}/minute, rate ban {})",
            self.rules.ssh_port, self.rules.rate_limit, self.rules.rate_ban_time
        );
        Ok(())
    }

    /// `add element`, initializing the table and retrying once when it is missing.
    fn add_element(&self, set: SetName, net: &IpNet, ttl: Option<&str>) -> Result<()> {
        let element = element_text(net);
        if !is_safe_nft_element(&element) {
            anyhow::bail!("Refusing unsafe nftables element: {}", element);
        }
        let body = match ttl {
            Some(t) if is_safe_timeout(t) => format!("{{ {} timeout {} }}", element, t),
            Some(t) => anyhow::bail!("Invalid timeout: {}", t),
            None => format!("{{ {} }}", element),
        };
        let args = ["add", "element", TABLE_FAMILY, TABLE, set.as_str(), body.as_str()];

        let mut output = self.run(&args)?;
        if !output.success && output.stderr.contains("No such file") {
            warn!("nftables table missing, initializing");
            self.ensure_ready_sync()?;
            output = self.run(&args)?;
        }
        if !output.success {
            anyhow::bail!("nft add element failed: {}", output.stderr.trim());
        }
        Ok(())
    }

    /// `delete element`; an absent element or table counts as removed.
    fn delete_element(&self, set: SetName, net: &IpNet) -> Result<()> {
        let element = element_text(net);
        if !is_safe_nft_element(&element) {
            anyhow::bail!("Refusing unsafe nftables element: {}", element);
        }
        let body = format!("{{ {} }}", element);
        let output = self.run(&["delete", "element", TABLE_FAMILY, TABLE, set.as_str(), &body])?;
        if !output.success {
            if output.stderr.contains("No such file") {
                debug!("{} not present in {}", element, set.as_str());
                return Ok(());
            }
            anyhow::bail!("nft delete element failed: {}", output.stderr.trim());
        }
        Ok(())
    }

    fn list_sync(&self, set: SetName) -> Result<Vec<SetElement>> {
        let output = self.run(&["list", "set", TABLE_FAMILY, TABLE, set.as_str()])?;
        if !output.success {
            if output.stderr.contains("No such file") {
                return Ok(Vec::new());
            }
            anyhow::bail!("nft list set failed: {}", output.stderr.trim());
        }
        Ok(parse_set_elements(&output.stdout))
    }
}

#[async_trait]
impl<E: CommandExecutor + 'static> FirewallBackend for NftablesBackend<E> {
    async fn ensure_ready(&self) -> Result<()> {
        self.ensure_ready_sync()
    }

    async fn add_to_ban_set(&self, net: &IpNet, ttl: Option<&str>) -> Result<()> {
        self.add_element(SetName::ban_for(net), net, ttl)
    }

    async fn remove_from_ban_set(&self, net: &IpNet) -> Result<()> {
        self.delete_element(SetName::ban_for(net), net)
    }

    async fn add_to_allow_set(&self, net: &IpNet) -> Result<()> {
        self.add_element(SetName::allow_for(net), net, None)
    }

    async fn remove_from_allow_set(&self, net: &IpNet) -> Result<()> {
        self.delete_element(SetName::allow_for(net), net)
    }

    async fn list_set_elements(&self, set: SetName) -> Result<Vec<SetElement>> {
        self.list_sync(set)
    }

    async fn count_set_elements(&self, set: SetName) -> Result<usize> {
        Ok(self.list_sync(set)?.len())
    }
}

/// Parse the `elements = { ... }` block of `nft list set` output.
///
/// The block may wrap across lines. Each element reads like
/// `1.2.3.4 timeout 1d expires 23h59m58s` or just `10.0.0.0/8`.
fn parse_set_elements(output: &str) -> Vec<SetElement> {
    let Some(start) = output.find("elements = {") else {
        return Vec::new();
    };
    let body = &output[start + "elements = {".len()..];
    let body = body.find('}').map_or(body, |end| &body[..end]);

    body.split(',')
        .filter_map(|item| {
            let mut tokens = item.split_whitespace();
            let element = tokens.next()?.to_string();
            let mut remaining = None;
            while let Some(token) = tokens.next() {
                if token == "expires" {
                    remaining = tokens.next().and_then(parse_duration);
                }
            }
            Some(SetElement { element, remaining })
        })
        .collect()
}

/// Whether a rule in the listing references `@set` (exact name).
fn references_set(chain_listing: &str, set: &str) -> bool {
    let needle = format!("@{}", set);
    chain_listing
        .lines()
        .any(|line| line.split_whitespace().any(|tok| tok == needle))
}

/// Handles of existing rate-limit rules in `nft -a` output.
fn rate_rule_handles(chain_listing: &str) -> Vec<u64> {
    chain_listing
        .lines()
        .filter(|line| line.contains("tcp dport") && line.contains(RATE_SET))
        .filter_map(|line| extract_number_after(line, "# handle"))
        .collect()
}

fn extract_number_after(s: &str, keyword: &str) -> Option<u64> {
    let idx = s.find(keyword)?;
    let after = &s[idx + keyword.len()..];
    let num: String = after
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    num.parse().ok()
}
