//! Firewall enforcement.
//!
//! [`FirewallBackend`] is the set-level contract a packet filter has to
//! provide; [`FirewallSync`] maps ban/allow decisions onto it and converts
//! backend failures into [`BipError::File`].

mod nftables;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use ipnet::IpNet;
use std::sync::Arc;
use std::time::Duration;

pub use nftables::{NftablesBackend, RuleSettings};

use crate::config::BanDuration;
use crate::error::{BipError, Result};
use crate::validation::Target;

/// Table holding all blockip sets and chains.
pub const TABLE: &str = "bip";
pub const TABLE_FAMILY: &str = "inet";

/// The four managed sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetName {
    BanV4,
    BanV6,
    AllowV4,
    AllowV6,
}

impl SetName {
    pub fn as_str(self) -> &'static str {
        match self {
            SetName::BanV4 => "blacklist",
            SetName::BanV6 => "blacklist_v6",
            SetName::AllowV4 => "whitelist",
            SetName::AllowV6 => "whitelist_v6",
        }
    }

    pub fn ban_for(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => SetName::BanV4,
            IpNet::V6(_) => SetName::BanV6,
        }
    }

    pub fn allow_for(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => SetName::AllowV4,
            IpNet::V6(_) => SetName::AllowV6,
        }
    }
}

/// One element as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetElement {
    /// Address, network or range as the backend prints it
    pub element: String,
    /// Time until expiry; `None` for permanent elements
    pub remaining: Option<Duration>,
}

/// Set-level operations a packet filter must support.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Create table, sets, chain and rules if missing. Idempotent.
    async fn ensure_ready(&self) -> AnyResult<()>;

    /// Add to the family's ban set; `ttl` of `None` means permanent.
    async fn add_to_ban_set(&self, net: &IpNet, ttl: Option<&str>) -> AnyResult<()>;

    /// Remove from the family's ban set. Absent elements are not an error.
    async fn remove_from_ban_set(&self, net: &IpNet) -> AnyResult<()>;

    async fn add_to_allow_set(&self, net: &IpNet) -> AnyResult<()>;

    async fn remove_from_allow_set(&self, net: &IpNet) -> AnyResult<()>;

    async fn list_set_elements(&self, set: SetName) -> AnyResult<Vec<SetElement>>;

    async fn count_set_elements(&self, set: SetName) -> AnyResult<usize>;
}

/// Ban/allow adapter over a [`FirewallBackend`].
#[derive(Clone)]
pub struct FirewallSync {
    backend: Arc<dyn FirewallBackend>,
    ban_duration: BanDuration,
}

impl FirewallSync {
    pub fn new(backend: Arc<dyn FirewallBackend>, ban_duration: BanDuration) -> Self {
        Self {
            backend,
            ban_duration,
        }
    }

    pub fn ban_duration(&self) -> &BanDuration {
        &self.ban_duration
    }

    pub async fn ensure_ready(&self) -> Result<()> {
        self.backend
            .ensure_ready()
            .await
            .map_err(|e| BipError::File(format!("Failed to initialize firewall: {:#}", e)))
    }

    /// Enforce a ban with the configured duration.
    pub async fn add_ban(&self, target: &Target) -> Result<()> {
        self.backend
            .add_to_ban_set(&target.net(), self.ban_duration.as_timeout())
            .await
            .map_err(|e| BipError::File(format!("Failed to ban {}: {:#}", target, e)))
    }

    pub async fn remove_ban(&self, target: &Target) -> Result<()> {
        self.backend
            .remove_from_ban_set(&target.net())
            .await
            .map_err(|e| BipError::File(format!("Failed to unban {}: {:#}", target, e)))
    }

    pub async fn allow(&self, target: &Target) -> Result<()> {
        self.backend
            .add_to_allow_set(&target.net())
            .await
            .map_err(|e| BipError::File(format!("Failed to allow {}: {:#}", target, e)))
    }

    pub async fn disallow(&self, target: &Target) -> Result<()> {
        self.backend
            .remove_from_allow_set(&target.net())
            .await
            .map_err(|e| BipError::File(format!("Failed to disallow {}: {:#}", target, e)))
    }

    /// Elements of both ban sets, IPv4 first.
    pub async fn list_bans(&self) -> Result<Vec<SetElement>> {
        let mut elements = Vec::new();
        for set in [SetName::BanV4, SetName::BanV6] {
            let listed = self.backend.list_set_elements(set).await.map_err(|e| {
                BipError::File(format!("Failed to list {}: {:#}", set.as_str(), e))
            })?;
            elements.extend(listed);
        }
        Ok(elements)
    }

    /// Total element count across both ban sets.
    pub async fn count_bans(&self) -> Result<usize> {
        let mut total = 0;
        for set in [SetName::BanV4, SetName::BanV6] {
            total += self.backend.count_set_elements(set).await.map_err(|e| {
                BipError::File(format!("Failed to count {}: {:#}", set.as_str(), e))
            })?;
        }
        Ok(total)
    }
}

/// Fail with PermissionDenied unless the effective UID is 0.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(BipError::PermissionDenied(
            "this operation requires root privileges, run with sudo".to_string(),
        ));
    }
    Ok(())
}

/// Element text as the backend lists it: bare address for host routes.
pub fn element_text(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.trunc().to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryBackend;
    use super::*;
    use crate::validation::parse_target;

    #[test]
    fn test_set_names() {
        assert_eq!(SetName::BanV4.as_str(), "blacklist");
        assert_eq!(SetName::AllowV6.as_str(), "whitelist_v6");
        let v6: IpNet = "2001:db8::/32".parse().unwrap();
        assert_eq!(SetName::ban_for(&v6), SetName::BanV6);
        assert_eq!(SetName::allow_for(&v6), SetName::AllowV6);
    }

    #[test]
    fn test_element_text() {
        assert_eq!(element_text(&"1.2.3.4/32".parse().unwrap()), "1.2.3.4");
        assert_eq!(element_text(&"10.1.0.0/8".parse().unwrap()), "10.0.0.0/8");
        assert_eq!(element_text(&"2001:db8::1/128".parse().unwrap()), "2001:db8::1");
    }

    #[tokio::test]
    async fn test_add_ban_routes_by_family() {
        let backend = Arc::new(MemoryBackend::new());
        let fw = FirewallSync::new(backend.clone(), BanDuration::Timeout("1h".into()));

        fw.add_ban(&parse_target("1.2.3.4").unwrap()).await.unwrap();
        fw.add_ban(&parse_target("2001:db8::/48").unwrap()).await.unwrap();

        assert_eq!(backend.elements(SetName::BanV4), vec!["1.2.3.4"]);
        assert_eq!(backend.elements(SetName::BanV6), vec!["2001:db8::/48"]);
        assert_eq!(fw.count_bans().await.unwrap(), 2);

        let listed = fw.list_bans().await.unwrap();
        assert_eq!(listed[0].remaining, Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_permanent_ban_has_no_ttl() {
        let backend = Arc::new(MemoryBackend::new());
        let fw = FirewallSync::new(backend, BanDuration::Permanent);
        fw.add_ban(&parse_target("1.2.3.4").unwrap()).await.unwrap();
        assert_eq!(fw.list_bans().await.unwrap()[0].remaining, None);
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_file_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_adds();
        let fw = FirewallSync::new(backend, BanDuration::Permanent);
        let err = fw.add_ban(&parse_target("1.2.3.4").unwrap()).await.unwrap_err();
        assert!(matches!(err, BipError::File(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_allow_and_disallow() {
        let backend = Arc::new(MemoryBackend::new());
        let fw = FirewallSync::new(backend.clone(), BanDuration::Permanent);
        let target = parse_target("10.0.0.0/8").unwrap();

        fw.allow(&target).await.unwrap();
        assert_eq!(backend.elements(SetName::AllowV4), vec!["10.0.0.0/8"]);
        fw.disallow(&target).await.unwrap();
        fw.disallow(&target).await.unwrap();
        assert!(backend.elements(SetName::AllowV4).is_empty());
    }
}
