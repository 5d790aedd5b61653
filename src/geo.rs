//! Country lookup for banned addresses.
//!
//! Lookups never block enforcement: [`GeoEnricher`] runs after the ban is in
//! place and swallows every lookup failure.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BipError, Result};
use crate::events::{EventKind, EventLog};
use crate::store::BanStore;

/// Upper bound on one lookup, connect included.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Entries without a country filled in per enrichment run.
pub const SUPPLEMENT_LIMIT: usize = 3;

const IPINFO_URL: &str = "https://ipinfo.io";

#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Two-letter uppercase country code for `ip`.
    async fn resolve_country(&self, ip: IpAddr) -> Result<String>;
}

/// Resolver backed by `https://ipinfo.io/<ip>/country`.
pub struct IpInfoResolver {
    client: Client,
    base_url: String,
}

impl IpInfoResolver {
    pub fn new() -> Result<Self> {
        Self::with_base_url(IPINFO_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent(format!("blockip/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BipError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoResolver for IpInfoResolver {
    async fn resolve_country(&self, ip: IpAddr) -> Result<String> {
        let url = format!("{}/{}/country", self.base_url, ip);
        let request = async {
            self.client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        };

        let body = match tokio::time::timeout(LOOKUP_TIMEOUT, request).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(BipError::Network(format!("Lookup of {} failed: {}", ip, e))),
            Err(_) => return Err(BipError::Network(format!("Lookup of {} timed out", ip))),
        };

        parse_country_code(&body)
            .ok_or_else(|| BipError::Network(format!("No country code for {}", ip)))
    }
}

/// Accept exactly two ASCII letters (surrounding whitespace ignored).
pub fn parse_country_code(body: &str) -> Option<String> {
    let code = body.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// English display name, or the code itself when unknown.
pub fn country_name(code: &str) -> &str {
    match code {
        "AR" => "Argentina",
        "AU" => "Australia",
        "BR" => "Brazil",
        "CA" => "Canada",
        "CL" => "Chile",
        "CN" => "China",
        "CZ" => "Czechia",
        "DE" => "Germany",
        "ES" => "Spain",
        "FR" => "France",
        "GB" => "United Kingdom",
        "HK" => "Hong Kong",
        "ID" => "Indonesia",
        "IN" => "India",
        "IT" => "Italy",
        "JP" => "Japan",
        "KR" => "South Korea",
        "MX" => "Mexico",
        "MY" => "Malaysia",
        "NL" => "Netherlands",
        "PL" => "Poland",
        "RO" => "Romania",
        "RU" => "Russia",
        "SE" => "Sweden",
        "SG" => "Singapore",
        "TH" => "Thailand",
        "TR" => "Turkey",
        "TW" => "Taiwan",
        "UA" => "Ukraine",
        "US" => "United States",
        "VN" => "Vietnam",
        other => other,
    }
}

/// Result of one enrichment run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichSummary {
    /// Country found for the address that triggered the run
    pub country: Option<String>,
    /// Other entries that received a country
    pub supplemented: usize,
}

/// Attaches country codes to stored bans.
pub struct GeoEnricher {
    resolver: Arc<dyn GeoResolver>,
    store: BanStore,
    events: EventLog,
}

impl GeoEnricher {
    pub fn new(resolver: Arc<dyn GeoResolver>, store: BanStore, events: EventLog) -> Self {
        Self {
            resolver,
            store,
            events,
        }
    }

    /// Resolve `address`, record its country, then fill in up to
    /// [`SUPPLEMENT_LIMIT`] other IPv4 host entries that lack one.
    pub async fn enrich(&self, address: &str) -> EnrichSummary {
        let mut summary = EnrichSummary::default();

        match address.parse::<IpAddr>() {
            Ok(ip) => match self.resolver.resolve_country(ip).await {
                Ok(code) => {
                    match self.store.update_country(address, &code) {
                        Ok(true) => {}
                        Ok(false) => debug!("{} no longer in ban store", address),
                        Err(e) => warn!("Failed to store country for {}: {}", address, e),
                    }
                    self.events.record(
                        EventKind::Enrich,
                        format!("{} country={}", address, country_name(&code)),
                    );
                    summary.country = Some(code);
                }
                Err(e) => warn!("{}", e),
            },
            Err(_) => warn!("Not enriching non-host address {}", address),
        }

        summary.supplemented = self.supplement(address).await;
        summary
    }

    /// Fill in missing countries, skipping `current`, IPv6 and CIDR entries.
    async fn supplement(&self, current: &str) -> usize {
        let entries = match self.store.entries() {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot read ban store for supplement: {}", e);
                return 0;
            }
        };

        let mut seen = HashSet::new();
        let mut updated = 0;
        for entry in entries {
            if updated >= SUPPLEMENT_LIMIT {
                break;
            }
            if entry.country.is_some()
                || entry.is_ipv6()
                || entry.is_cidr()
                || entry.address == current
                || !seen.insert(entry.address.clone())
            {
                continue;
            }
            let Ok(ip) = entry.address.parse::<IpAddr>() else {
                continue;
            };

            match self.resolver.resolve_country(ip).await {
                Ok(code) => match self.store.update_country(&entry.address, &code) {
                    Ok(true) => {
                        self.events.record(
                            EventKind::Supplement,
                            format!("{} country={}", entry.address, country_name(&code)),
                        );
                        updated += 1;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Failed to store country for {}: {}", entry.address, e),
                },
                Err(e) => debug!("Supplement lookup failed: {}", e),
            }
        }
        updated
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedResolver;
    use super::*;
    use tempfile::TempDir;

    fn setup(
        dir: &TempDir,
        content: &str,
        answers: &[(&str, &str)],
    ) -> (GeoEnricher, Arc<ScriptedResolver>, BanStore) {
        let store = BanStore::new(dir.path().join("blacklist"));
        std::fs::write(store.path(), content).unwrap();
        let resolver = Arc::new(ScriptedResolver::new(answers));
        let events = EventLog::new(dir.path().join("bip.log"));
        let enricher = GeoEnricher::new(resolver.clone(), store.clone(), events);
        (enricher, resolver, store)
    }

    #[test]
    fn test_parse_country_code() {
        assert_eq!(parse_country_code("US\n"), Some("US".to_string()));
        assert_eq!(parse_country_code(" nl "), Some("NL".to_string()));
        assert_eq!(parse_country_code("USA"), None);
        assert_eq!(parse_country_code("{\"error\": 1}"), None);
        assert_eq!(parse_country_code("1A"), None);
        assert_eq!(parse_country_code(""), None);
    }

    #[test]
    fn test_country_name() {
        assert_eq!(country_name("CN"), "China");
        assert_eq!(country_name("GB"), "United Kingdom");
        assert_eq!(country_name("ZZ"), "ZZ");
    }

    #[tokio::test]
    async fn test_enrich_updates_current_address() {
        let dir = TempDir::new().unwrap();
        let (enricher, _, store) = setup(&dir, "1.2.3.4\n", &[("1.2.3.4", "US")]);

        let summary = enricher.enrich("1.2.3.4").await;
        assert_eq!(summary.country.as_deref(), Some("US"));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1.2.3.4|US\n");
    }

    #[tokio::test]
    async fn test_enrich_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let (enricher, _, store) = setup(&dir, "1.2.3.4\n", &[]);

        let summary = enricher.enrich("1.2.3.4").await;
        assert_eq!(summary, EnrichSummary::default());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1.2.3.4\n");
    }

    #[tokio::test]
    async fn test_supplement_skips_and_limits() {
        let dir = TempDir::new().unwrap();
        let content = "9.9.9.9\n\
                       2001:db8::1\n\
                       10.0.0.0/8\n\
                       5.5.5.5|DE\n\
                       1.1.1.1\n\
                       2.2.2.2\n\
                       3.3.3.3\n\
                       4.4.4.4\n\
                       6.6.6.6\n";
        let answers = [
            ("9.9.9.9", "CN"),
            ("1.1.1.1", "AU"),
            ("3.3.3.3", "US"),
            ("4.4.4.4", "RU"),
            ("6.6.6.6", "NL"),
        ];
        let (enricher, resolver, store) = setup(&dir, content, &answers);

        let summary = enricher.enrich("9.9.9.9").await;
        assert_eq!(summary.country.as_deref(), Some("CN"));
        assert_eq!(summary.supplemented, 3);

        // 2.2.2.2 fails and does not count toward the limit
        let looked_up: Vec<String> = resolver.calls().iter().map(|ip| ip.to_string()).collect();
        assert_eq!(looked_up, vec!["9.9.9.9", "1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4"]);

        let stored = std::fs::read_to_string(store.path()).unwrap();
        assert!(stored.contains("9.9.9.9|CN\n"));
        assert!(stored.contains("2001:db8::1\n"));
        assert!(stored.contains("10.0.0.0/8\n"));
        assert!(stored.contains("4.4.4.4|RU\n"));
        assert!(stored.contains("6.6.6.6\n"));
        assert!(!stored.contains("6.6.6.6|"));
    }
}
