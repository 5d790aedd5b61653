//! Per-address failed-login counters.
//!
//! Each counter is a file `<counts_dir>/<address>` holding an ASCII integer.
//! Read-modify-write cycles are serialized by a lock on `<counts_dir>/.lock`.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{BipError, Result};
use crate::events::{EventKind, EventLog};
use crate::lock::LockGuard;
use crate::orchestrator::{BanOrchestrator, BanOutcome};
use crate::validation::validate_ip;

/// What a failed login led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Source is whitelisted and was not counted
    Whitelisted,
    /// Counted, still below the threshold
    Counted(u32),
    /// Threshold reached; a ban was attempted and the counter cleared
    BanTriggered(u32),
}

#[derive(Debug, Clone)]
pub struct FailureCounter {
    dir: PathBuf,
}

impl FailureCounter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Counter file for a validated address. Anything that does not parse
    /// as an IP is rejected, so the path cannot leave the directory.
    fn record_path(&self, address: &str) -> Result<PathBuf> {
        let ip = validate_ip(address)?;
        Ok(self.dir.join(ip.to_string()))
    }

    fn read_count(path: &Path) -> Result<u32> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(content.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(BipError::file(format!("Failed to read {:?}", path), e)),
        }
    }

    /// Current count; 0 when no record exists.
    pub fn count(&self, address: &str) -> Result<u32> {
        Self::read_count(&self.record_path(address)?)
    }

    /// Increment and persist the counter, returning the new value.
    pub fn record_failure(&self, address: &str) -> Result<u32> {
        let path = self.record_path(address)?;
        let _lock = LockGuard::acquire(&self.dir.join(".lock"))?;

        let count = Self::read_count(&path)?.saturating_add(1);
        std::fs::write(&path, format!("{}\n", count))
            .map_err(|e| BipError::file(format!("Failed to write {:?}", path), e))?;
        Ok(count)
    }

    /// Delete the record. Returns `false` if there was none.
    pub fn clear(&self, address: &str) -> Result<bool> {
        let path = self.record_path(address)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BipError::file(format!("Failed to remove {:?}", path), e)),
        }
    }

    /// Handle a failed login from `address`.
    ///
    /// At `max_retries` the address is banned (persisted) and the counter is
    /// cleared whatever the ban outcome.
    pub async fn on_failed_login(
        &self,
        address: &str,
        orchestrator: &BanOrchestrator,
        max_retries: u32,
    ) -> Result<FailureOutcome> {
        let address = validate_ip(address)?.to_string();
        let events = orchestrator.events();

        if orchestrator.is_whitelisted(&address) {
            events.record(
                EventKind::WhitelistPass,
                format!("{} whitelisted, not counted", address),
            );
            return Ok(FailureOutcome::Whitelisted);
        }

        let count = self.record_failure(&address)?;
        events.record(
            EventKind::Failure,
            format!("{} failed login ({}/{})", address, count, max_retries),
        );

        if count < max_retries {
            return Ok(FailureOutcome::Counted(count));
        }

        match orchestrator.ban(&address, true).await {
            Ok(BanOutcome::Banned) | Ok(BanOutcome::Whitelisted) => {}
            Err(e) => warn!("Ban of {} after {} failures failed: {}", address, count, e),
        }
        self.clear(&address)?;
        Ok(FailureOutcome::BanTriggered(count))
    }

    /// Handle a successful login: clear any record, logging a reset if one existed.
    pub fn on_success(&self, address: &str, events: &EventLog) -> Result<bool> {
        let count = self.count(address)?;
        if count == 0 {
            return Ok(false);
        }
        events.record(
            EventKind::Reset,
            format!("{} logged in, {} failure(s) cleared", address.trim(), count),
        );
        self.clear(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::SetName;
    use crate::orchestrator::testing::Harness;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_count_record_clear() {
        let dir = TempDir::new().unwrap();
        let counter = FailureCounter::new(dir.path().join("counts"));

        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
        assert_eq!(counter.record_failure("1.2.3.4").unwrap(), 1);
        assert_eq!(counter.record_failure("1.2.3.4").unwrap(), 2);
        assert_eq!(counter.count("1.2.3.4").unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("counts/1.2.3.4")).unwrap(),
            "2\n"
        );

        assert!(counter.clear("1.2.3.4").unwrap());
        assert!(!counter.clear("1.2.3.4").unwrap());
        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
    }

    #[test]
    fn test_rejects_non_address_names() {
        let dir = TempDir::new().unwrap();
        let counter = FailureCounter::new(dir.path().join("counts"));

        for bad in ["../../etc/passwd", "", "1.2.3.4/../x", ".lock"] {
            assert!(matches!(
                counter.record_failure(bad),
                Err(BipError::InvalidArgument(_))
            ));
        }
        assert!(!dir.path().join("etc").exists());
    }

    #[test]
    fn test_garbage_record_counts_as_zero() {
        let dir = TempDir::new().unwrap();
        let counter = FailureCounter::new(dir.path());
        std::fs::write(dir.path().join("1.2.3.4"), "not a number").unwrap();
        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
        assert_eq!(counter.record_failure("1.2.3.4").unwrap(), 1);
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(FailureCounter::new(dir.path().join("counts")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        counter.record_failure("198.51.100.7").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.count("198.51.100.7").unwrap(), 80);
    }

    #[tokio::test]
    async fn test_threshold_bans_once_and_clears() {
        let h = Harness::new();
        let counter = FailureCounter::new(h.dir.path().join("counts"));

        assert_eq!(
            counter.on_failed_login("1.2.3.4", &h.orchestrator, 3).await.unwrap(),
            FailureOutcome::Counted(1)
        );
        assert_eq!(
            counter.on_failed_login("1.2.3.4", &h.orchestrator, 3).await.unwrap(),
            FailureOutcome::Counted(2)
        );
        assert_eq!(h.backend.ban_calls(), 0);
        assert_eq!(
            counter.on_failed_login("1.2.3.4", &h.orchestrator, 3).await.unwrap(),
            FailureOutcome::BanTriggered(3)
        );

        assert_eq!(h.backend.ban_calls(), 1);
        assert_eq!(h.backend.elements(SetName::BanV4), vec!["1.2.3.4"]);
        assert_eq!(h.stored(), "1.2.3.4\n");
        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
        assert!(h.log().contains("[FAIL] 1.2.3.4 failed login (3/3)"));
    }

    #[tokio::test]
    async fn test_counter_cleared_even_when_ban_fails() {
        let h = Harness::new();
        h.backend.fail_adds();
        let counter = FailureCounter::new(h.dir.path().join("counts"));

        assert_eq!(
            counter.on_failed_login("1.2.3.4", &h.orchestrator, 1).await.unwrap(),
            FailureOutcome::BanTriggered(1)
        );
        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
        assert_eq!(h.stored(), "");
    }

    #[tokio::test]
    async fn test_whitelisted_source_not_counted() {
        let h = Harness::new();
        std::fs::write(h.dir.path().join("whitelist"), "192.168.1.0/24\n").unwrap();
        let counter = FailureCounter::new(h.dir.path().join("counts"));

        for _ in 0..5 {
            assert_eq!(
                counter.on_failed_login("192.168.1.20", &h.orchestrator, 3).await.unwrap(),
                FailureOutcome::Whitelisted
            );
        }
        assert_eq!(counter.count("192.168.1.20").unwrap(), 0);
        assert_eq!(h.backend.ban_calls(), 0);
        assert!(h.log().contains("[WHITELIST-PASS] 192.168.1.20"));
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let h = Harness::new();
        let counter = FailureCounter::new(h.dir.path().join("counts"));
        let events = h.orchestrator.events();

        assert!(!counter.on_success("1.2.3.4", events).unwrap());
        assert_eq!(h.log(), "");

        counter.on_failed_login("1.2.3.4", &h.orchestrator, 3).await.unwrap();
        assert!(counter.on_success("1.2.3.4", events).unwrap());
        assert_eq!(counter.count("1.2.3.4").unwrap(), 0);
        assert!(h.log().contains("[RESET] 1.2.3.4 logged in, 1 failure(s) cleared"));
    }
}
