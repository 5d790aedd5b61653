//! Persistent ban list.
//!
//! One record per line, either `ADDRESS` or `ADDRESS|CC`. Writers hold an
//! exclusive lock on `<file>.lock`; rewrites go through a temp file in the
//! same directory and are renamed over the original. Readers take no lock.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{BipError, Result};
use crate::firewall::FirewallSync;
use crate::lock::{lock_path_for, LockGuard};
use crate::validation::{looks_like_cidr, looks_like_ipv6, parse_target};

/// A persisted ban record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    pub address: String,
    pub country: Option<String>,
}

impl BanEntry {
    /// Parse a stored line. Returns `None` for blank lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }
        let (address, country) = match line.split_once('|') {
            Some((addr, cc)) if !cc.is_empty() => (addr, Some(cc.to_string())),
            Some((addr, _)) => (addr, None),
            None => (line, None),
        };
        Some(Self {
            address: address.to_string(),
            country,
        })
    }

    pub fn to_line(&self) -> String {
        match &self.country {
            Some(cc) => format!("{}|{}\n", self.address, cc),
            None => format!("{}\n", self.address),
        }
    }

    pub fn is_ipv6(&self) -> bool {
        looks_like_ipv6(&self.address)
    }

    pub fn is_cidr(&self) -> bool {
        looks_like_cidr(&self.address)
    }
}

/// Address field of a raw stored line.
fn address_field(line: &str) -> &str {
    let line = line.trim_end_matches(['\n', '\r']);
    line.split('|').next().unwrap_or(line)
}

/// The persisted ban list file.
#[derive(Debug, Clone)]
pub struct BanStore {
    path: PathBuf,
}

impl BanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<LockGuard> {
        LockGuard::acquire(&lock_path_for(&self.path))
    }

    /// Raw file content; a missing file reads as empty.
    fn read_raw(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(BipError::file(format!("Failed to read {:?}", self.path), e)),
        }
    }

    /// All records in file order.
    pub fn entries(&self) -> Result<Vec<BanEntry>> {
        Ok(self
            .read_raw()?
            .lines()
            .filter_map(BanEntry::parse_line)
            .collect())
    }

    /// Whether any record carries this exact address.
    pub fn contains(&self, address: &str) -> Result<bool> {
        Ok(self
            .read_raw()?
            .lines()
            .any(|line| address_field(line) == address))
    }

    /// Append a record unless the address is already stored.
    ///
    /// Returns `true` when a line was written.
    pub fn add(&self, address: &str, country: Option<&str>) -> Result<bool> {
        let _lock = self.lock()?;

        if self.contains(address)? {
            debug!("{} already in ban store", address);
            return Ok(false);
        }

        let entry = BanEntry {
            address: address.to_string(),
            country: country.filter(|c| !c.is_empty()).map(str::to_string),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BipError::file(format!("Failed to open {:?}", self.path), e))?;
        file.write_all(entry.to_line().as_bytes())?;
        file.sync_all()?;

        Ok(true)
    }

    /// Drop every record whose address equals `address`.
    ///
    /// Returns the number of records removed.
    pub fn remove(&self, address: &str) -> Result<usize> {
        let _lock = self.lock()?;

        let content = self.read_raw()?;
        let mut removed = 0;
        let mut kept = String::with_capacity(content.len());
        for line in content.lines() {
            if address_field(line) == address {
                removed += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if removed > 0 {
            self.replace(&kept)?;
        }
        Ok(removed)
    }

    /// Set the country code on the first record for `address`.
    ///
    /// Later duplicates pass through untouched. Returns `true` when a record
    /// was updated.
    pub fn update_country(&self, address: &str, country: &str) -> Result<bool> {
        let _lock = self.lock()?;

        let content = self.read_raw()?;
        let mut found = false;
        let mut out = String::with_capacity(content.len() + 4);
        for line in content.lines() {
            if !found && address_field(line) == address {
                out.push_str(&format!("{}|{}\n", address, country));
                found = true;
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }

        if found {
            self.replace(&out)?;
        }
        Ok(found)
    }

    /// Re-apply every stored ban to the firewall. The store is not modified.
    ///
    /// Returns the number of records the firewall accepted.
    pub async fn restore(&self, firewall: &FirewallSync) -> Result<usize> {
        let mut applied = 0;
        for entry in self.entries()? {
            let target = match parse_target(&entry.address) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping unparseable ban record '{}': {}", entry.address, e);
                    continue;
                }
            };
            match firewall.add_ban(&target).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("Failed to restore ban for {}: {}", entry.address, e),
            }
        }
        Ok(applied)
    }

    /// Atomically replace the file contents. Caller holds the lock.
    fn replace(&self, content: &str) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| BipError::file(format!("Failed to create temp file in {:?}", dir), e))?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| BipError::file(format!("Failed to replace {:?}", self.path), e))?;
        Ok(())
    }
}
