//! Allow-list of addresses that are never banned.
//!
//! The file holds one `ADDRESS` or `ADDRESS/MASK` per line. Prefix matching
//! is only evaluated for IPv4 entries with a /8, /16 or /24 mask.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{BipError, Result};

#[derive(Debug, Clone)]
pub struct WhitelistGuard {
    path: PathBuf,
}

impl WhitelistGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order, blank lines skipped.
    pub fn entries(&self) -> Result<Vec<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BipError::file(format!("Failed to read {:?}", self.path), e))
            }
        };
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// True when `address` equals an entry or falls inside an 8/16/24-bit
    /// IPv4 prefix entry.
    ///
    /// An unreadable whitelist file counts as "not whitelisted".
    pub fn is_whitelisted(&self, address: &str) -> bool {
        let entries = match self.entries() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Cannot read whitelist: {}", e);
                return false;
            }
        };
        entries.iter().any(|entry| matches_entry(entry, address))
    }

    /// Append `address` unless already listed. Returns `true` if appended.
    pub fn add(&self, address: &str) -> Result<bool> {
        if self.entries()?.iter().any(|e| e == address) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BipError::file(format!("Failed to open {:?}", self.path), e))?;
        writeln!(file, "{}", address)?;
        Ok(true)
    }

    /// Remove `address` if listed. Returns `true` if it was present.
    pub fn remove(&self, address: &str) -> Result<bool> {
        let entries = self.entries()?;
        if !entries.iter().any(|e| e == address) {
            return Ok(false);
        }

        let mut content = String::new();
        for entry in entries.iter().filter(|e| *e != address) {
            content.push_str(entry);
            content.push('\n');
        }

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| BipError::file(format!("Failed to create temp file in {:?}", dir), e))?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| BipError::file(format!("Failed to replace {:?}", self.path), e))?;
        Ok(true)
    }
}

/// Single-entry membership test.
pub fn matches_entry(entry: &str, address: &str) -> bool {
    if entry == address {
        return true;
    }

    let Some((prefix, mask)) = entry.split_once('/') else {
        return false;
    };
    let octets = match mask {
        "8" => 1,
        "16" => 2,
        "24" => 3,
        _ => return false,
    };

    // A network argument must sit entirely inside the entry's prefix.
    let (addr, addr_mask) = match address.split_once('/') {
        Some((addr, mask)) => match mask.parse::<usize>() {
            Ok(mask) => (addr, mask),
            Err(_) => return false,
        },
        None => (address, 32),
    };
    if addr_mask < octets * 8 {
        return false;
    }

    let (Ok(prefix), Ok(addr)) = (prefix.parse::<Ipv4Addr>(), addr.parse::<Ipv4Addr>()) else {
        return false;
    };

    prefix.octets()[..octets] == addr.octets()[..octets]
}
