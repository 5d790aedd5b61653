//! Configuration management for blockip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{BipError, Result};
use crate::validation::{validate_interval, validate_max_retries, validate_rate_limit};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bip/config.yaml";

/// How long a ban stays in the firewall set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanDuration {
    /// Never expires
    Permanent,
    /// nftables timeout string such as "24h"
    Timeout(String),
}

impl BanDuration {
    /// Parse a ban duration. Empty string and "permanent" mean no timeout.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("permanent") {
            return Ok(BanDuration::Permanent);
        }
        validate_interval(s)?;
        Ok(BanDuration::Timeout(s.to_string()))
    }

    pub fn as_timeout(&self) -> Option<&str> {
        match self {
            BanDuration::Permanent => None,
            BanDuration::Timeout(t) => Some(t),
        }
    }
}

impl fmt::Display for BanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanDuration::Permanent => f.write_str("permanent"),
            BanDuration::Timeout(t) => f.write_str(t),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Ban duration for brute-force bans ("24h", "7d", "" or "permanent")
    pub ban_time: String,

    /// Failed logins before a ban (1-10)
    pub max_retries: u32,

    /// New SSH connections allowed per minute before the backend rate-bans
    pub rate_limit: u32,

    /// Duration of a rate-limit ban
    pub rate_ban_time: String,

    /// SSH port the rate limit applies to
    pub ssh_port: u16,

    /// Directory holding the blacklist, whitelist and failure counters
    pub state_dir: PathBuf,

    /// Append-only operational log
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ban_time: "24h".to_string(),
            max_retries: 3,
            rate_limit: 10,
            rate_ban_time: "10m".to_string(),
            ssh_port: 22,
            state_dir: PathBuf::from("/etc/bip"),
            log_file: PathBuf::from("/var/log/bip.log"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BipError::file(format!("Failed to read config file {:?}", path), e))?;
        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            BipError::InvalidArgument(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        BanDuration::parse(&self.ban_time)?;
        validate_max_retries(self.max_retries)?;
        validate_rate_limit(self.rate_limit)?;
        validate_interval(&self.rate_ban_time)?;
        if self.ssh_port == 0 {
            return Err(BipError::InvalidArgument(
                "ssh_port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        use tempfile::NamedTempFile;

        self.validate()?;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| BipError::File(format!("Failed to serialize config: {}", e)))?;

        let parent_dir = path.parent().unwrap_or(Path::new("/etc/bip"));
        std::fs::create_dir_all(parent_dir)
            .map_err(|e| BipError::file(format!("Failed to create {:?}", parent_dir), e))?;
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| BipError::file("Failed to create temporary file for config", e))?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;

        temp_file
            .persist(path)
            .map_err(|e| BipError::file(format!("Failed to persist config file {:?}", path), e))?;

        Ok(())
    }

    /// Parsed ban duration
    pub fn ban_duration(&self) -> Result<BanDuration> {
        BanDuration::parse(&self.ban_time)
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.state_dir.join("blacklist")
    }

    pub fn whitelist_path(&self) -> PathBuf {
        self.state_dir.join("whitelist")
    }

    pub fn counts_dir(&self) -> PathBuf {
        self.state_dir.join("counts")
    }
}
