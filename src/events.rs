//! Append-only operational event log.
//!
//! Lines look like `[2024-05-01 12:00:00] [BAN] 1.2.3.4 banned (24h)`.

use chrono::Local;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{BipError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ban,
    Unban,
    WhitelistBypass,
    WhitelistPass,
    WhitelistAdd,
    WhitelistRemove,
    Failure,
    Reset,
    Enrich,
    Supplement,
    Restore,
}

impl EventKind {
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Ban => "BAN",
            EventKind::Unban => "UNBAN",
            EventKind::WhitelistBypass => "WHITELIST-BYPASS",
            EventKind::WhitelistPass => "WHITELIST-PASS",
            EventKind::WhitelistAdd => "WHITELIST-ADD",
            EventKind::WhitelistRemove => "WHITELIST-DEL",
            EventKind::Failure => "FAIL",
            EventKind::Reset => "RESET",
            EventKind::Enrich => "GEO",
            EventKind::Supplement => "GEO-SUPPLEMENT",
            EventKind::Restore => "RESTORE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event. Write failures are logged and otherwise ignored.
    pub fn record(&self, kind: EventKind, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("[{}] {}", kind, message);
        if let Err(e) = self.append(kind, message) {
            warn!("Failed to write event log {:?}: {}", self.path, e);
        }
    }

    fn append(&self, kind: EventKind, message: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BipError::file(format!("Failed to open {:?}", self.path), e))?;
        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            kind,
            message
        );
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// The last `n` lines of the log, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BipError::file(format!("Failed to read {:?}", self.path), e)),
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }
}
