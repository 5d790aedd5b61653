//! Centralized validation functions for blockip.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges (ban/whitelist targets)
//! - Durations in nftables timeout format (`30s`, `10m`, `24h`, `7d`)
//! - Numeric configuration ranges

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

use crate::error::{BipError, Result};

/// Allowed range for `max_retries`
pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Allowed range for `rate_limit` (new connections per minute)
pub const RATE_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

/// Shape of a validated ban target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    HostV4,
    HostV6,
    CidrV4,
    CidrV6,
}

impl AddressKind {
    pub fn is_cidr(self) -> bool {
        matches!(self, AddressKind::CidrV4 | AddressKind::CidrV6)
    }
}

/// A validated address or network in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    net: IpNet,
    kind: AddressKind,
}

impl Target {
    /// Classification of the target.
    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Network as sent to the firewall (host bits cleared for CIDR targets).
    pub fn net(&self) -> IpNet {
        self.net.trunc()
    }
}

/// Canonical textual form: plain literal for hosts, network address and
/// length for CIDR.
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_cidr() {
            write!(f, "{}", self.net.trunc())
        } else {
            write!(f, "{}", self.net.addr())
        }
    }
}

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use blockip::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("invalid").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .trim()
        .parse()
        .map_err(|_| BipError::InvalidArgument(format!("Invalid IP address: {}", ip_str)))
}

/// Validate an IP address or CIDR string and classify it.
///
/// The mask must not exceed 32 for IPv4 or 128 for IPv6.
///
/// # Examples
/// ```
/// use blockip::validation::{parse_target, AddressKind};
/// assert_eq!(parse_target("10.0.0.1").unwrap().kind(), AddressKind::HostV4);
/// assert_eq!(parse_target("2001:db8::/32").unwrap().kind(), AddressKind::CidrV6);
/// assert!(parse_target("10.0.0.0/33").is_err());
/// ```
pub fn parse_target(input: &str) -> Result<Target> {
    let input = input.trim();
    if let Some((addr, mask)) = input.split_once('/') {
        let addr = validate_ip(addr)?;
        let mask: u8 = mask
            .parse()
            .map_err(|_| BipError::InvalidArgument(format!("Invalid CIDR mask: {}", input)))?;
        let net = IpNet::new(addr, mask)
            .map_err(|_| BipError::InvalidArgument(format!("Invalid CIDR: {}", input)))?;
        let kind = if addr.is_ipv6() {
            AddressKind::CidrV6
        } else {
            AddressKind::CidrV4
        };
        Ok(Target { net, kind })
    } else {
        let addr = validate_ip(input)?;
        let kind = if addr.is_ipv6() {
            AddressKind::HostV6
        } else {
            AddressKind::HostV4
        };
        Ok(Target {
            net: IpNet::from(addr),
            kind,
        })
    }
}

/// Quick textual IPv6 test used on stored records (ignores any mask).
pub fn looks_like_ipv6(address: &str) -> bool {
    address.split('/').next().unwrap_or(address).contains(':')
}

/// Quick textual CIDR test used on stored records.
pub fn looks_like_cidr(address: &str) -> bool {
    address.contains('/')
}

/// Duration validation in nftables timeout form (e.g., "10m", "24h", "7d").
///
/// Requires ASCII-only input and a single `s`/`m`/`h`/`d` suffix.
///
/// # Examples
/// ```
/// use blockip::validation::validate_interval;
/// assert!(validate_interval("24h").is_ok());
/// assert!(validate_interval("4x").is_err());
/// ```
pub fn validate_interval(interval: &str) -> Result<()> {
    if interval.is_empty() {
        return Err(BipError::InvalidArgument(
            "Duration cannot be empty".to_string(),
        ));
    }

    if !interval.is_ascii() || interval.len() < 2 {
        return Err(BipError::InvalidArgument(format!(
            "Invalid duration '{}'. Use format like '10m', '24h', '7d'",
            interval
        )));
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    if !matches!(suffix, "s" | "m" | "h" | "d") {
        return Err(BipError::InvalidArgument(format!(
            "Invalid duration '{}'. Suffix must be s, m, h, or d",
            interval
        )));
    }

    match num_part.parse::<u32>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(BipError::InvalidArgument(format!(
            "Invalid duration '{}'. Number part must be a positive integer",
            interval
        ))),
    }
}

/// Validate the failed-login threshold.
pub fn validate_max_retries(value: u32) -> Result<()> {
    if !MAX_RETRIES_RANGE.contains(&value) {
        return Err(BipError::InvalidArgument(format!(
            "max_retries must be between {} and {}, got {}",
            MAX_RETRIES_RANGE.start(),
            MAX_RETRIES_RANGE.end(),
            value
        )));
    }
    Ok(())
}

/// Validate the SSH connection rate limit.
pub fn validate_rate_limit(value: u32) -> Result<()> {
    if !RATE_LIMIT_RANGE.contains(&value) {
        return Err(BipError::InvalidArgument(format!(
            "rate_limit must be between {} and {} per minute, got {}",
            RATE_LIMIT_RANGE.start(),
            RATE_LIMIT_RANGE.end(),
            value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ip() {
        assert!(validate_ip("192.168.1.1").is_ok());
        assert!(validate_ip("2001:db8::1").is_ok());
        assert!(validate_ip(" 10.0.0.1 ").is_ok());
        assert!(validate_ip("256.0.0.1").is_err());
        assert!(validate_ip("").is_err());
    }

    #[test]
    fn test_parse_target_kinds() {
        assert_eq!(parse_target("1.2.3.4").unwrap().kind(), AddressKind::HostV4);
        assert_eq!(parse_target("::1").unwrap().kind(), AddressKind::HostV6);
        assert_eq!(parse_target("10.0.0.0/8").unwrap().kind(), AddressKind::CidrV4);
        assert_eq!(parse_target("fe80::/10").unwrap().kind(), AddressKind::CidrV6);
    }

    #[test]
    fn test_parse_target_mask_bounds() {
        assert!(parse_target("10.0.0.0/32").is_ok());
        assert!(parse_target("10.0.0.0/33").is_err());
        assert!(parse_target("::/128").is_ok());
        assert!(parse_target("::/129").is_err());
        assert!(parse_target("10.0.0.0/").is_err());
        assert!(parse_target("10.0.0.0/-1").is_err());
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        assert!(matches!(
            parse_target("not-an-ip"),
            Err(BipError::InvalidArgument(_))
        ));
        assert!(parse_target("1.2.3.4; drop").is_err());
        assert!(parse_target("../../etc/passwd").is_err());
    }

    #[test]
    fn test_target_canonical_display() {
        assert_eq!(parse_target("2001:DB8::1").unwrap().to_string(), "2001:db8::1");
        assert_eq!(parse_target("10.1.2.3/8").unwrap().to_string(), "10.0.0.0/8");
        assert_eq!(parse_target("2001:db8::5/32").unwrap().to_string(), "2001:db8::/32");
        assert_eq!(parse_target("10.1.2.3/8").unwrap().net().to_string(), "10.0.0.0/8");
        assert_eq!(parse_target("10.1.2.3").unwrap().net().to_string(), "10.1.2.3/32");
    }

    #[test]
    fn test_looks_like_helpers() {
        assert!(looks_like_ipv6("2001:db8::/32"));
        assert!(!looks_like_ipv6("1.2.3.4/24"));
        assert!(looks_like_cidr("1.2.3.0/24"));
        assert!(!looks_like_cidr("1.2.3.4"));
    }

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval("30s").is_ok());
        assert!(validate_interval("10m").is_ok());
        assert!(validate_interval("24h").is_ok());
        assert!(validate_interval("7d").is_ok());
        assert!(validate_interval("").is_err());
        assert!(validate_interval("h").is_err());
        assert!(validate_interval("0h").is_err());
        assert!(validate_interval("4x").is_err());
        assert!(validate_interval("-4h").is_err());
        assert!(validate_interval("4\u{00e9}").is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(validate_max_retries(1).is_ok());
        assert!(validate_max_retries(10).is_ok());
        assert!(validate_max_retries(0).is_err());
        assert!(validate_max_retries(11).is_err());
        assert!(validate_rate_limit(1).is_ok());
        assert!(validate_rate_limit(1000).is_ok());
        assert!(validate_rate_limit(0).is_err());
        assert!(validate_rate_limit(1001).is_err());
    }
}
