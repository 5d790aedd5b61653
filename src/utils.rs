//! Small formatting and parsing helpers shared by the firewall and report code.

use std::time::Duration;

/// Parse an nftables duration such as `23h59m58s123ms` or `7d`.
///
/// Units: `d`, `h`, `m`, `s`, `ms`. Returns `None` on any malformed input.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use blockip::utils::parse_duration;
/// assert_eq!(parse_duration("1h2m3s"), Some(Duration::from_secs(3723)));
/// assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration("soon"), None);
/// ```
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_ms: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let (unit_ms, unit_len) = if rest.starts_with("ms") {
            (1, 2)
        } else {
            match rest.chars().next()? {
                'd' => (86_400_000, 1),
                'h' => (3_600_000, 1),
                'm' => (60_000, 1),
                's' => (1_000, 1),
                _ => return None,
            }
        };
        rest = &rest[unit_len..];
        total_ms = total_ms.checked_add(value.checked_mul(unit_ms)?)?;
    }

    Some(Duration::from_millis(total_ms))
}

/// Compact remaining-time display: `1h2m3s`, `2m3s`, `5s`.
///
/// Days are folded into hours.
///
/// # Examples
/// ```
/// use blockip::utils::format_remaining;
/// assert_eq!(format_remaining(3723), "1h2m3s");
/// assert_eq!(format_remaining(5), "5s");
/// ```
pub fn format_remaining(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Truncate to at most `max_len` characters, ending with "..." when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}
