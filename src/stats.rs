//! Overview report: live vs stored counts, active bans, subnet clusters,
//! countries and the tail of the event log.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

use crate::aggregator::{
    active_bans, country_stats, subnet_aggregation, ActiveBan, ActiveBans, SubnetReport,
};
use crate::error::Result;
use crate::events::EventLog;
use crate::firewall::FirewallSync;
use crate::geo::country_name;
use crate::signal::ShutdownToken;
use crate::store::{BanEntry, BanStore};
use crate::utils::{format_remaining, truncate};

/// Subnet rows printed in the text report.
pub const SUBNET_ROWS: usize = 10;

/// Event log lines included in the report.
pub const RECENT_EVENTS: usize = 10;

pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct CountryCount {
    pub code: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub generated_at: DateTime<Local>,
    /// Elements currently in the firewall ban sets
    pub live_count: usize,
    /// Records in the ban store
    pub stored_count: usize,
    pub active: ActiveBans,
    pub subnets: SubnetReport,
    pub countries: Vec<CountryCount>,
    pub recent_events: Vec<String>,
}

/// Gather everything the overview shows.
///
/// An unreachable firewall is reported as zero live bans rather than an
/// error, so the stored view stays usable.
pub async fn collect(
    firewall: &FirewallSync,
    store: &BanStore,
    events: &EventLog,
) -> Result<Overview> {
    let entries = store.entries()?;

    let live = match firewall.list_bans().await {
        Ok(elements) => elements,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    };

    let countries = country_stats(&entries)
        .into_iter()
        .map(|(code, count)| CountryCount {
            name: country_name(&code).to_string(),
            code,
            count,
        })
        .collect();

    let recent_events = events.recent(RECENT_EVENTS).unwrap_or_else(|e| {
        warn!("{}", e);
        Vec::new()
    });

    Ok(Overview {
        generated_at: Local::now(),
        live_count: live.len(),
        stored_count: entries.len(),
        active: active_bans(&live),
        subnets: subnet_aggregation(&entries),
        countries,
        recent_events,
    })
}

fn active_line(out: &mut String, ban: &ActiveBan) {
    let remaining = ban
        .remaining_secs
        .map(format_remaining)
        .unwrap_or_else(|| "permanent".to_string());
    let _ = writeln!(out, "  - {:<40} {}", ban.element, remaining);
}

/// Plain-text rendering of an [`Overview`].
pub fn render(overview: &Overview) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "=== blockip overview ({}) ===",
        overview.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "Active: {}  |  Stored: {}\n",
        overview.live_count, overview.stored_count
    );

    out.push_str("=== Active bans (expiring first / newest last) ===\n");
    let active = &overview.active;
    if active.total == 0 {
        out.push_str("(no active bans)\n");
    } else {
        let _ = writeln!(out, "    {:<40} REMAINING", "ADDRESS");
        for ban in &active.head {
            active_line(&mut out, ban);
        }
        if active.omitted > 0 {
            let _ = writeln!(out, "  ... ({} omitted)", active.omitted);
        }
        for ban in &active.tail {
            active_line(&mut out, ban);
        }
    }
    out.push('\n');

    out.push_str("=== Subnet aggregation ===\n");
    let subnets = &overview.subnets;
    if subnets.total_ipv4 == 0 && subnets.ipv6_count == 0 {
        out.push_str("(no data)\n");
    } else {
        for row in subnets.rows.iter().take(SUBNET_ROWS) {
            if row.depth == 0 {
                let _ = writeln!(out, "  - {:<22} ({})", row.prefix, row.count);
            } else {
                let indent = "   ".repeat(row.depth);
                let _ = writeln!(out, "  {}└─ {:<19} ({})", indent, row.prefix, row.count);
            }
        }
        if subnets.scattered > 0 {
            let _ = writeln!(out, "  - {:<22} ({})", "(scattered IPv4)", subnets.scattered);
        }
        if subnets.ipv6_count > 0 {
            let _ = writeln!(out, "  - {:<22} ({})", "(IPv6)", subnets.ipv6_count);
        }
    }
    out.push('\n');

    out.push_str("=== Countries ===\n");
    if overview.countries.is_empty() {
        out.push_str("(no country data)\n");
    } else {
        for country in &overview.countries {
            let _ = writeln!(out, "  - {} ({})", country.name, country.count);
        }
    }
    out.push('\n');

    let _ = writeln!(out, "=== Recent events (last {}) ===", RECENT_EVENTS);
    if overview.recent_events.is_empty() {
        out.push_str("(no events)\n");
    }
    for line in &overview.recent_events {
        let _ = writeln!(out, "{}", truncate(line, 160));
    }

    out
}

/// The persisted ban list with totals and country names.
pub fn render_store(entries: &[BanEntry]) -> String {
    let v6 = entries.iter().filter(|e| e.is_ipv6()).count();
    let mut out = format!(
        "Stored bans: {} (IPv4: {}, IPv6: {})\n",
        entries.len(),
        entries.len() - v6,
        v6
    );
    for entry in entries {
        let country = entry.country.as_deref().map(country_name).unwrap_or("-");
        let _ = writeln!(out, "  {:<40} {}", entry.address, country);
    }
    out
}

/// Redraw the overview every [`WATCH_INTERVAL`] until `token` is cancelled.
pub async fn watch(
    firewall: &FirewallSync,
    store: &BanStore,
    events: &EventLog,
    token: &ShutdownToken,
) -> Result<()> {
    const TICK: Duration = Duration::from_millis(100);

    while !token.is_cancelled() {
        let overview = collect(firewall, store, events).await?;
        // Clear screen, cursor home
        print!("\x1b[2J\x1b[H{}", render(&overview));
        println!("(refreshing every {}s, Ctrl+C to exit)", WATCH_INTERVAL.as_secs());

        let mut waited = Duration::ZERO;
        while waited < WATCH_INTERVAL && !token.is_cancelled() {
            tokio::time::sleep(TICK).await;
            waited += TICK;
        }
    }
    Ok(())
}
