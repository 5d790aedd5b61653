//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "bip")]
#[command(author, version, about = "SSH brute-force ban manager backed by nftables")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (login hooks, cron)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a failed login from PAM_RHOST (PAM auth hook)
    Check {
        /// Address to record instead of PAM_RHOST/RHOST
        ip: Option<String>,
    },

    /// Clear failures after a successful login from PAM_RHOST (PAM session hook)
    Clean {
        /// Address to clear instead of PAM_RHOST/RHOST
        ip: Option<String>,
    },

    /// Show the ban overview
    List {
        /// Redraw every 2 seconds until interrupted
        #[arg(short, long, conflicts_with = "json")]
        watch: bool,

        /// Print the overview as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the persisted ban list
    Show,

    /// Ban an address or network
    Add {
        /// IPv4/IPv6 address or CIDR
        ip: String,
    },

    /// Remove a ban
    Del {
        /// IPv4/IPv6 address or CIDR
        ip: String,
    },

    /// Manage the whitelist
    Vip {
        #[command(subcommand)]
        action: VipAction,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Reload bans and whitelist into the firewall
    Restore,

    /// Show version
    Version,

    /// Look up the country of a banned address (run detached after a ban)
    #[command(hide = true)]
    Enrich {
        ip: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum VipAction {
    /// Whitelist an address or network
    Add {
        /// Address, or IPv4 network with /8, /16 or /24
        ip: String,
    },
    /// Remove a whitelist entry
    Del {
        ip: String,
    },
    /// List whitelist entries
    List,
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Ban duration ("24h", "7d", "permanent")
    Time { value: String },
    /// Failed logins before a ban (1-10)
    Retries { value: u32 },
    /// New SSH connections per minute before a rate ban (1-1000)
    Ratelimit { value: u32 },
    /// Rate ban duration ("10m", "1h")
    Rateban { value: String },
}
