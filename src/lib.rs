//! # blockip - SSH brute-force ban manager
//!
//! Counts failed SSH logins per source address, bans offenders in nftables
//! sets once a threshold is reached, and reports on what is banned.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (clap): check, clean, list, show, add, del, vip, ...   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FailureCounter ──► BanOrchestrator ◄── manual add/del      │
//! │                       │  WhitelistGuard (gate)              │
//! │                       │  FirewallSync ──► FirewallBackend   │
//! │                       │                    └─ NftablesBackend│
//! │                       │  BanStore (flock + atomic rewrite)  │
//! │                       └─ GeoEnricher (detached, ipinfo.io)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Analytics: active bans, subnet aggregation, countries      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blockip::commands::Context;
//! use blockip::firewall::check_root;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let ctx = Context::load("/etc/bip/config.yaml".as_ref())?;
//!     ctx.orchestrator.ban("203.0.113.7", true).await?;
//!
//!     let summary = ctx.orchestrator.restore().await?;
//!     println!("{} bans restored", summary.bans);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Active-ban ordering, subnet aggregation, country counts
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`events`] - Append-only operational log
//! - [`failure`] - Per-address failed-login counters
//! - [`firewall`] - Firewall backend abstraction and nftables backend
//! - [`geo`] - Country lookup and enrichment
//! - [`lock`] - File locking for concurrent writers
//! - [`orchestrator`] - Ban lifecycle
//! - [`signal`] - Graceful shutdown for watch mode
//! - [`stats`] - Overview report
//! - [`store`] - Persisted ban list
//! - [`whitelist`] - Whitelist file and matching

pub mod aggregator;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod failure;
pub mod firewall;
pub mod geo;
pub mod lock;
pub mod orchestrator;
pub mod signal;
pub mod stats;
pub mod store;
pub mod utils;
pub mod validation;
pub mod whitelist;

pub use cli::{Cli, Commands, ConfigAction, VipAction};
pub use config::Config;
pub use error::BipError;
