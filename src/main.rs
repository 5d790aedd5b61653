//! bip - SSH brute-force ban manager
//!
//! Counts failed logins, bans offenders in nftables sets and reports on them.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blockip::cli::{Cli, Commands};
use blockip::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(commands::exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = &cli.config;
    match cli.command {
        Commands::Check { ip } => commands::check::run(ip, config).await,
        Commands::Clean { ip } => commands::check::run_clean(ip, config).await,
        Commands::List { watch, json } => commands::list::run(watch, json, config).await,
        Commands::Show => commands::show::run(config).await,
        Commands::Add { ip } => commands::ban::add(&ip, config).await,
        Commands::Del { ip } => commands::ban::del(&ip, config).await,
        Commands::Vip { action } => commands::vip::run(action, config).await,
        Commands::Config { action } => commands::config::run(action, config).await,
        Commands::Restore => commands::restore::run(config).await,
        Commands::Enrich { ip } => commands::enrich::run(&ip, config).await,
        Commands::Version => {
            println!("bip {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
