//! Asgard Sync demo - headless entry point

use anyhow::Context;
use asgard_sync::{init, AccountInfo, ChannelSink, Config};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod demo;
mod notifications;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Configuration directory
    #[arg(long)]
    config_dir: Option<String>,

    /// Number of demo accounts
    #[arg(long, default_value_t = 1)]
    accounts: usize,

    /// Folder to open in every account
    #[arg(long, default_value = "Work")]
    open: String,

    /// Seconds between simulated incoming messages
    #[arg(long, default_value_t = 15)]
    mail_every: u64,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for: Option<u64>,

    /// Write the effective configuration to the config directory
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(config_dir) = &args.config_dir {
        std::env::set_var("ASGARD_MAIL_CONFIG_DIR", config_dir);
    }

    let config_path = asgard_sync::default_config_dir().join("config.toml");
    let mut config = Config::load(&config_path).context("loading configuration")?;
    config.apply_env();
    if args.debug {
        config.app.debug = true;
        config.app.log_level = "debug".to_string();
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.app.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    if let Err(e) = init() {
        error!("Failed to initialize core library: {}", e);
        return Err(e.into());
    }
    config.validate().context("invalid configuration")?;

    if args.write_config {
        asgard_sync::get_config_dir()?;
        config.save(&config.config_file_path())?;
        info!("Wrote configuration to {}", config.config_file_path().display());
    }

    let (sink, rx) = ChannelSink::new();
    let printer = notifications::spawn_event_printer(rx, Duration::from_secs(5));
    let manager = asgard_sync::SyncManager::new(config.sync.clone(), Arc::new(sink))?;

    let mut traffic = Vec::new();
    for n in 1..=args.accounts.max(1) {
        let store = demo::seeded_store();
        let info = AccountInfo::new(format!("demo{}@asgard.example", n), Some(format!("Demo {}", n)));
        let session = manager.add_account(info, store.clone()).await?;

        let open = session.folder_content(&args.open);
        info!(folder = %args.open, cached = open.len(), "Opened folder");
        traffic.push(demo::spawn_incoming_mail(store, Duration::from_secs(args.mail_every.max(1))));
    }

    match args.run_for {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        }
    }

    for session in manager.accounts().await {
        let inbox = session.cache().inbox();
        println!("{}: {} messages in inbox", session.info(), inbox.len());
        for message in inbox.snapshot().iter().take(5) {
            println!("  {}  {}  {}", message.sent_at().date(), message.from_address(), message.subject());
        }
    }
    print!("{}", notifications::render_forest(&manager.account_forest().await?));

    for handle in traffic {
        handle.abort();
    }
    manager.shutdown().await;
    drop(manager);
    match tokio::time::timeout(Duration::from_secs(2), printer).await {
        Ok(Err(e)) => error!("Event printer failed: {}", e),
        Ok(Ok(())) => {}
        Err(_) => info!("Event printer still busy, leaving it"),
    }

    info!("Shut down");
    Ok(())
}
