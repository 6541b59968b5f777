// ██████╗ ███████╗ ██████╗
// ██╔══██╗██╔════╝██╔═══██╗
// ██████╔╝█████╗  ██║   ██║
// ██╔══██╗██╔══╝  ██║▄▄ ██║
// ██║  ██║██║     ╚██████╔╝
// ╚═╝  ╚═╝╚═╝      ╚══▀▀═╝
//
// S E N T I N E L
//
// Watches sourcing listing pages for new RFQs and tells the right group chat
// about each one exactly once. Or at least once, if the webhook is having a
// bad day.

mod config;
mod decoder;
mod dedup;
mod extractor;
mod fetcher;
mod locator;
mod models;
mod poller;
mod publisher;
mod scheduler;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::dedup::DedupStore;
use crate::fetcher::HttpFetcher;
use crate::poller::SourcePoller;
use crate::publisher::WeworkDispatcher;
use crate::scheduler::PollScheduler;

fn print_banner(config: &Config) {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════╗
    ║                                                          ║
    ║        📡  RFQ SENTINEL - LISTING WATCH ENGINE  📡       ║
    ║                                                          ║
    ║   Extract:  inline page scripts, one pattern per field   ║
    ║   Dedup:    bounded, write-through, most-recent-first    ║
    ║   Deliver:  group robot webhooks, at least once          ║
    ║                                                          ║
    ╚══════════════════════════════════════════════════════════╝
    "#;
    println!("{}", banner);
    for source in &config.sources {
        println!("    • {}", source.name);
    }
    println!();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    print_banner(&config);
    info!(
        sources = config.sources.len(),
        interval_secs = config.poll_interval.as_secs(),
        capacity = config.dedup_capacity,
        store = %config.dedup_store_path.display(),
        "Configuration loaded"
    );

    let store = DedupStore::load(&config.dedup_store_path, config.dedup_capacity);
    if store.is_empty() {
        info!("Dedup store is empty, everything on the first pass counts as new");
    } else {
        info!(remembered = store.len(), capacity = store.capacity(), "Dedup store primed");
    }
    let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout)
        .context("failed to build HTTP client")?;
    let dispatcher = WeworkDispatcher::new(config.request_timeout)
        .context("failed to build webhook client")?;
    let poller = SourcePoller::new(fetcher, dispatcher, config.extraction);

    let mut scheduler = PollScheduler::new(
        config.sources.clone(),
        poller,
        store,
        config.scheduler_settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Shutdown signal received, finishing the current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                error!(error = %err, "Signal listener error, Ctrl+C will not stop the sentinel");
                // keep the sender alive so the scheduler never mistakes this for a shutdown
                std::future::pending::<()>().await;
            }
        }
    });

    let cycles = scheduler.run(shutdown_rx).await;
    info!(
        cycles = cycles,
        lifetime = %scheduler.lifetime_stats(),
        "📡 RFQ SENTINEL: OFFLINE"
    );
    Ok(())
}
