//! croftd entry point: configuration, logging, backend clients, HTTP serve
//! loop and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use croft_diameter::{CxClient, LocalIdentity};
use croft_store::{MemoryStore, SubscriberCache};
use croftd::hss::{DiameterHssGateway, HssGateway};
use croftd::{server, AppContext, Config};

/// croft - HTTP front-end for IMS subscriber data
#[derive(Parser, Debug)]
#[command(name = "croftd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP front-end for IMS subscriber data", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/croft/croft.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,

    /// Override the HTTP bind address
    #[arg(long)]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    log::info!("croftd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(http_addr) = &args.http_addr {
        config.http.addr = http_addr.clone();
    }

    let http_addr: SocketAddr = config
        .http
        .addr
        .parse()
        .with_context(|| format!("invalid http.addr {:?}", config.http.addr))?;

    let cache = Arc::new(SubscriberCache::new(Arc::new(MemoryStore::new())));

    let hss: Option<Arc<dyn HssGateway>> = if config.hss.enabled {
        let addr: SocketAddr = config
            .hss
            .addr
            .parse()
            .with_context(|| format!("invalid hss.addr {:?}", config.hss.addr))?;
        let identity = LocalIdentity {
            host: config.diameter.origin_host.clone(),
            realm: config.diameter.origin_realm.clone(),
        };
        log::info!(
            "connecting to HSS at {addr} (Dest-Realm {}, Dest-Host {})",
            config.hss.dest_realm,
            config.hss.dest_host
        );
        let client = CxClient::connect(addr, &identity)
            .await
            .context("connecting to the HSS")?;
        Some(Arc::new(DiameterHssGateway::new(client, &config)))
    } else {
        log::info!("no HSS configured - serving as master of local subscriber data");
        None
    };

    let ctx = AppContext::new(config, cache, hss);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .context("installing the shutdown handler")?;

    server::serve(ctx, http_addr, shutdown_rx)
        .await
        .context("running the HTTP ingress")?;

    log::info!("croftd stopped");
    Ok(())
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);
    builder.format_timestamp_millis();
    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }
    builder.init();
}

fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        log::info!("loading configuration from {path}");
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {path}"))?;
        Config::from_yaml(&text).with_context(|| format!("parsing {path}"))
    } else {
        log::debug!("configuration file {path} not found - using defaults");
        Ok(Config::default())
    }
}
