//! hostgate
//!
//! TLS-terminating HTTP reverse proxy / router.
//!
//! This binary:
//! - Loads a PKCS#12 server credential and builds the TLS parameters
//! - Builds the immutable routing and redirection tables from the CLI
//! - Accepts TLS connections and relays them to backends by hostname
//! - Answers plaintext connections with an upgrade redirect to https
//! - Reports per-remote-host traffic totals on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hostgate_router::config::Cli;
use hostgate_router::{tls, ConnectionStats, InsecureListener, SecureListener};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hostgate");

    let identity = tls::load_keystore(&cli.keystore, &cli.keystore_passphrase)
        .context("loading keystore")?;
    let tls_config = tls::server_config(identity).context("building TLS configuration")?;

    let tables = Arc::new(cli.tables());
    let stats = Arc::new(ConnectionStats::new());
    info!(
        routes = tables.route_count(),
        redirects = tables.redirect_count(),
        "tables built"
    );

    let secure = SecureListener::bind(
        SocketAddr::new(cli.ip, cli.port),
        tls_config,
        Arc::clone(&tables),
        Arc::clone(&stats),
    )
    .await
    .context("binding TLS listener")?;
    let insecure = InsecureListener::bind(SocketAddr::new(cli.ip, cli.port_insecure))
        .await
        .context("binding plaintext listener")?;

    info!(
        secure = %secure.local_addr()?,
        insecure = %insecure.local_addr()?,
        "listening"
    );

    tokio::spawn(async move {
        if let Err(err) = secure.run().await {
            error!(error = %err, "secure listener failed");
        }
    });
    tokio::spawn(async move {
        if let Err(err) = insecure.run().await {
            error!(error = %err, "insecure listener failed");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");
    stats.report();
    Ok(())
}
