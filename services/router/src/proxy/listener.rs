//! Accept loops.
//!
//! The secure listener feeds the relay; the insecure listener is a
//! stateless responder that upgrades every plaintext request to HTTPS with
//! a redirect. Each accepted connection runs in its own task inside a span
//! carrying the remote address and a process-unique connection id, so every
//! log line of a connection is correlated.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hostgate_httpwire::{Response, Version};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use super::relay::{read_request, Relay};
use super::tables::Tables;
use crate::error::RelayError;
use crate::stats::ConnectionStats;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Accept loop for the TLS port; one relay task per connection.
pub struct SecureListener {
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    tables: Arc<Tables>,
    stats: Arc<ConnectionStats>,
}

impl SecureListener {
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Arc<rustls::ServerConfig>,
        tables: Arc<Tables>,
        stats: Arc<ConnectionStats>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(bind_addr = %listener.local_addr()?, "secure listener bound");
        Ok(Self {
            listener,
            tls_config,
            tables,
            stats,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((sock, remote)) => {
                    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
                    let counters = self.stats.record_connection(&remote.ip().to_string());
                    let relay = Relay::new(
                        remote,
                        Arc::clone(&self.tls_config),
                        Arc::clone(&self.tables),
                        counters,
                    );
                    tokio::spawn(
                        relay
                            .run(sock)
                            .instrument(tracing::info_span!("connection", id, remote = %remote)),
                    );
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    // Avoid a tight loop on persistent accept errors.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Accept loop for the plaintext port; answers upgrade redirects only.
pub struct InsecureListener {
    listener: TcpListener,
}

impl InsecureListener {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(bind_addr = %listener.local_addr()?, "insecure listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((sock, remote)) => {
                    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(
                        async move {
                            if let Err(err) = upgrade_redirect(sock).await {
                                warn!(error = %err, "insecure connection failed");
                            }
                        }
                        .instrument(tracing::info_span!("upgrade", id, remote = %remote)),
                    );
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Reads one plaintext request and answers the redirect to HTTPS.
async fn upgrade_redirect(mut sock: TcpStream) -> Result<(), RelayError> {
    let (response, result) = match read_request(&mut sock).await {
        Ok(Some((request, _leftover))) => match request.host() {
            Some(host) => {
                let location = format!("https://{}{}", host, request.target);
                debug!(host = %host, location = %location, "upgrading to https");
                (
                    Response::new(308, request.version).header("Location", location),
                    Ok(()),
                )
            }
            None => (
                Response::new(400, request.version),
                Err(RelayError::MissingHost),
            ),
        },
        Ok(None) => return Ok(()),
        Err(err @ (RelayError::Malformed(_) | RelayError::TruncatedRequest)) => {
            (Response::new(400, Version::Http11), Err(err))
        }
        Err(err) => {
            let _ = sock.shutdown().await;
            return Err(err);
        }
    };
    let response = response
        .header("Connection", "close")
        .header("Content-Length", "0");
    sock.write_all(&response.encode()).await?;
    sock.shutdown().await?;
    result
}
