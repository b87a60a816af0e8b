//! Per-connection relay.
//!
//! Owns the full lifecycle of one accepted secure connection:
//! handshake, host resolution, the redirect/route/reject decision, the
//! backend connection, and the two forwarding loops. Every path out of the
//! state machine ends with both sockets closed exactly once, whichever
//! stage failed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use hostgate_httpwire::{Request, Response, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

use super::engine::{TlsReader, TlsStream, TlsWriter};
use super::resolver::{self, Resolution};
use super::tables::{Decision, Tables};
use crate::error::RelayError;
use crate::stats::HostCounters;

/// Single attempt, no failover.
const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Buffer size of each forwarding direction.
const COPY_BUFFER: usize = 16 * 1024;

/// Anything the relay can pull request bytes out of.
pub(crate) trait MessageSource {
    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl MessageSource for TlsStream {
    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await
    }
}

impl MessageSource for TcpStream {
    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

/// Reads bytes until one full request head parses.
///
/// Returns the parsed request plus whatever bytes arrived after the head
/// (the start of a body, or of a pipelined message). `Ok(None)` means the
/// peer closed cleanly before sending anything.
pub(crate) async fn read_request<S: MessageSource>(
    source: &mut S,
) -> Result<Option<(Request, BytesMut)>, RelayError> {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        if let Some((request, consumed)) = Request::parse(&buf)? {
            let leftover = buf.split_off(consumed);
            return Ok(Some((request, leftover)));
        }
        let n = source.read_some(&mut chunk).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(RelayError::TruncatedRequest)
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Writes a terminal response and closes the stream.
async fn respond(
    stream: &mut TlsStream,
    status: u16,
    version: Version,
    extra_headers: &[(&str, &str)],
) -> io::Result<()> {
    let mut response = Response::new(status, version);
    for (name, value) in extra_headers {
        response = response.header(*name, *value);
    }
    let response = response
        .header("Connection", "close")
        .header("Content-Length", "0");
    stream.write_all(&response.encode()).await?;
    stream.shutdown().await
}

/// The state machine for one accepted secure connection.
pub(crate) struct Relay {
    remote: SocketAddr,
    tls_config: Arc<rustls::ServerConfig>,
    tables: Arc<Tables>,
    counters: Arc<HostCounters>,
}

impl Relay {
    pub(crate) fn new(
        remote: SocketAddr,
        tls_config: Arc<rustls::ServerConfig>,
        tables: Arc<Tables>,
        counters: Arc<HostCounters>,
    ) -> Self {
        Self {
            remote,
            tls_config,
            tables,
            counters,
        }
    }

    /// Runs the connection to completion. This is the relay boundary of the
    /// error contract: every failure is logged here with its connection
    /// context and never propagates further.
    pub(crate) async fn run(self, sock: TcpStream) {
        if let Err(err) = self.drive(sock).await {
            tracing::warn!(error = %err, "connection terminated");
        }
    }

    async fn drive(self, sock: TcpStream) -> Result<(), RelayError> {
        let mut stream = TlsStream::new(sock, Arc::clone(&self.tls_config), Arc::clone(&self.counters))?;

        // Handshaking. On failure nothing is written: without agreed key
        // material there is no channel to respond on.
        let session = stream.handshake().await?;
        debug!(
            protocol = ?session.protocol,
            cipher = ?session.cipher_suite,
            alpn = session.alpn.as_deref().unwrap_or("-"),
            sni = ?session.server_names,
            client_certs = session.peer_certificates.len(),
            "TLS session established"
        );

        // HostResolved: SNI first, Host header only as fallback.
        let sni_host = match resolver::resolve(&session.server_names, &self.tables) {
            Resolution::Matched(host) => Some(host),
            Resolution::NoServerName => None,
            Resolution::NoneMatched => {
                // Already encrypted to a certificate that corresponds to no
                // configured host; no meaningful response can be framed.
                return Err(RelayError::UnmatchedSni(session.server_names));
            }
        };

        // The first request is read on every responding path: it supplies
        // the HTTP version for terminal responses and the Host fallback,
        // and on the routed path it is the first message forwarded.
        let (request, leftover) = match read_request(&mut stream).await {
            Ok(Some(parts)) => parts,
            Ok(None) => return Ok(()),
            Err(err @ (RelayError::Malformed(_) | RelayError::TruncatedRequest)) => {
                respond(&mut stream, 400, Version::Http11, &[]).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let host = match sni_host {
            Some(host) => host,
            None => match request.host() {
                Some(host) => host.to_string(),
                None => {
                    respond(&mut stream, 400, request.version, &[]).await?;
                    return Err(RelayError::MissingHost);
                }
            },
        };

        match self.tables.decide(&host) {
            Decision::Redirect(redirect) => {
                info!(
                    host = %host,
                    target = %redirect.target,
                    permanent = redirect.permanent,
                    "redirecting"
                );
                let status = if redirect.permanent { 308 } else { 307 };
                respond(
                    &mut stream,
                    status,
                    request.version,
                    &[("Location", redirect.target.as_str())],
                )
                .await?;
                Ok(())
            }
            Decision::Route(port) => {
                self.relay_to_backend(stream, request, leftover, host, port)
                    .await
            }
            Decision::Reject => {
                respond(&mut stream, 404, request.version, &[]).await?;
                Err(RelayError::UnknownHost(host))
            }
        }
    }

    /// Routing and Relaying: one backend connection attempt, the first
    /// request forwarded re-serialized, then raw byte forwarding in both
    /// directions until either side ends.
    async fn relay_to_backend(
        &self,
        mut stream: TlsStream,
        mut request: Request,
        leftover: BytesMut,
        host: String,
        port: u16,
    ) -> Result<(), RelayError> {
        let backend = match timeout(
            BACKEND_CONNECT_TIMEOUT,
            TcpStream::connect(("localhost", port)),
        )
        .await
        {
            Ok(Ok(backend)) => backend,
            Ok(Err(source)) => {
                error!(host = %host, port, error = %source, "backend refused connection");
                respond(&mut stream, 503, request.version, &[]).await?;
                return Err(RelayError::BackendConnect { host, port, source });
            }
            Err(_) => {
                error!(host = %host, port, "backend connect timed out");
                respond(&mut stream, 503, request.version, &[]).await?;
                return Err(RelayError::BackendTimeout {
                    host,
                    port,
                    timeout: BACKEND_CONNECT_TIMEOUT,
                });
            }
        };

        info!(host = %host, port, path = %request.target, "routing");

        request.headers.append(
            "Forwarded",
            format!("for=\"{}\";proto=https", self.remote),
        );

        // The first request is fully written before the forwarding loops
        // start, so request order is preserved end to end.
        let (backend_rd, mut backend_wr) = backend.into_split();
        backend_wr.write_all(&request.encode()).await?;
        if !leftover.is_empty() {
            backend_wr.write_all(&leftover).await?;
        }

        let (tls_rd, tls_wr) = stream.into_split();
        let cancel = CancellationToken::new();
        let inbound = tokio::spawn(
            copy_client_to_backend(tls_rd, backend_wr, cancel.clone())
                .instrument(Span::current()),
        );
        let outbound = tokio::spawn(
            copy_backend_to_client(backend_rd, tls_wr, cancel).instrument(Span::current()),
        );

        // Completion latch: the connection is only declared torn down once
        // both directions have stopped.
        let bytes_to_backend = inbound.await.unwrap_or(0);
        let bytes_to_client = outbound.await.unwrap_or(0);
        debug!(bytes_to_backend, bytes_to_client, "relay finished");
        Ok(())
    }
}

/// Forwards decrypted client bytes to the backend until end-of-stream,
/// I/O failure, or cancellation by the opposite direction.
async fn copy_client_to_backend(
    mut rd: TlsReader,
    mut wr: OwnedWriteHalf,
    cancel: CancellationToken,
) -> u64 {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            read = rd.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    debug!(error = %err, "client read failed");
                    break;
                }
            },
        };
        if let Err(err) = wr.write_all(&buf[..n]).await {
            debug!(error = %err, "backend write failed");
            break;
        }
        total += n as u64;
    }
    let _ = wr.shutdown().await;
    cancel.cancel();
    total
}

/// Forwards backend bytes to the client, encrypting on the way out.
async fn copy_backend_to_client(
    mut rd: OwnedReadHalf,
    mut wr: TlsWriter,
    cancel: CancellationToken,
) -> u64 {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            read = rd.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    debug!(error = %err, "backend read failed");
                    break;
                }
            },
        };
        if let Err(err) = wr.write_all(&buf[..n]).await {
            debug!(error = %err, "client write failed");
            break;
        }
        total += n as u64;
    }
    let _ = wr.shutdown().await;
    cancel.cancel();
    total
}
