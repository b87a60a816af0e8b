//! TLS handshake/record engine.
//!
//! rustls exposes a push/pull state machine: the caller feeds it encrypted
//! bytes, asks it to process them, and drains whatever encrypted output it
//! queues. This module adapts that primitive into the byte-stream interface
//! the rest of the relay uses, and is the only place where that impedance
//! mismatch lives.
//!
//! After the handshake the stream can be split into independently owned
//! read/write halves so the two forwarding directions of a routed
//! connection can run as separate tasks. The halves share the rustls
//! connection behind an async mutex; the read half stages encrypted input
//! in its own buffer, so a read future cancelled mid-flight never loses
//! bytes.

use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use rustls::pki_types::CertificateDer;
use rustls::{CipherSuite, ProtocolVersion, ServerConfig, ServerConnection};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Largest plaintext span handed to the primitive per wrap call. One TLS
/// record holds at most this much application data.
const MAX_PLAINTEXT_CHUNK: usize = 16 * 1024;

/// Initial capacity of the encrypted staging buffer.
const STAGING_CAPACITY: usize = 8 * 1024;

/// Errors specific to driving the handshake.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The primitive rejected the handshake (bad record, protocol
    /// mismatch, certificate problems reported by the peer).
    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] rustls::Error),

    /// The peer closed the socket before the handshake finished.
    #[error("connection closed during TLS handshake")]
    ClosedDuringHandshake,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Negotiation results captured once the handshake completes.
///
/// Immutable for the remainder of the connection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub protocol: Option<ProtocolVersion>,
    pub cipher_suite: Option<CipherSuite>,
    /// Negotiated application protocol, if the client offered ALPN.
    pub alpn: Option<String>,
    /// Host names from the client's SNI extension. Empty means no SNI was
    /// sent.
    pub server_names: Vec<String>,
    /// Peer certificate chain when client authentication occurred. Empty
    /// is the "no identity" signal, not an error.
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

impl SessionInfo {
    fn from_connection(conn: &ServerConnection) -> Self {
        Self {
            protocol: conn.protocol_version(),
            cipher_suite: conn.negotiated_cipher_suite().map(|suite| suite.suite()),
            alpn: conn
                .alpn_protocol()
                .map(|proto| String::from_utf8_lossy(proto).into_owned()),
            server_names: conn
                .server_name()
                .map(|name| vec![name.to_string()])
                .unwrap_or_default(),
            peer_certificates: conn
                .peer_certificates()
                .map(|chain| chain.to_vec())
                .unwrap_or_default(),
        }
    }
}

/// State shared between the two halves: the primitive itself and the socket
/// write side, since both halves may need to push encrypted output (the
/// read half flushes alerts and post-handshake responses).
struct Shared {
    conn: ServerConnection,
    sock: OwnedWriteHalf,
}

impl Shared {
    /// Wrap step: drain every encrypted byte the primitive has queued and
    /// write it to the socket.
    async fn flush_tls(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            let mut encrypted = Vec::with_capacity(4096);
            self.conn.write_tls(&mut encrypted)?;
            if encrypted.is_empty() {
                break;
            }
            self.sock.write_all(&encrypted).await?;
        }
        Ok(())
    }
}

/// Unwrap step: feed staged encrypted bytes to the primitive and let it run
/// its deferred work. Flushes any output the processing queued (alerts, key
/// update responses).
async fn feed_staged(staged: &mut BytesMut, shared: &mut Shared) -> io::Result<()> {
    let mut encrypted: &[u8] = staged;
    let consumed = shared.conn.read_tls(&mut encrypted)?;
    staged.advance(consumed);
    if let Err(err) = shared.conn.process_new_packets() {
        let _ = shared.flush_tls().await;
        return Err(io::Error::new(io::ErrorKind::InvalidData, err));
    }
    if shared.conn.wants_write() {
        shared.flush_tls().await?;
    }
    Ok(())
}

/// Read half of a TLS stream: decrypts bytes pulled from the socket.
pub struct TlsReader {
    shared: Arc<Mutex<Shared>>,
    sock: OwnedReadHalf,
    /// Encrypted bytes read from the socket but not yet fed to the
    /// primitive. Owned by the half so cancellation cannot drop data.
    staged: BytesMut,
    counters: Arc<crate::stats::HostCounters>,
}

impl TlsReader {
    /// Reads decrypted bytes, unwrapping more encrypted input from the
    /// socket whenever the decrypted side runs dry. `Ok(0)` signals
    /// end-of-stream, whether by close_notify or by the peer dropping the
    /// connection.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut shared = self.shared.lock().await;
                if !self.staged.is_empty() {
                    feed_staged(&mut self.staged, &mut shared).await?;
                }
                match shared.conn.reader().read(buf) {
                    Ok(n) => {
                        if n > 0 {
                            self.counters.add_received(n as u64);
                        }
                        return Ok(n);
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err),
                }
            }
            let n = self.sock.read_buf(&mut self.staged).await?;
            if n == 0 {
                return Ok(0);
            }
        }
    }
}

/// Write half of a TLS stream: encrypts application bytes onto the socket.
pub struct TlsWriter {
    shared: Arc<Mutex<Shared>>,
    counters: Arc<crate::stats::HostCounters>,
}

impl TlsWriter {
    /// Encrypts `data`, chunking it so no single wrap call exceeds the
    /// plaintext record limit, and flushes every resulting encrypted byte
    /// before accepting the next chunk.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut shared = self.shared.lock().await;
        for chunk in data.chunks(MAX_PLAINTEXT_CHUNK) {
            shared.conn.writer().write_all(chunk)?;
            shared.flush_tls().await?;
        }
        self.counters.add_sent(data.len() as u64);
        Ok(())
    }

    /// Sends close_notify and shuts down the socket's write side.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        let mut shared = self.shared.lock().await;
        shared.conn.send_close_notify();
        shared.flush_tls().await?;
        shared.sock.shutdown().await
    }
}

/// A server-side TLS stream over one accepted socket.
pub struct TlsStream {
    reader: TlsReader,
    writer: TlsWriter,
}

impl TlsStream {
    pub fn new(
        sock: TcpStream,
        config: Arc<ServerConfig>,
        counters: Arc<crate::stats::HostCounters>,
    ) -> Result<Self, EngineError> {
        let conn = ServerConnection::new(config)?;
        let (read_half, write_half) = sock.into_split();
        let shared = Arc::new(Mutex::new(Shared {
            conn,
            sock: write_half,
        }));
        Ok(Self {
            reader: TlsReader {
                shared: Arc::clone(&shared),
                sock: read_half,
                staged: BytesMut::with_capacity(STAGING_CAPACITY),
                counters: Arc::clone(&counters),
            },
            writer: TlsWriter { shared, counters },
        })
    }

    /// Drives the handshake to completion.
    ///
    /// Each pass performs exactly one of: wrap pending output to the
    /// socket, unwrap staged input through the primitive, or read more
    /// encrypted bytes from the socket. End-of-stream before completion
    /// aborts; a processing failure flushes the queued alert and aborts.
    pub async fn handshake(&mut self) -> Result<SessionInfo, EngineError> {
        loop {
            let fed = {
                let mut shared = self.reader.shared.lock().await;
                if shared.conn.wants_write() {
                    shared.flush_tls().await?;
                }
                if !shared.conn.is_handshaking() {
                    return Ok(SessionInfo::from_connection(&shared.conn));
                }
                if self.reader.staged.is_empty() {
                    false
                } else {
                    let mut encrypted: &[u8] = &self.reader.staged;
                    let consumed = shared.conn.read_tls(&mut encrypted)?;
                    self.reader.staged.advance(consumed);
                    if let Err(err) = shared.conn.process_new_packets() {
                        let _ = shared.flush_tls().await;
                        return Err(EngineError::Handshake(err));
                    }
                    true
                }
            };
            if !fed {
                let n = self.reader.sock.read_buf(&mut self.reader.staged).await?;
                if n == 0 {
                    return Err(EngineError::ClosedDuringHandshake);
                }
            }
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }

    /// Splits into independently owned halves for the two relay directions.
    pub fn into_split(self) -> (TlsReader, TlsWriter) {
        (self.reader, self.writer)
    }
}
