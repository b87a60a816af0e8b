//! Relay error taxonomy.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::proxy::EngineError;

/// Terminal conditions of one relayed connection.
///
/// Every variant is fatal to its connection only. The relay converts each
/// into a terminal HTTP response when the response channel is still safely
/// writable, or a silent close when it is not, before the error surfaces
/// for logging.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Handshake(#[from] EngineError),

    /// The client's first message was not a parseable HTTP request.
    #[error("malformed HTTP request: {0}")]
    Malformed(#[from] hostgate_httpwire::WireError),

    /// The client closed mid-request before a full head section arrived.
    #[error("connection closed before a full request was read")]
    TruncatedRequest,

    /// No SNI was presented and the request carries no Host header.
    #[error("request carries no Host header and no SNI was presented")]
    MissingHost,

    /// SNI was presented but named no configured host. Closed without a
    /// response: the session is already certificate-bound to an identity
    /// this process does not serve.
    #[error("SNI names {0:?} match no configured host")]
    UnmatchedSni(Vec<String>),

    /// The resolved host is in neither table.
    #[error("no route or redirect for host {0:?}")]
    UnknownHost(String),

    /// The backend refused the connection.
    #[error("backend localhost:{port} for host {host:?} unreachable: {source}")]
    BackendConnect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The backend did not accept within the connect timeout.
    #[error("backend localhost:{port} for host {host:?} did not accept within {timeout:?}")]
    BackendTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
