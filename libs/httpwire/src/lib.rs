//! # hostgate-httpwire
//!
//! HTTP/1.x message framing for the hostgate router.
//!
//! This crate owns the HTTP grammar so the router never has to: it turns a
//! byte buffer into a parsed request head and turns a response (or a
//! previously parsed request) back into bytes. Parsing is sans-io: the
//! caller accumulates bytes however it likes and feeds them in, and an
//! incomplete head is reported as `None` rather than an error.
//!
//! Bodies are deliberately out of scope. The router forwards everything
//! after the first request head as an opaque byte stream, so only the head
//! section is ever parsed or re-serialized here.

mod error;
mod headers;
mod request;
mod response;

pub use error::WireError;
pub use headers::Headers;
pub use request::Request;
pub use response::Response;

use std::fmt;

/// Upper bound on an accepted head section, in bytes.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Upper bound on the number of header lines in one message.
pub const MAX_HEADERS: usize = 64;

/// HTTP protocol version of a parsed or generated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Maps the minor version digit reported by the parser.
    pub(crate) fn from_minor(minor: u8) -> Result<Self, WireError> {
        match minor {
            0 => Ok(Version::Http10),
            1 => Ok(Version::Http11),
            other => Err(WireError::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}

/// Canonical reason phrase for the status codes this crate emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
