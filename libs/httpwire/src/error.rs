//! Error types for HTTP message framing.

use thiserror::Error;

/// Errors raised while parsing an HTTP message head.
#[derive(Debug, Error)]
pub enum WireError {
    /// The bytes do not form a valid HTTP/1.x message.
    #[error("invalid HTTP message: {0}")]
    Invalid(#[from] httparse::Error),

    /// The message declares an HTTP/1.x minor version this crate does not speak.
    #[error("unsupported HTTP version 1.{0}")]
    UnsupportedVersion(u8),

    /// The head section grew past [`crate::MAX_HEAD_BYTES`] without completing.
    #[error("header section exceeds {} bytes", crate::MAX_HEAD_BYTES)]
    HeadTooLarge,

    /// A header value contained bytes that are not valid UTF-8.
    #[error("header value is not valid UTF-8")]
    HeaderEncoding,
}
