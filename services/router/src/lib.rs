//! hostgate router
//!
//! A TLS-terminating HTTP reverse proxy. Inbound connections are routed by
//! the hostname the client asked for (TLS SNI, or the Host header when no
//! SNI was sent) to a backend port, a redirect, or a rejection.

pub mod config;
pub mod error;
pub mod proxy;
pub mod stats;
pub mod tls;

pub use error::RelayError;
pub use proxy::{
    Decision, InsecureListener, Redirect, Resolution, SecureListener, SessionInfo, Tables,
    TlsStream,
};
pub use stats::ConnectionStats;
