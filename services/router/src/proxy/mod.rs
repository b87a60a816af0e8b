//! Secure connection handling.
//!
//! This module provides:
//! - The TLS handshake/record engine over the rustls primitive
//! - Host resolution from SNI with Host-header fallback
//! - Immutable routing and redirection tables
//! - The per-connection relay state machine
//! - The secure and insecure accept loops
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> TLS Engine -> Host Resolver -> Tables
//!                                                        |
//!                              redirect / reject <-------+-------> Relay -> Backend
//! ```

mod engine;
mod listener;
mod relay;
mod resolver;
mod tables;

pub use engine::{EngineError, SessionInfo, TlsReader, TlsStream, TlsWriter};
pub use listener::{InsecureListener, SecureListener};
pub use resolver::{resolve, Resolution};
pub use tables::{Decision, Redirect, Tables};
