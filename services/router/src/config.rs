//! Command-line configuration surface.
//!
//! Everything here is parsed once at startup and consumed read-only by the
//! core: the routing and redirection tables are built from the repeatable
//! `--route` and `--redirect` entries and never change afterwards.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::proxy::{Redirect, Tables};

#[derive(Parser, Debug)]
#[command(
    name = "hostgate",
    version,
    about = "TLS-terminating host-routing HTTP reverse proxy"
)]
pub struct Cli {
    /// PKCS#12 keystore with the server certificate chain and private key.
    #[arg(long)]
    pub keystore: PathBuf,

    /// Passphrase protecting the keystore.
    #[arg(long)]
    pub keystore_passphrase: String,

    /// Address both listeners bind on.
    #[arg(long, default_value = "0.0.0.0")]
    pub ip: IpAddr,

    /// TLS listener port.
    #[arg(long, default_value_t = 443)]
    pub port: u16,

    /// Plaintext listener port; answers every request with an upgrade
    /// redirect to https.
    #[arg(long, default_value_t = 80)]
    pub port_insecure: u16,

    /// Routed host, repeatable: host,backend-port
    #[arg(long = "route", value_name = "HOST,PORT")]
    pub routes: Vec<RouteEntry>,

    /// Redirected host, repeatable: host,target-uri,permanent
    #[arg(long = "redirect", value_name = "HOST,URI,PERMANENT")]
    pub redirects: Vec<RedirectEntry>,
}

impl Cli {
    /// Builds the immutable tables the relay consults.
    pub fn tables(&self) -> Tables {
        Tables::build(
            self.routes
                .iter()
                .map(|entry| (entry.host.clone(), entry.port)),
            self.redirects.iter().map(|entry| {
                (
                    entry.host.clone(),
                    Redirect {
                        target: entry.target.clone(),
                        permanent: entry.permanent,
                    },
                )
            }),
        )
    }
}

/// One `--route host,port` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub host: String,
    pub port: u16,
}

impl FromStr for RouteEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .split_once(',')
            .ok_or_else(|| format!("expected host,port but got {s:?}"))?;
        if host.is_empty() {
            return Err(format!("empty host in route entry {s:?}"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|err| format!("bad port in route entry {s:?}: {err}"))?;
        Ok(RouteEntry {
            host: host.to_string(),
            port,
        })
    }
}

/// One `--redirect host,target-uri,permanent` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectEntry {
    pub host: String,
    pub target: String,
    pub permanent: bool,
}

impl FromStr for RedirectEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ',');
        let host = parts
            .next()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| format!("empty host in redirect entry {s:?}"))?;
        let target = parts
            .next()
            .filter(|target| !target.is_empty())
            .ok_or_else(|| format!("missing target URI in redirect entry {s:?}"))?;
        let permanent = match parts.next() {
            Some("true") => true,
            Some("false") => false,
            _ => {
                return Err(format!(
                    "redirect entry {s:?} must end in ,true or ,false"
                ))
            }
        };
        Ok(RedirectEntry {
            host: host.to_string(),
            target: target.to_string(),
            permanent,
        })
    }
}
