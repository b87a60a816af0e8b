//! Routing and redirection tables.
//!
//! Both tables are built once at startup from configuration and are
//! read-only for the process lifetime, so they are safe to share across
//! connection tasks without locking. Hostname keys are matched byte-exact,
//! as presented by SNI or the Host header.

use std::collections::HashMap;

use tracing::warn;

/// Target of a configured redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Absolute URI sent back in the `Location` header.
    pub target: String,
    /// `true` answers 308, `false` answers 307.
    pub permanent: bool,
}

/// What to do with a connection for a resolved host.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision<'a> {
    /// Host is redirected elsewhere.
    Redirect(&'a Redirect),
    /// Host is served by the backend on this local port.
    Route(u16),
    /// Host is configured nowhere.
    Reject,
}

/// The immutable routing state of one process.
#[derive(Debug, Default)]
pub struct Tables {
    routes: HashMap<String, u16>,
    redirects: HashMap<String, Redirect>,
}

impl Tables {
    /// Builds both tables. Duplicate entries keep the last occurrence; a
    /// host present in both tables is answered by the redirection table.
    pub fn build(
        routes: impl IntoIterator<Item = (String, u16)>,
        redirects: impl IntoIterator<Item = (String, Redirect)>,
    ) -> Self {
        let mut table = Tables::default();
        for (host, port) in routes {
            if table.routes.insert(host.clone(), port).is_some() {
                warn!(host = %host, "duplicate route entry, last one wins");
            }
        }
        for (host, redirect) in redirects {
            if table.redirects.insert(host.clone(), redirect).is_some() {
                warn!(host = %host, "duplicate redirect entry, last one wins");
            }
            if table.routes.contains_key(&host) {
                warn!(
                    host = %host,
                    "host is both routed and redirected; redirection takes precedence"
                );
            }
        }
        table
    }

    /// Whether `host` appears in either table.
    pub fn contains(&self, host: &str) -> bool {
        self.redirects.contains_key(host) || self.routes.contains_key(host)
    }

    /// The decision for a resolved host. Redirection is checked first.
    pub fn decide(&self, host: &str) -> Decision<'_> {
        if let Some(redirect) = self.redirects.get(host) {
            return Decision::Redirect(redirect);
        }
        match self.routes.get(host) {
            Some(port) => Decision::Route(*port),
            None => Decision::Reject,
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tables {
        Tables::build(
            [
                ("app.example".to_string(), 8080),
                ("api.example".to_string(), 9090),
                ("moved.example".to_string(), 7070),
            ],
            [(
                "moved.example".to_string(),
                Redirect {
                    target: "https://elsewhere.example/".to_string(),
                    permanent: true,
                },
            )],
        )
    }

    #[test]
    fn routed_host_yields_its_port() {
        let tables = sample();
        assert_eq!(tables.decide("app.example"), Decision::Route(8080));
        assert_eq!(tables.decide("api.example"), Decision::Route(9090));
    }

    #[test]
    fn redirection_takes_precedence_over_routing() {
        let tables = sample();
        match tables.decide("moved.example") {
            Decision::Redirect(redirect) => {
                assert_eq!(redirect.target, "https://elsewhere.example/");
                assert!(redirect.permanent);
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn unknown_host_is_rejected() {
        let tables = sample();
        assert_eq!(tables.decide("nope.example"), Decision::Reject);
        assert!(!tables.contains("nope.example"));
    }

    #[test]
    fn matching_is_byte_exact() {
        let tables = sample();
        assert!(tables.contains("app.example"));
        assert!(!tables.contains("APP.example"));
        assert!(!tables.contains("app.example."));
    }

    #[test]
    fn decisions_are_stable_across_lookups() {
        let tables = sample();
        for _ in 0..3 {
            assert_eq!(tables.decide("app.example"), Decision::Route(8080));
        }
    }
}
