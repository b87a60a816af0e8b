//! Host resolution.
//!
//! Picks the one hostname a connection is routed by, from two possibly
//! conflicting sources. SNI wins whenever it is present: it is the
//! encryption-layer commitment the client made before any HTTP bytes were
//! readable, so trusting it first stops a client from encrypting to one
//! virtual host's certificate while naming another in the Host header, and
//! lets an SNI mismatch be handled without reading plaintext at all.

use super::tables::Tables;

/// Outcome of resolving the TLS-layer host names against the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An SNI name matched a configured host; the Host header is not
    /// consulted.
    Matched(String),
    /// SNI was present but named no configured host. The relay closes the
    /// connection without a response.
    NoneMatched,
    /// The client sent no SNI; fall back to the first request's Host
    /// header.
    NoServerName,
}

/// Resolves the first SNI name that is configured in either table.
pub fn resolve(server_names: &[String], tables: &Tables) -> Resolution {
    if server_names.is_empty() {
        return Resolution::NoServerName;
    }
    for name in server_names {
        if tables.contains(name) {
            return Resolution::Matched(name.clone());
        }
    }
    Resolution::NoneMatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::tables::Redirect;

    fn tables() -> Tables {
        Tables::build(
            [("routed.example".to_string(), 8080)],
            [(
                "moved.example".to_string(),
                Redirect {
                    target: "https://new.example/".to_string(),
                    permanent: false,
                },
            )],
        )
    }

    #[test]
    fn absent_sni_falls_back_to_host_header() {
        assert_eq!(resolve(&[], &tables()), Resolution::NoServerName);
    }

    #[test]
    fn first_configured_name_wins() {
        let names = vec![
            "unknown.example".to_string(),
            "moved.example".to_string(),
            "routed.example".to_string(),
        ];
        assert_eq!(
            resolve(&names, &tables()),
            Resolution::Matched("moved.example".to_string())
        );
    }

    #[test]
    fn redirected_names_count_as_configured() {
        let names = vec!["moved.example".to_string()];
        assert_eq!(
            resolve(&names, &tables()),
            Resolution::Matched("moved.example".to_string())
        );
    }

    #[test]
    fn unmatched_sni_never_consults_the_host_header() {
        let names = vec!["unknown.example".to_string()];
        assert_eq!(resolve(&names, &tables()), Resolution::NoneMatched);
    }
}
