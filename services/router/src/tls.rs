//! TLS configuration.
//!
//! Loads the server credential from a PKCS#12 keystore and builds the
//! rustls server parameters the engine runs with: an explicit allow-list of
//! cipher suites in server-preferred order, TLS 1.2/1.3 only, the ALPN
//! offers, and a client-certificate policy of "request, never require".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::{version, RootCertStore, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use thiserror::Error;
use tracing::debug;

/// Cipher suites offered, in server-preferred order. Forward-secret AEAD
/// suites only.
pub static GOOD_CIPHER_SUITES: &[SupportedCipherSuite] = &[
    ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
    ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
    ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
    ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ring::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&version::TLS13, &version::TLS12];

/// ALPN identifiers offered to clients, in priority order.
pub static ALPN_PROTOCOLS: &[&[u8]] = &[b"http/1.1", b"http/1.0", b"http/0.9"];

/// Failures while loading credentials or assembling the configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read keystore {path}: {source}")]
    KeystoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("keystore is not valid PKCS#12: {0}")]
    KeystoreFormat(String),

    #[error("keystore MAC verification failed; wrong passphrase?")]
    BadPassphrase,

    #[error("keystore holds no certificate or no private key")]
    EmptyKeystore,

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),

    #[error("client certificate verifier: {0}")]
    Verifier(rustls::server::VerifierBuilderError),
}

/// Server credential extracted from the keystore: the certificate chain
/// (leaf first) and its private key.
#[derive(Debug)]
pub struct KeystoreIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Reads a PKCS#12 keystore, decrypting it with `passphrase`.
pub fn load_keystore(path: &Path, passphrase: &str) -> Result<KeystoreIdentity, TlsError> {
    let der = fs::read(path).map_err(|source| TlsError::KeystoreRead {
        path: path.to_path_buf(),
        source,
    })?;
    let pfx = p12::PFX::parse(&der).map_err(|err| TlsError::KeystoreFormat(format!("{err:?}")))?;
    if !pfx.verify_mac(passphrase) {
        return Err(TlsError::BadPassphrase);
    }
    let keys = pfx
        .key_bags(passphrase)
        .map_err(|err| TlsError::KeystoreFormat(format!("{err:?}")))?;
    let certs = pfx
        .cert_x509_bags(passphrase)
        .map_err(|err| TlsError::KeystoreFormat(format!("{err:?}")))?;

    let key = keys.into_iter().next().ok_or(TlsError::EmptyKeystore)?;
    if certs.is_empty() {
        return Err(TlsError::EmptyKeystore);
    }
    debug!(certs = certs.len(), "keystore loaded");

    Ok(KeystoreIdentity {
        certs: certs.into_iter().map(CertificateDer::from).collect(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key)),
    })
}

/// Builds the rustls server configuration the engine is handed.
pub fn server_config(identity: KeystoreIdentity) -> Result<Arc<ServerConfig>, TlsError> {
    let provider = Arc::new(CryptoProvider {
        cipher_suites: GOOD_CIPHER_SUITES.to_vec(),
        ..ring::default_provider()
    });

    let verifier = client_certificate_verifier(&identity, Arc::clone(&provider))?;

    let builder = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)?;
    let mut config = match verifier {
        Some(verifier) => builder.with_client_cert_verifier(verifier),
        None => builder.with_no_client_auth(),
    }
    .with_single_cert(identity.certs, identity.key)?;

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|proto| proto.to_vec()).collect();
    Ok(Arc::new(config))
}

/// Client certificates are requested, never required. Validation needs
/// trust anchors, which the keystore only supplies when it carries issuer
/// certificates beyond the leaf; a leaf-only keystore disables the request.
fn client_certificate_verifier(
    identity: &KeystoreIdentity,
    provider: Arc<CryptoProvider>,
) -> Result<Option<Arc<dyn ClientCertVerifier>>, TlsError> {
    if identity.certs.len() < 2 {
        return Ok(None);
    }
    let mut roots = RootCertStore::empty();
    for cert in &identity.certs[1..] {
        roots.add(cert.clone())?;
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
        .allow_unauthenticated()
        .build()
        .map_err(TlsError::Verifier)?;
    Ok(Some(verifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keystore_reports_the_path() {
        let err = load_keystore(Path::new("/nonexistent/store.p12"), "secret").unwrap_err();
        match err {
            TlsError::KeystoreRead { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/store.p12"));
            }
            other => panic!("expected KeystoreRead, got {other:?}"),
        }
    }

    #[test]
    fn garbage_keystore_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "hostgate-garbage-keystore-{}.p12",
            std::process::id()
        ));
        fs::write(&path, b"this is not a pkcs12 archive").unwrap();
        let err = load_keystore(&path, "secret").unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, TlsError::KeystoreFormat(_)));
    }

    #[test]
    fn suite_list_is_forward_secret_only() {
        assert!(!GOOD_CIPHER_SUITES.is_empty());
        for suite in GOOD_CIPHER_SUITES {
            let name = format!("{:?}", suite.suite());
            assert!(
                name.starts_with("TLS13_") || name.contains("ECDHE"),
                "unexpected suite {name}"
            );
        }
    }

    #[test]
    fn alpn_prefers_http11() {
        assert_eq!(ALPN_PROTOCOLS[0], b"http/1.1");
        assert_eq!(ALPN_PROTOCOLS.len(), 3);
    }
}
