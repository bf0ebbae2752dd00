//! TLS material for the scheduler transport.
//!
//! Certificates are PEM files. The client certificate file holds the
//! certificate chain followed by the private key and is presented as the
//! client identity; the server certificate file is a CA bundle added to the
//! built-in roots. Any failure here is logged and the transport is built
//! without the offending material.

use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder, Identity};
use thiserror::Error;
use tracing::{debug, error, warn};

/// TLS settings for the scheduler connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub client_certificate: Option<PathBuf>,
    pub client_password: Option<String>,
    pub server_certificate: Option<PathBuf>,
    pub server_password: Option<String>,
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate material in {path}: {source}")]
    Material {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },
}

/// Apply the configured TLS material to a client builder.
pub(crate) fn apply(mut builder: ClientBuilder, tls: &TlsConfig) -> ClientBuilder {
    builder = builder.use_rustls_tls();

    if let Some(path) = &tls.client_certificate {
        if tls.client_password.as_deref().is_some_and(|p| !p.is_empty()) {
            warn!(path = %path.display(), "Client certificate password ignored, PEM keys must be unencrypted");
        }
        match load_identity(path) {
            Ok(identity) => {
                debug!(path = %path.display(), "Loaded client certificate");
                builder = builder.identity(identity);
            }
            Err(e) => error!(error = %e, "Configuring client certificate failed"),
        }
    }

    if let Some(path) = &tls.server_certificate {
        if tls.server_password.as_deref().is_some_and(|p| !p.is_empty()) {
            warn!(path = %path.display(), "Server certificate password ignored, CA bundles are read as PEM");
        }
        match load_roots(path) {
            Ok(roots) => {
                debug!(path = %path.display(), count = roots.len(), "Loaded server certificates");
                for root in roots {
                    builder = builder.add_root_certificate(root);
                }
            }
            Err(e) => error!(error = %e, "Configuring server certificate failed"),
        }
    }

    builder
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_identity(path: &Path) -> Result<Identity, TlsError> {
    Identity::from_pem(&read(path)?).map_err(|source| TlsError::Material {
        path: path.to_path_buf(),
        source,
    })
}

fn load_roots(path: &Path) -> Result<Vec<Certificate>, TlsError> {
    Certificate::from_pem_bundle(&read(path)?).map_err(|source| TlsError::Material {
        path: path.to_path_buf(),
        source,
    })
}
