//! mTLS client material for KAS transports.

use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder, Identity};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{KasError, Result};
use crate::pem;

/// Client certificate, key and optional CA bundle loaded from disk.
pub struct ClientTls {
    /// Key and certificate chain concatenated as PEM.
    identity_pem: Zeroizing<Vec<u8>>,
    /// DER certificates of the trusted CA bundle; empty disables server
    /// certificate verification.
    ca_certs: Vec<Vec<u8>>,
    cert_path: PathBuf,
}

impl std::fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTls")
            .field("cert_path", &self.cert_path)
            .field("ca_certs", &self.ca_certs.len())
            .finish_non_exhaustive()
    }
}

impl ClientTls {
    /// Loads client material.
    ///
    /// Returns `Ok(None)` when the certificate or key is not configured or
    /// does not exist; the caller then builds a client without client auth.
    pub fn load(
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
        ca_path: Option<&Path>,
    ) -> Result<Option<Self>> {
        let (Some(cert_path), Some(key_path)) = (existing(cert_path), existing(key_path)) else {
            warn!(
                cert = ?cert_path,
                key = ?key_path,
                "mTLS client certificate or key missing, using client without client auth"
            );
            return Ok(None);
        };

        let cert_pem = read(cert_path)?;
        let blocks = pem::parse_pem(&cert_pem)?;
        if !blocks.iter().any(pem::PemBlock::is_certificate) {
            return Err(KasError::Tls(format!(
                "no certificates found in {}",
                cert_path.display()
            )));
        }

        let key_pem = Zeroizing::new(read(key_path)?);
        let key_blocks = pem::parse_pem(&key_pem)?;
        if !key_blocks.iter().any(pem::PemBlock::is_private_key) {
            return Err(KasError::Tls(format!(
                "no private key found in {}",
                key_path.display()
            )));
        }

        let ca_certs = match existing(ca_path) {
            Some(ca_path) => {
                let certs: Vec<Vec<u8>> = pem::parse_pem(&read(ca_path)?)?
                    .into_iter()
                    .filter(pem::PemBlock::is_certificate)
                    .map(|block| block.contents)
                    .collect();
                if certs.is_empty() {
                    return Err(KasError::Tls(format!(
                        "no certificates found in {}",
                        ca_path.display()
                    )));
                }
                certs
            }
            None => Vec::new(),
        };

        let mut identity_pem = Zeroizing::new(Vec::with_capacity(key_pem.len() + cert_pem.len() + 1));
        identity_pem.extend_from_slice(&key_pem);
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&cert_pem);

        debug!(cert = %cert_path.display(), ca_certs = ca_certs.len(), "loaded mTLS client material");

        Ok(Some(Self {
            identity_pem,
            ca_certs,
            cert_path: cert_path.to_path_buf(),
        }))
    }

    /// Whether server certificates are verified against a CA bundle.
    pub fn verifies_server(&self) -> bool {
        !self.ca_certs.is_empty()
    }

    /// Installs the identity and trust settings on `builder`.
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder> {
        let identity =
            Identity::from_pem(&self.identity_pem).map_err(|e| KasError::Tls(e.to_string()))?;
        let mut builder = builder.use_rustls_tls().identity(identity);

        if self.verifies_server() {
            builder = builder.tls_built_in_root_certs(false);
            for der in &self.ca_certs {
                let cert = Certificate::from_der(der).map_err(|e| KasError::Tls(e.to_string()))?;
                builder = builder.add_root_certificate(cert);
            }
        } else {
            warn!(
                cert = %self.cert_path.display(),
                "no CA bundle configured, KAS server certificate will not be verified"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(builder)
    }
}

fn existing(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| p.exists())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| KasError::Tls(format!("failed to read {}: {e}", path.display())))
}
