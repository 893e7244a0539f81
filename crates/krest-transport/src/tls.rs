//! Per-request TLS settings.

use crate::error::{Result, TransportError};

/// TLS settings applied to a dedicated connection pool.
///
/// Requests carrying a `TlsConfig` do not share connections with requests
/// using the transport defaults.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Extra trusted roots, PEM encoded.
    pub root_certificates: Vec<Vec<u8>>,

    /// Client certificate and private key, concatenated in one PEM buffer.
    pub identity: Option<Vec<u8>>,

    /// Skip server certificate verification.
    pub accept_invalid_certs: bool,

    /// Trust only `root_certificates`, ignoring the bundled webpki roots.
    pub disable_built_in_roots: bool,
}

impl TlsConfig {
    /// Trust an additional root certificate.
    pub fn with_root_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(pem.into());
        self
    }

    /// Present a client certificate.
    pub fn with_identity(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(pem.into());
        self
    }

    /// Disable certificate verification. Only for tests against self-signed
    /// servers.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub(crate) fn apply(&self, mut builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        for pem in &self.root_certificates {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| TransportError::Tls(format!("invalid root certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(pem) = &self.identity {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| TransportError::Tls(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }

        Ok(builder
            .tls_built_in_root_certs(!self.disable_built_in_roots)
            .danger_accept_invalid_certs(self.accept_invalid_certs))
    }
}
