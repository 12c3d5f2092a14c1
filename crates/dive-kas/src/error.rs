//! KAS client error types.

use std::time::Duration;

use dive_types::ExternalServiceError;
use thiserror::Error;

use crate::pem::PemError;

/// Result type for KAS client operations.
pub type Result<T> = std::result::Result<T, KasError>;

/// Errors from building a KAS transport or requesting a key.
///
/// Remote failures are surfaced unchanged; nothing at this layer retries.
#[derive(Debug, Error)]
pub enum KasError {
    /// The KAS answered with a non-2xx status.
    #[error("KAS {kas_id} returned {status}: {body}")]
    Http {
        kas_id: String,
        status: u16,
        body: String,
    },

    #[error("KAS {kas_id} did not answer within {timeout:?}")]
    Timeout { kas_id: String, timeout: Duration },

    #[error("network error talking to KAS {kas_id}: {source}")]
    Network {
        kas_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("KAS {kas_id} sent an invalid response: {message}")]
    InvalidResponse { kas_id: String, message: String },

    #[error("invalid KAS URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("no external KAS configured for {0}")]
    UnknownKas(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("PEM error: {0}")]
    Pem(#[from] PemError),

    #[error("failed to obtain service credential: {0}")]
    Credential(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl KasError {
    /// True when the KAS refused on policy grounds (401/403).
    pub fn is_policy_denial(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Converts into the shared external-service fault shape.
    pub fn to_external(&self) -> ExternalServiceError {
        let service = match self {
            Self::Http { kas_id, .. }
            | Self::Timeout { kas_id, .. }
            | Self::Network { kas_id, .. }
            | Self::InvalidResponse { kas_id, .. } => format!("kas:{kas_id}"),
            _ => "kas".to_string(),
        };
        ExternalServiceError::new(service, self.status(), self.to_string())
    }
}
