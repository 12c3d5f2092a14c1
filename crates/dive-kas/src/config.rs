//! Static configuration of external KAS nodes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Header used for API-key authentication when none is configured.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// A credential that is never printed.
///
/// Serializes as a placeholder so dumped configuration never leaks it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret value (sensitive).
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// How the client authenticates to one KAS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum KasAuth {
    /// Mutual TLS with a client certificate.
    ///
    /// When either the certificate or the key is absent the client falls back
    /// to plain TLS without client authentication. Server certificates are
    /// only verified when a CA bundle is supplied.
    Mtls {
        client_cert_path: Option<PathBuf>,
        client_key_path: Option<PathBuf>,
        #[serde(default)]
        ca_cert_path: Option<PathBuf>,
    },

    /// Static key sent in a header on every request.
    ApiKey {
        api_key: Secret,
        #[serde(default)]
        api_key_header: Option<String>,
    },

    /// HS256 service assertion minted per request.
    Jwt {
        signing_secret: Secret,
        issuer: String,
        audience: String,
        #[serde(default = "default_jwt_ttl_secs")]
        ttl_secs: u64,
    },

    /// OAuth2 client-credentials token fetched per request.
    OAuth2 {
        token_url: String,
        client_id: String,
        client_secret: Secret,
        #[serde(default)]
        scope: Option<String>,
    },
}

fn default_jwt_ttl_secs() -> u64 {
    300
}

impl KasAuth {
    /// Short method label for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Mtls { .. } => "mtls",
            Self::ApiKey { .. } => "apikey",
            Self::Jwt { .. } => "jwt",
            Self::OAuth2 { .. } => "oauth2",
        }
    }
}

/// One external KAS. Loaded once and never mutated at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalKasConfig {
    pub kas_id: String,
    pub kas_url: String,
    pub auth: KasAuth,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ExternalKasConfig {
    pub fn new(kas_id: impl Into<String>, kas_url: impl Into<String>, auth: KasAuth) -> Self {
        Self {
            kas_id: kas_id.into(),
            kas_url: kas_url.into(),
            auth,
            timeout_ms: default_timeout_ms(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_is_tagged_by_method() {
        let config: ExternalKasConfig = serde_json::from_value(serde_json::json!({
            "kas_id": "fra-kas",
            "kas_url": "https://kas.fra.example",
            "auth": { "method": "apikey", "api_key": "k-123" }
        }))
        .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(10));
        match &config.auth {
            KasAuth::ApiKey { api_key, api_key_header } => {
                assert_eq!(api_key.expose(), "k-123");
                assert!(api_key_header.is_none());
            }
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn test_oauth2_tag() {
        let auth: KasAuth = serde_json::from_value(serde_json::json!({
            "method": "oauth2",
            "token_url": "https://idp.example/token",
            "client_id": "dive",
            "client_secret": "s3cret"
        }))
        .unwrap();
        assert_eq!(auth.method(), "oauth2");
    }

    #[test]
    fn test_secrets_never_printed() {
        let auth = KasAuth::Jwt {
            signing_secret: Secret::new("hunter2"),
            issuer: "dive-usa".into(),
            audience: "gbr-kas".into(),
            ttl_secs: 60,
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
        assert!(!serde_json::to_string(&auth).unwrap().contains("hunter2"));
    }
}
