//! HTTP client for external KAS nodes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DEFAULT_API_KEY_HEADER, ExternalKasConfig, KasAuth};
use crate::error::{KasError, Result};
use crate::tls::ClientTls;

/// `User-Agent` sent to every KAS.
pub const USER_AGENT: &str = concat!("dive-kas/", env!("CARGO_PKG_VERSION"));

/// Path of the key-release endpoint, relative to the KAS base URL.
pub const REQUEST_KEY_PATH: &str = "request-key";

// ============================================================================
// Wire types
// ============================================================================

/// Body of `POST <kasUrl>/request-key`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub resource_id: String,
    pub kao_id: String,
    pub wrapped_key: String,
    /// The end user's token, forwarded so the remote KAS can re-evaluate.
    pub bearer_token: String,
    pub request_id: String,
    pub request_timestamp: DateTime<Utc>,
}

impl fmt::Debug for KeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRequest")
            .field("resource_id", &self.resource_id)
            .field("kao_id", &self.kao_id)
            .field("request_id", &self.request_id)
            .field("request_timestamp", &self.request_timestamp)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    /// Base64 DEK.
    #[serde(default)]
    pub unwrapped_key: String,
    pub success: bool,
}

impl fmt::Debug for KeyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResponse")
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ServiceClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

// ============================================================================
// Transport construction
// ============================================================================

/// Builds the HTTP client for one KAS.
///
/// * mTLS installs the client identity when both certificate and key exist.
/// * API key installs a static header.
/// * JWT and OAuth2 add nothing here; the bearer token is attached per
///   request.
pub fn create_client(config: &ExternalKasConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(USER_AGENT);

    match &config.auth {
        KasAuth::Mtls {
            client_cert_path,
            client_key_path,
            ca_cert_path,
        } => {
            let tls = ClientTls::load(
                client_cert_path.as_deref(),
                client_key_path.as_deref(),
                ca_cert_path.as_deref(),
            )?;
            if let Some(tls) = tls {
                builder = tls.apply(builder)?;
            }
        }
        KasAuth::ApiKey {
            api_key,
            api_key_header,
        } => {
            let name = api_key_header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER);
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| KasError::Client(format!("invalid API key header '{name}': {e}")))?;
            let mut value = HeaderValue::from_str(api_key.expose())
                .map_err(|_| KasError::Client("API key is not a valid header value".into()))?;
            value.set_sensitive(true);

            let mut headers = HeaderMap::new();
            headers.insert(name, value);
            builder = builder.default_headers(headers);
        }
        KasAuth::Jwt { .. } | KasAuth::OAuth2 { .. } => {}
    }

    builder.build().map_err(|e| KasError::Client(e.to_string()))
}

/// Mints the HS256 service assertion for JWT-authenticated KAS nodes.
pub fn mint_service_jwt(config: &ExternalKasConfig) -> Result<Option<String>> {
    let KasAuth::Jwt {
        signing_secret,
        issuer,
        audience,
        ttl_secs,
    } = &config.auth
    else {
        return Ok(None);
    };

    let now = Utc::now().timestamp();
    let claims = ServiceClaims {
        iss: issuer,
        aud: audience,
        sub: &config.kas_id,
        iat: now,
        exp: now + i64::try_from(*ttl_secs).unwrap_or(i64::MAX / 2),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_secret.expose().as_bytes()),
    )
    .map(Some)
    .map_err(|e| KasError::Credential(e.to_string()))
}

// ============================================================================
// Locality
// ============================================================================

/// Whether `kas_url` names a KAS outside this instance.
///
/// The host is compared case-insensitively with the local KAS host and with
/// the in-cluster names `kas` and `localhost`.
///
/// Unparseable input splits on the presence of a scheme: without `://` it is
/// treated as external; with one it is treated as internal.
pub fn is_external_kas(kas_url: &str, local_kas_url: Option<&str>) -> bool {
    let parsed = match Url::parse(kas_url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return !kas_url.contains("://"),
    };

    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return true;
    };

    if host == "kas" || host == "localhost" {
        return false;
    }

    let local_host = local_kas_url
        .and_then(|url| Url::parse(url.trim()).ok())
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

    local_host.as_deref() != Some(host.as_str())
}

// ============================================================================
// Client
// ============================================================================

struct KasEndpoint {
    config: ExternalKasConfig,
    http: reqwest::Client,
    request_key_url: Url,
}

/// Client for the configured set of external KAS nodes.
///
/// Transports are built once at construction; configuration is never changed
/// afterwards.
pub struct KasClient {
    endpoints: HashMap<String, KasEndpoint>,
    local_kas_url: Option<String>,
    /// Used for OAuth2 token fetches.
    token_http: reqwest::Client,
}

impl fmt::Debug for KasClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.endpoints.keys().collect();
        ids.sort();
        f.debug_struct("KasClient")
            .field("kas_ids", &ids)
            .field("local_kas_url", &self.local_kas_url)
            .finish()
    }
}

impl KasClient {
    pub fn new(
        configs: impl IntoIterator<Item = ExternalKasConfig>,
        local_kas_url: Option<String>,
    ) -> Result<Self> {
        let mut endpoints = HashMap::new();
        for config in configs {
            let http = create_client(&config)?;
            let request_key_url = request_key_url(&config.kas_url)?;
            info!(
                kas_id = %config.kas_id,
                kas_url = %config.kas_url,
                auth = config.auth.method(),
                "registered external KAS"
            );
            endpoints.insert(
                config.kas_id.clone(),
                KasEndpoint {
                    config,
                    http,
                    request_key_url,
                },
            );
        }

        let token_http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| KasError::Client(e.to_string()))?;

        Ok(Self {
            endpoints,
            local_kas_url,
            token_http,
        })
    }

    pub fn local_kas_url(&self) -> Option<&str> {
        self.local_kas_url.as_deref()
    }

    pub fn is_external_kas(&self, kas_url: &str) -> bool {
        is_external_kas(kas_url, self.local_kas_url.as_deref())
    }

    pub fn config(&self, kas_id: &str) -> Option<&ExternalKasConfig> {
        self.endpoints.get(kas_id).map(|e| &e.config)
    }

    /// Finds the configuration for a KAO: by `kas_id`, else by matching URL.
    pub fn resolve(&self, kas_id: &str, kas_url: &str) -> Option<&ExternalKasConfig> {
        self.config(kas_id).or_else(|| {
            let wanted = kas_url.trim_end_matches('/');
            self.endpoints
                .values()
                .map(|e| &e.config)
                .find(|c| c.kas_url.trim_end_matches('/') == wanted)
        })
    }

    pub fn kas_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Asks `kas_id` to unwrap a key.
    ///
    /// Network errors, timeouts and non-2xx responses are returned unchanged.
    /// The request is sent exactly once.
    pub async fn request_key(&self, kas_id: &str, request: &KeyRequest) -> Result<KeyResponse> {
        let endpoint = self
            .endpoints
            .get(kas_id)
            .ok_or_else(|| KasError::UnknownKas(kas_id.to_string()))?;
        let config = &endpoint.config;

        let mut http_request = endpoint
            .http
            .post(endpoint.request_key_url.clone())
            .json(request);
        if let Some(token) = self.service_token(config).await? {
            http_request = http_request.bearer_auth(token);
        }

        debug!(
            kas_id = %kas_id,
            resource_id = %request.resource_id,
            kao_id = %request.kao_id,
            request_id = %request.request_id,
            "requesting key from external KAS"
        );

        let response = http_request
            .send()
            .await
            .map_err(|e| transport_error(config, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                kas_id = %kas_id,
                status = status.as_u16(),
                resource_id = %request.resource_id,
                "external KAS refused key request"
            );
            return Err(KasError::Http {
                kas_id: kas_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: KeyResponse = response
            .json()
            .await
            .map_err(|e| KasError::InvalidResponse {
                kas_id: kas_id.to_string(),
                message: e.to_string(),
            })?;

        info!(
            kas_id = %kas_id,
            resource_id = %request.resource_id,
            success = parsed.success,
            "external KAS answered key request"
        );
        Ok(parsed)
    }

    /// The bearer token for JWT or OAuth2 KAS nodes.
    async fn service_token(&self, config: &ExternalKasConfig) -> Result<Option<String>> {
        match &config.auth {
            KasAuth::Jwt { .. } => mint_service_jwt(config),
            KasAuth::OAuth2 {
                token_url,
                client_id,
                client_secret,
                scope,
            } => {
                // Borrowed so the secret is only ever copied into the
                // encoded request body.
                let mut params: Vec<(&str, &str)> = vec![
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose()),
                ];
                if let Some(scope) = scope {
                    params.push(("scope", scope.as_str()));
                }

                let response = self
                    .token_http
                    .post(token_url)
                    .timeout(config.timeout())
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| KasError::Credential(format!("token request failed: {e}")))?;

                if !response.status().is_success() {
                    return Err(KasError::Credential(format!(
                        "token endpoint returned {}",
                        response.status().as_u16()
                    )));
                }

                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| KasError::Credential(format!("invalid token response: {e}")))?;
                Ok(Some(token.access_token))
            }
            KasAuth::Mtls { .. } | KasAuth::ApiKey { .. } => Ok(None),
        }
    }
}

fn request_key_url(kas_url: &str) -> Result<Url> {
    let invalid = |message: String| KasError::InvalidUrl {
        url: kas_url.to_string(),
        message,
    };

    let mut base = Url::parse(kas_url).map_err(|e| invalid(e.to_string()))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(REQUEST_KEY_PATH).map_err(|e| invalid(e.to_string()))
}

fn transport_error(config: &ExternalKasConfig, error: reqwest::Error) -> KasError {
    if error.is_timeout() {
        warn!(kas_id = %config.kas_id, timeout_ms = config.timeout_ms, "external KAS timed out");
        KasError::Timeout {
            kas_id: config.kas_id.clone(),
            timeout: config.timeout(),
        }
    } else {
        warn!(kas_id = %config.kas_id, error = %error, "external KAS unreachable");
        KasError::Network {
            kas_id: config.kas_id.clone(),
            source: error,
        }
    }
}
