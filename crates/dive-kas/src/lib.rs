//! # dive-kas: Multi-KAS client
//!
//! Requests key-unwrap operations from Key Access Services run by partner
//! nations. Each KAS has its own static configuration and authentication
//! method:
//!
//! | Method   | Transport                                              |
//! |----------|--------------------------------------------------------|
//! | `mtls`   | client certificate, optional CA bundle                 |
//! | `apikey` | static header (`X-API-Key` unless configured)          |
//! | `jwt`    | HS256 service assertion as bearer token, per request   |
//! | `oauth2` | client-credentials access token as bearer, per request |
//!
//! All transports share a 10 second timeout and a `dive-kas/<version>`
//! user agent. The client never retries: unwrap requests are not safe to
//! repeat blindly against endpoints that may treat a duplicate as a replay.

mod client;
mod config;
mod error;
pub mod pem;
mod tls;

pub use client::{
    KasClient, KeyRequest, KeyResponse, REQUEST_KEY_PATH, USER_AGENT, create_client,
    is_external_kas, mint_service_jwt,
};
pub use config::{DEFAULT_API_KEY_HEADER, ExternalKasConfig, KasAuth, Secret};
pub use error::{KasError, Result};
pub use tls::ClientTls;
