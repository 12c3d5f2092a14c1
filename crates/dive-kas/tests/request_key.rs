//! Key-release requests against mock KAS nodes.

use std::time::Duration;

use chrono::Utc;
use dive_kas::{ExternalKasConfig, KasAuth, KasClient, KasError, KeyRequest, Secret};
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, header_exists, method, path,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key_request() -> KeyRequest {
    KeyRequest {
        resource_id: "doc-fvey-1".into(),
        kao_id: "kao-gbr".into(),
        wrapped_key: "d3JhcHBlZA==".into(),
        bearer_token: "user-token".into(),
        request_id: "req-42".into(),
        request_timestamp: Utc::now(),
    }
}

fn api_key_config(server: &MockServer) -> ExternalKasConfig {
    ExternalKasConfig::new(
        "gbr-kas",
        server.uri(),
        KasAuth::ApiKey {
            api_key: Secret::new("gbr-api-key"),
            api_key_header: None,
        },
    )
}

#[tokio::test]
async fn test_api_key_request_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .and(header("X-API-Key", "gbr-api-key"))
        .and(body_partial_json(json!({
            "resourceId": "doc-fvey-1",
            "kaoId": "kao-gbr",
            "wrappedKey": "d3JhcHBlZA==",
            "bearerToken": "user-token",
            "requestId": "req-42"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "unwrappedKey": "ZGVr",
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = KasClient::new([api_key_config(&server)], None).unwrap();
    let response = client.request_key("gbr-kas", &key_request()).await.unwrap();

    assert!(response.success);
    assert_eq!(response.unwrapped_key, "ZGVr");
}

#[tokio::test]
async fn test_custom_api_key_header_and_base_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kas/request-key"))
        .and(header("X-KAS-Token", "fra-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "unwrappedKey": "ZGVr",
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ExternalKasConfig::new(
        "fra-kas",
        format!("{}/kas", server.uri()),
        KasAuth::ApiKey {
            api_key: Secret::new("fra-key"),
            api_key_header: Some("X-KAS-Token".into()),
        },
    );
    let client = KasClient::new([config], None).unwrap();
    assert!(client.request_key("fra-kas", &key_request()).await.unwrap().success);
}

#[tokio::test]
async fn test_policy_denial_propagates_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .respond_with(ResponseTemplate::new(403).set_body_string("clearance insufficient"))
        .expect(1)
        .mount(&server)
        .await;

    let client = KasClient::new([api_key_config(&server)], None).unwrap();
    let err = client.request_key("gbr-kas", &key_request()).await.unwrap_err();

    assert!(err.is_policy_denial());
    match err {
        KasError::Http { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "clearance insufficient");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .respond_with(ResponseTemplate::new(500).set_body_string("hsm offline"))
        .expect(1)
        .mount(&server)
        .await;

    let client = KasClient::new([api_key_config(&server)], None).unwrap();
    let err = client.request_key("gbr-kas", &key_request()).await.unwrap_err();

    assert!(!err.is_policy_denial());
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_external().status, Some(500));
}

#[tokio::test]
async fn test_timeout_surfaces_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "unwrappedKey": "ZGVr", "success": true })),
        )
        .mount(&server)
        .await;

    let config = api_key_config(&server).with_timeout(Duration::from_millis(100));
    let client = KasClient::new([config], None).unwrap();
    let err = client.request_key("gbr-kas", &key_request()).await.unwrap_err();

    assert!(matches!(err, KasError::Timeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_jwt_auth_attaches_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "unwrappedKey": "ZGVr",
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ExternalKasConfig::new(
        "can-kas",
        server.uri(),
        KasAuth::Jwt {
            signing_secret: Secret::new("shared"),
            issuer: "dive-usa".into(),
            audience: "can-kas".into(),
            ttl_secs: 60,
        },
    );
    let client = KasClient::new([config], None).unwrap();
    assert!(client.request_key("can-kas", &key_request()).await.unwrap().success);
}

#[tokio::test]
async fn test_oauth2_fetches_token_then_calls_kas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=dive-usa"))
        .and(body_string_contains("client_secret=client-secret"))
        .and(body_string_contains("scope=kas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "svc-token",
            "token_type": "Bearer",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/request-key"))
        .and(header("authorization", "Bearer svc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "unwrappedKey": "ZGVr",
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ExternalKasConfig::new(
        "deu-kas",
        server.uri(),
        KasAuth::OAuth2 {
            token_url: format!("{}/oauth/token", server.uri()),
            client_id: "dive-usa".into(),
            client_secret: Secret::new("client-secret"),
            scope: Some("kas".into()),
        },
    );
    let client = KasClient::new([config], None).unwrap();
    assert!(client.request_key("deu-kas", &key_request()).await.unwrap().success);
}

#[tokio::test]
async fn test_oauth2_token_failure_is_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = ExternalKasConfig::new(
        "deu-kas",
        server.uri(),
        KasAuth::OAuth2 {
            token_url: format!("{}/oauth/token", server.uri()),
            client_id: "dive-usa".into(),
            client_secret: Secret::new("wrong"),
            scope: None,
        },
    );
    let client = KasClient::new([config], None).unwrap();
    let err = client.request_key("deu-kas", &key_request()).await.unwrap_err();
    assert!(matches!(err, KasError::Credential(_)));
}

#[tokio::test]
async fn test_unknown_kas_id() {
    let client = KasClient::new(Vec::new(), None).unwrap();
    let err = client.request_key("nope", &key_request()).await.unwrap_err();
    assert!(matches!(err, KasError::UnknownKas(id) if id == "nope"));
}

#[tokio::test]
async fn test_resolve_by_url_and_locality() {
    let server = MockServer::start().await;
    let client = KasClient::new(
        [api_key_config(&server)],
        Some("https://kas.usa.example".to_string()),
    )
    .unwrap();

    let by_url = client.resolve("unknown-id", &format!("{}/", server.uri()));
    assert_eq!(by_url.map(|c| c.kas_id.as_str()), Some("gbr-kas"));
    assert!(client.is_external_kas("https://kas.gbr.example"));
    assert!(!client.is_external_kas("https://kas.usa.example/request-key"));
}
