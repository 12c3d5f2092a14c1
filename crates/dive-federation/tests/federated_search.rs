//! Federated search against mock partner instances.

use dive_config::{DiveConfig, InstanceEntry};
use dive_federation::{FederatedQuery, FederationOrchestrator};
use dive_types::{Clearance, SubjectAttributes};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/api/resources/federated-search";

async fn partner(realm: &str, ids: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    let results: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "resourceId": id,
                "originRealm": realm,
                "classification": "SECRET",
                "releasabilityTo": ["USA", "GBR", "CAN"],
                "COI": ["FVEY"],
                "title": format!("{realm} {id}")
            })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header("X-Origin-Instance", "USA"))
        .and(body_partial_json(json!({ "classification": "SECRET", "limit": 25 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": results,
            "totalResults": ids.len()
        })))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn entry(code: &str, server: &MockServer) -> InstanceEntry {
    InstanceEntry {
        code: code.to_string(),
        name: None,
        api_url: server.uri(),
        enabled: true,
    }
}

fn subject() -> SubjectAttributes {
    SubjectAttributes::new("john.doe@army.mil", "SECRET", "USA")
        .with_coi(["FVEY"])
        .with_origin("USA")
}

#[tokio::test]
async fn test_one_unreachable_partner_of_three() {
    let gbr = partner("GBR", &["gbr-1", "gbr-2"]).await;
    let can = partner("CAN", &["can-1"]).await;
    let deu = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&deu)
        .await;

    let mut config = DiveConfig::default();
    config.federation.instances = vec![entry("GBR", &gbr), entry("CAN", &can), entry("DEU", &deu)];
    let orchestrator = FederationOrchestrator::from_config(&config).unwrap();

    let query = FederatedQuery::default()
        .with_classification(Clearance::Secret)
        .with_limit(25);
    let result = orchestrator
        .query_federated_resources(&query, &subject(), None, None)
        .await;

    assert_eq!(result.query_stats.instances_queried, 3);
    assert_eq!(result.query_stats.failed_queries.len(), 1);
    assert_eq!(result.query_stats.failed_queries[0].instance, "DEU");
    assert!(result.query_stats.failed_queries[0].error.contains("503"));
    assert_eq!(result.total_resources, 3);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.query_stats.instance_results["GBR"].result_count, 2);
    assert!(result.query_stats.instance_results["DEU"].error.is_some());

    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["queryStats"]["failedQueries"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["originRealm"], "GBR");
    assert_eq!(body["results"][0]["title"], "GBR gbr-1");
}

#[tokio::test]
async fn test_target_subset() {
    let gbr = partner("GBR", &["gbr-1"]).await;
    let can = MockServer::start().await;

    let mut config = DiveConfig::default();
    config.federation.instances = vec![entry("GBR", &gbr), entry("CAN", &can)];
    let orchestrator = FederationOrchestrator::from_config(&config).unwrap();

    let query = FederatedQuery::default()
        .with_classification(Clearance::Secret)
        .with_limit(25);
    let targets = vec!["GBR".to_string()];
    let result = orchestrator
        .query_federated_resources(&query, &subject(), Some(&targets), None)
        .await;

    assert_eq!(result.query_stats.instances_queried, 1);
    assert!(result.query_stats.failed_queries.is_empty());
    assert_eq!(result.federated_from, vec!["GBR"]);
    assert!(can.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_caller_deadline_cuts_off_slow_partner() {
    let gbr = partner("GBR", &["gbr-1"]).await;
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow)
        .await;

    let mut config = DiveConfig::default();
    config.federation.instances = vec![entry("GBR", &gbr), entry("FRA", &slow)];
    let orchestrator = FederationOrchestrator::from_config(&config).unwrap();

    let query = FederatedQuery::default()
        .with_classification(Clearance::Secret)
        .with_limit(25);
    let started = Instant::now();
    let result = orchestrator
        .query_federated_resources(&query, &subject(), None, Some(Duration::from_millis(300)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.federated_from, vec!["GBR"]);
    assert_eq!(result.total_resources, 1);
    assert_eq!(result.query_stats.failed_queries.len(), 1);
    assert_eq!(result.query_stats.failed_queries[0].instance, "FRA");
    assert_eq!(
        result.query_stats.failed_queries[0].error,
        "deadline of 300ms exceeded"
    );
}
