// ABOUTME: End-to-end smoke tests for the alert ledger lifecycle.
// ABOUTME: Covers append/list over the in-memory store and conflict retry against a mock content host.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use phoenix_core::codec::decode;
use phoenix_core::record::{Record, Severity};
use phoenix_store::{AlertLedger, GithubConfig, GithubStore, MemoryStore};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scenario_record() -> Record {
    Record {
        location: "Northern Valley, CA".to_string(),
        severity: Severity::High,
        description: "Smoke visible near town, evacuation advised".to_string(),
        contact_info: None,
        timestamp: "2024-01-15T10:00:00Z".to_string(),
        status: "pending".to_string(),
        verified: false,
    }
}

#[tokio::test]
async fn smoke_test_full_lifecycle() {
    // 1. Empty store: listing a missing document is not an error
    let store = Arc::new(MemoryStore::new());
    let ledger = AlertLedger::new(store.clone(), "data/alerts.csv");
    assert!(ledger.list().await.unwrap().is_empty());

    // 2. Append the first alert, which creates the document
    let record = scenario_record();
    ledger.append(record.clone()).await.unwrap();

    // 3. The stored document's second line decodes back to the record
    let content = store.content("data/alerts.csv").await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let single_row = format!("{}\n{}\n", lines[0], lines[1]);
    let decoded = decode(&single_row);
    assert_eq!(decoded.records, vec![record.clone()]);
    assert!(decoded.records[0].contact_info.is_none());
    assert!(!decoded.records[0].verified);

    // 4. A second alert is appended after the first
    let second = Record::new(
        "Lake Shore".to_string(),
        Severity::Critical,
        "Fire front crossed \"Route 9\", roads closed".to_string(),
    )
    .with_contact_info("dispatch@example.org");
    ledger.append(second.clone()).await.unwrap();

    let all = ledger.list().await.unwrap();
    assert_eq!(all, vec![record, second]);

    // 5. Location lookup finds only the matching alert
    let hits = ledger.find_by_location("lake").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].severity, Severity::Critical);
}

#[tokio::test]
async fn smoke_test_conflict_retry_against_content_host() {
    let server = MockServer::start().await;
    let contents = "/repos/relief/alerts/contents/data/alerts.csv";
    let existing = "location,severity,description,contactinfo,timestamp,status,verified\n";

    // First read sees sha s1; the retry sees s2 after another writer won.
    Mock::given(method("GET"))
        .and(path(contents))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": STANDARD.encode(existing),
            "encoding": "base64",
            "sha": "s1"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(contents))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": STANDARD.encode(existing),
            "encoding": "base64",
            "sha": "s2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(contents))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "sha does not match"})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(contents))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "s3"}})))
        .mount(&server)
        .await;

    let config = GithubConfig {
        base_url: server.uri(),
        owner: "relief".to_string(),
        repo: "alerts".to_string(),
        branch: "main".to_string(),
        token: Some("test-token".to_string()),
    };
    let store = GithubStore::new(config, Duration::from_secs(5)).unwrap();
    let ledger = AlertLedger::new(Arc::new(store), "data/alerts.csv");

    ledger.append(scenario_record()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let puts: Vec<Value> = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    let gets = requests.iter().filter(|r| r.method.as_str() == "GET").count();

    assert_eq!(gets, 2, "each attempt must re-read the document");
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0]["sha"], "s1");
    assert_eq!(puts[1]["sha"], "s2");

    let written = STANDARD
        .decode(puts[1]["content"].as_str().unwrap())
        .unwrap();
    let decoded = decode(std::str::from_utf8(&written).unwrap());
    assert_eq!(decoded.records, vec![scenario_record()]);
}
