//! HTTP contract tests: bind to an ephemeral port, drive the real router with
//! reqwest, scripted mock model behind the gateway, stub tool clients.

use std::sync::Arc;

use tokio::net::TcpListener;

use env_config::{BackendKind, Settings};
use topology_agent::gateway::backends::MockChat;
use topology_agent::gateway::storage::FileUsageStore;
use topology_agent::{Gateway, Resources};

const PLAN_ONLY_TOPOLOGY: &str = r#"{"strategy": "path", "steps": [
    {"id": "step_1", "tool": "topology_tool",
     "params": {"query_type": "path", "sites": ["Dallas", "Austin"]},
     "depends_on": []}
]}"#;

async fn spawn_server(responses: Vec<&str>) -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Arc::new(Settings {
        llm_backend: BackendKind::Mock,
        fallback_backend: BackendKind::Mock,
        usage_checkpoint_file: dir.path().join("usage.json").to_string_lossy().into_owned(),
        usage_call_log_file: dir.path().join("calls.jsonl").to_string_lossy().into_owned(),
        ..Settings::default()
    });
    let store = Arc::new(FileUsageStore::new(
        settings.usage_checkpoint_file.clone(),
        settings.usage_call_log_file.clone(),
    ));
    let mock = Arc::new(MockChat::with_sequence(
        responses.into_iter().map(str::to_string).collect(),
    ));
    let gateway = Arc::new(Gateway::new(settings.clone(), store).with_mock_backend(mock));
    let resources = Resources::init_with_gateway(settings, gateway)
        .await
        .expect("resources");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = serve::run_serve_on_listener(listener, resources).await;
    });
    (format!("http://{}", addr), dir)
}

#[tokio::test]
async fn health_endpoint_is_ok() {
    let (base, _dir) = spawn_server(vec!["{}"]).await;
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn ready_reports_disabled_dependencies() {
    let (base, _dir) = spawn_server(vec!["{}"]).await;
    let body: serde_json::Value = reqwest::get(format!("{}/ready", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "disabled");
    assert_eq!(body["graph"], "disabled");
    assert_eq!(body["redis"], "disabled");
}

#[tokio::test]
async fn version_reports_build_metadata() {
    let (base, _dir) = spawn_server(vec!["{}"]).await;
    let body: serde_json::Value = reqwest::get(format!("{}/version", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["app_name"], "Topology Agent Service");
    assert_eq!(body["env"], "dev");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn topology_query_returns_structured_response() {
    let (base, _dir) = spawn_server(vec![
        PLAN_ONLY_TOPOLOGY,
        "No live topology data is configured; returning an empty view.",
    ])
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/topology/query", base))
        .json(&serde_json::json!({
            "query": "Show me the path from Dallas to Austin",
            "ui_context": {"selected_sites": ["Dallas", "Austin"], "layer": "L2"}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    // Stub tool clients: empty data, but a well-formed, non-partial response.
    assert_eq!(body["view_type"], "circuit_view");
    assert_eq!(body["summary"]["total_circuits"], 0);
    assert_eq!(body["partial"], false);
    assert!(!body["request_id"].as_str().unwrap().is_empty());
    assert_eq!(
        body["natural_language_summary"],
        "No live topology data is configured; returning an empty view."
    );
}

#[tokio::test]
async fn request_id_header_is_honored_and_echoed() {
    let (base, _dir) = spawn_server(vec![
        PLAN_ONLY_TOPOLOGY,
        "Echo test summary.",
    ])
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/topology/query", base))
        .header("X-Request-ID", "corr-12345")
        .json(&serde_json::json!({ "query": "anything" }))
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "corr-12345"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["request_id"], "corr-12345");
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let (base, _dir) = spawn_server(vec!["{}"]).await;
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    let echoed = response.headers().get("x-request-id").unwrap();
    assert!(!echoed.to_str().unwrap().is_empty());
}

#[tokio::test]
async fn metrics_expose_http_counters() {
    let (base, _dir) = spawn_server(vec![
        PLAN_ONLY_TOPOLOGY,
        "Metrics test summary.",
    ])
    .await;

    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/topology/query", base))
        .json(&serde_json::json!({ "query": "metrics probe" }))
        .send()
        .await
        .unwrap();

    let text = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("topology_api_requests_total"));
    assert!(text.contains("topology_node_invocations_total"));
}
