use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vendo::catalog::{Catalog, InventoryItem};
use vendo::config::{BackendKind, Config};
use vendo::web_server::build_router;

fn test_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(vec![InventoryItem {
            brand: "Toyota".to_string(),
            model: "Sedan XYZ".to_string(),
            year: None,
            price: "20,000 USD".to_string(),
            speed: None,
            engine: None,
            features: Some(vec!["Bluetooth".to_string()]),
        }])
        .unwrap(),
    )
}

fn generate_config(endpoint: &str, dir: &TempDir) -> Arc<Config> {
    Arc::new(Config {
        backend: BackendKind::Generate,
        endpoint: endpoint.to_string(),
        model: "test-model".to_string(),
        api_key: None,
        catalog_path: "catalog.json".into(),
        log_path: dir.path().join("interactions.csv"),
    })
}

#[tokio::test]
async fn index_renders_chat_page() {
    let dir = TempDir::new().unwrap();
    let config = generate_config("http://127.0.0.1:1", &dir);
    let server = TestServer::new(build_router(config, test_catalog()).unwrap()).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("Marconi Motors"));
    assert!(body.contains("/static/app.js"));
}

#[tokio::test]
async fn static_assets_are_served() {
    let dir = TempDir::new().unwrap();
    let config = generate_config("http://127.0.0.1:1", &dir);
    let server = TestServer::new(build_router(config, test_catalog()).unwrap()).unwrap();

    let response = server.get("/static/style.css").await;
    response.assert_status_ok();
    assert!(response.text().contains(".bubble"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = generate_config("http://127.0.0.1:1", &dir);
    let server = TestServer::new(build_router(config, test_catalog()).unwrap()).unwrap();

    let response = server.get("/nope").await;
    response.assert_status_not_found();
}

// WebSockets need a real HTTP transport rather than the default mock one.
fn websocket_server(config: Arc<Config>) -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(build_router(config, test_catalog()).unwrap())
        .unwrap()
}

#[tokio::test]
async fn websocket_turn_streams_session_start_chunks_end() {
    let mock = MockServer::start().await;
    let stream_body = concat!(
        r#"{"response":"Glad"}"#,
        "\n",
        r#"{"response":" to help","done":true,"context":[1]}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(stream_body, "application/x-ndjson"))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "excitement Openness",
            "done": true
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let config = generate_config(&mock.uri(), &dir);
    let log_path = config.log_path.clone();
    let server = websocket_server(config);

    let mut websocket = server.get_websocket("/ws").await.into_websocket().await;

    // The canned greeting arrives before any turn.
    let hello: Value = websocket.receive_json().await;
    assert_eq!(hello["type"], "session");
    assert!(hello["greeting"].as_str().unwrap().contains("Marconi Motors"));

    // Empty submissions are dropped server-side: no frames for this one.
    websocket
        .send_json(&json!({"type": "chat", "text": "   "}))
        .await;
    websocket
        .send_json(&json!({"type": "chat", "text": "I need a car"}))
        .await;

    let start: Value = websocket.receive_json().await;
    assert_eq!(start["type"], "start");

    let mut streamed = String::new();
    let full_reply = loop {
        let frame: Value = websocket.receive_json().await;
        match frame["type"].as_str().unwrap() {
            "chunk" => streamed.push_str(frame["text"].as_str().unwrap()),
            "end" => break frame["text"].as_str().unwrap().to_string(),
            other => panic!("unexpected frame type {other}"),
        }
    };
    assert_eq!(streamed, "Glad to help");
    assert_eq!(full_reply, "Glad to help");

    // The turn was classified and logged before the end frame was sent.
    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",I need a car,excitement,Openness"));
}

#[tokio::test]
async fn websocket_turn_reports_backend_failure_in_band() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let config = generate_config(&mock.uri(), &dir);
    let log_path = config.log_path.clone();
    let server = websocket_server(config);

    let mut websocket = server.get_websocket("/ws").await.into_websocket().await;

    let hello: Value = websocket.receive_json().await;
    assert_eq!(hello["type"], "session");

    websocket
        .send_json(&json!({"type": "chat", "text": "hello?"}))
        .await;

    let start: Value = websocket.receive_json().await;
    assert_eq!(start["type"], "start");

    let error: Value = websocket.receive_json().await;
    assert_eq!(error["type"], "error");
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("completion call failed"));

    // A failed turn logs nothing, and the session survives for another try.
    assert!(!log_path.exists());
    websocket
        .send_json(&json!({"type": "chat", "text": "still there?"}))
        .await;
    let next: Value = websocket.receive_json().await;
    assert_eq!(next["type"], "start");
}
