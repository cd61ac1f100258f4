#![allow(dead_code)]

use std::time::Duration;
use teachkit_stream::{ClientConfig, GenerationClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Load test fixture from file
pub fn load_fixture(filename: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{filename}"))
        .unwrap_or_else(|_| panic!("Failed to load test fixture: {filename}"))
}

/// Client pointed at the mock server, with a short debounce.
pub fn client_for(server: &MockServer) -> GenerationClient {
    let config = ClientConfig::new(server.uri())
        .with_timeout(Duration::from_secs(5))
        .with_debounce(Duration::from_millis(20));
    GenerationClient::new(config).expect("Failed to create client")
}

/// Serve an SSE fixture from `POST {route}`.
pub async fn mount_stream(server: &MockServer, route: &str, fixture: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(load_fixture(fixture)),
        )
        .mount(server)
        .await;
}

/// Accept saves on `POST {route}` and answer with the given id.
pub async fn mount_save(server: &MockServer, route: &str, id: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": { "_id": id }
        })))
        .mount(server)
        .await;
}

/// Install a test subscriber once; honors RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
