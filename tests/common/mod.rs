use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatrelay::config::UpstreamConfig;
use chatrelay::gateway::StreamHandler;
use chatrelay::OpenAiClient;

/// SSE body of an OpenAI streaming completion emitting `tokens`
#[allow(dead_code)]
pub fn openai_sse_body(tokens: &[&str]) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]})
    ));
    for token in tokens {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": token}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// SSE body made of raw `data:` payloads
#[allow(dead_code)]
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect()
}

#[allow(dead_code)]
pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Mount a streaming completion on `{prefix}/chat/completions`
#[allow(dead_code)]
pub async fn mount_completion(server: &MockServer, prefix: &str, tokens: &[&str]) {
    Mock::given(method("POST"))
        .and(path(format!("{}/chat/completions", prefix)))
        .respond_with(sse_response(openai_sse_body(tokens)))
        .mount(server)
        .await;
}

/// Mount a model listing on `{prefix}/models`
#[allow(dead_code)]
pub async fn mount_models(server: &MockServer, prefix: &str, ids: &[&str]) {
    let data: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "system"}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("{}/models", prefix)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data})))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn vendor_client() -> Arc<OpenAiClient> {
    Arc::new(OpenAiClient::new(&UpstreamConfig::default()).expect("client builds"))
}

#[allow(dead_code)]
pub fn temp_settings_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("failed to create tempdir");
    let path = dir.path().join("settings.json");
    (dir, path)
}

/// Address on which nothing is listening
#[allow(dead_code)]
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}/api", addr)
}

/// Records every stream callback in order
#[allow(dead_code)]
#[derive(Default, Clone)]
pub struct RecordingHandler {
    pub calls: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl StreamHandler for RecordingHandler {
    fn on_chunk(&mut self, chunk: &str) {
        self.calls.lock().unwrap().push(format!("chunk:{}", chunk));
    }

    fn on_done(&mut self) {
        self.calls.lock().unwrap().push("done".to_string());
    }

    fn on_error(&mut self, error: &anyhow::Error) {
        self.calls.lock().unwrap().push(format!("error:{}", error));
    }
}
