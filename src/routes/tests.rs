use std::io;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::relay::Relay;
use crate::AppState;

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.5-flash-lite:generateContent";
const GEMINI_FAST_PATH: &str = "/v1beta/models/gemini-2.0-flash-lite:generateContent";
const GEMINI_STREAM_PATH: &str = "/v1beta/models/gemini-2.0-flash-lite:streamGenerateContent";
const OPENAI_PATH: &str = "/v1/chat/completions";
const ANTHROPIC_PATH: &str = "/v1/messages";

/// Serve the full router on a loopback port and return its base URL.
async fn spawn_app(config: &Config) -> String {
    let http = reqwest::Client::new();
    let state = AppState {
        relay: Arc::new(Relay::from_config(config, &http).unwrap()),
        started_at: Instant::now(),
    };
    let app = super::router(state, config.cors_origins().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn gemini_body(text: &str) -> String {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
}

fn openai_body(text: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] }).to_string()
}

async fn failing_mock(server: &mut ServerGuard, path: &str, status: usize) -> Mock {
    server
        .mock("POST", path)
        .with_status(status)
        .with_body(r#"{"error":"upstream down"}"#)
        .create_async()
        .await
}

async fn post(url: String, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn humanize_falls_back_to_openai() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut server = Server::new_async().await;
    let gemini = failing_mock(&mut server, GEMINI_PATH, 500).await;
    let openai = server
        .mock("POST", OPENAI_PATH)
        .match_header("authorization", "Bearer test-openai-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(openai_body(
            r#"{"original_text":"x","humanized_text":"Use this approach.","style_applied":"CASUAL","length_change":"PRESERVE","confidence_score":0.91,"changes_made":["Replaced jargon"]}"#,
        ))
        .create_async()
        .await;
    let anthropic = server
        .mock("POST", ANTHROPIC_PATH)
        .expect(0)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize", base),
        json!({ "text": "Utilize the aforementioned approach.", "style": "CASUAL" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["humanized_text"], "Use this approach.");
    assert_eq!(body["data"]["original_text"], "Utilize the aforementioned approach.");
    assert_eq!(body["data"]["style_applied"], "CASUAL");
    assert_eq!(body["data"]["length_change"], "PRESERVE");
    assert_eq!(body["data"]["confidence_score"], 0.91);

    gemini.assert_async().await;
    openai.assert_async().await;
    anthropic.assert_async().await;
    assert!(logs.contents().contains("Gemini failed, trying OpenAI fallback"));
}

#[tokio::test]
async fn humanize_falls_back_to_anthropic() {
    let mut server = Server::new_async().await;
    let gemini = failing_mock(&mut server, GEMINI_PATH, 500).await;
    let openai = failing_mock(&mut server, OPENAI_PATH, 429).await;
    let anthropic = server
        .mock("POST", ANTHROPIC_PATH)
        .match_header("x-api-key", "test-anthropic-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::Regex("valid JSON only".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "content": [{
                "type": "text",
                "text": r#"{"humanized_text":"Try this way instead.","confidence_score":0.7,"changes_made":["Simplified wording"]}"#,
            }] })
            .to_string(),
        )
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize", base),
        json!({ "text": "Kindly utilize the alternative methodology.", "style": "CASUAL" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["humanized_text"], "Try this way instead.");
    assert_eq!(body["data"]["confidence_score"], 0.7);
    assert_eq!(body["data"]["changes_made"], json!(["Simplified wording"]));

    gemini.assert_async().await;
    openai.assert_async().await;
    anthropic.assert_async().await;
}

#[tokio::test]
async fn humanize_reports_last_error_when_every_provider_fails() {
    let mut server = Server::new_async().await;
    failing_mock(&mut server, GEMINI_PATH, 500).await;
    failing_mock(&mut server, OPENAI_PATH, 429).await;
    failing_mock(&mut server, ANTHROPIC_PATH, 503).await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(format!("{}/humanize", base), json!({ "text": "Hello there" })).await;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to humanize text");
    assert_eq!(body["message"], "Anthropic API error: 503 Service Unavailable");
}

#[tokio::test]
async fn oversized_text_is_rejected_before_any_provider_call() {
    let mut server = Server::new_async().await;
    let gemini = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize", base),
        json!({ "text": "a".repeat(10_001) }),
    )
    .await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid request data");
    assert_eq!(body["details"][0]["field"], "text");
    gemini.assert_async().await;
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let server = Server::new_async().await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize", base),
        json!({ "text": "Hello", "style": "SARCASTIC" }),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["details"][0]["field"], "body");

    let response = reqwest::Client::new()
        .post(format!("{}/humanize", base))
        .header("content-type", "application/json")
        .body("{\"text\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn quick_humanize_uses_fast_model() {
    let mut server = Server::new_async().await;
    let gemini = server
        .mock("POST", GEMINI_FAST_PATH)
        .match_header("x-goog-api-key", "test-google-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_body("  Hey world!\n"))
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize/quick", base),
        json!({ "text": "Hello world", "style": "CASUAL" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": {
                "original_text": "Hello world",
                "humanized_text": "Hey world!",
                "style_applied": "CASUAL",
            }
        })
    );
    gemini.assert_async().await;
}

#[tokio::test]
async fn quick_humanize_does_not_fall_back() {
    let mut server = Server::new_async().await;
    failing_mock(&mut server, GEMINI_FAST_PATH, 500).await;
    let openai = server
        .mock("POST", OPENAI_PATH)
        .expect(0)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize/quick", base),
        json!({ "text": "Hello world" }),
    )
    .await;

    assert_eq!(response.status(), 500);
    openai.assert_async().await;
}

#[tokio::test]
async fn stream_emits_started_partials_and_completed() {
    let mut server = Server::new_async().await;
    let sse_body = format!(
        "data: {}\n\ndata: {}\n\n",
        json!({ "candidates": [{ "content": { "parts": [{ "text": "Hey" }] } }] }),
        json!({ "candidates": [{ "content": { "parts": [{ "text": " there" }] }, "finishReason": "STOP" }] }),
    );
    let gemini = server
        .mock("POST", GEMINI_STREAM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize/stream", base),
        json!({ "text": "Hello there", "style": "CASUAL" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let text = response.text().await.unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 4);
    assert_eq!(events[0], json!({ "started": true }));
    assert_eq!(events[1]["partial"], true);
    assert_eq!(events[1]["data"]["humanized_text"], "Hey");
    assert_eq!(events[2]["data"]["humanized_text"], "Hey there");
    assert_eq!(events[2]["data"]["original_text"], "Hello there");
    assert_eq!(events[2]["data"]["confidence_score"], 0.8);
    assert_eq!(events[3], json!({ "success": true, "completed": true }));
    gemini.assert_async().await;
}

#[tokio::test]
async fn stream_falls_back_to_anthropic_until_message_stop() {
    let mut server = Server::new_async().await;
    let gemini = server
        .mock("POST", GEMINI_STREAM_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    let openai = failing_mock(&mut server, OPENAI_PATH, 500).await;
    let sse_body = format!(
        "event: message_start\ndata: {}\n\nevent: content_block_delta\ndata: {}\n\nevent: content_block_delta\ndata: {}\n\nevent: message_stop\ndata: {}\n\n",
        json!({ "type": "message_start", "message": {} }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "{\"humanized_text\":\"Hi" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": " there\"}" } }),
        json!({ "type": "message_stop" }),
    );
    let anthropic = server
        .mock("POST", ANTHROPIC_PATH)
        .match_header("x-api-key", "test-anthropic-key")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize/stream", base),
        json!({ "text": "Hello there" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 4);
    assert_eq!(events[0], json!({ "started": true }));
    assert_eq!(events[1]["data"]["humanized_text"], "Hi");
    assert_eq!(events[2]["data"]["humanized_text"], "Hi there");
    assert_eq!(events[3], json!({ "success": true, "completed": true }));
    gemini.assert_async().await;
    openai.assert_async().await;
    anthropic.assert_async().await;
}

#[tokio::test]
async fn stream_reports_failure_as_final_event() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", Matcher::Any)
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(
        format!("{}/humanize/stream", base),
        json!({ "text": "Hello there" }),
    )
    .await;

    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], json!({ "started": true }));
    assert_eq!(events[1]["success"], false);
    assert_eq!(events[1]["error"], "Failed to humanize text");
}

#[tokio::test]
async fn stream_validates_before_streaming() {
    let server = Server::new_async().await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let response = post(format!("{}/humanize/stream", base), json!({ "text": "" })).await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["details"][0]["message"], "Text is required");
}

#[tokio::test]
async fn styles_catalog() {
    let server = Server::new_async().await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let body: Value = reqwest::get(format!("{}/humanize/styles", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["styles"].as_array().unwrap().len(), 6);
    assert_eq!(
        body["data"]["styles"][0],
        json!({ "value": "CASUAL", "label": "Casual", "description": "Conversational and relaxed tone" })
    );
    assert_eq!(body["data"]["length_options"][2]["value"], "CONDENSE");
}

#[tokio::test]
async fn health_endpoints_report_provider_keys() {
    let server = Server::new_async().await;
    let config = Config {
        openai_api_key: String::new(),
        ..Config::for_mock(&server.url())
    };
    let base = spawn_app(&config).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Humanization Relay");
    assert!(body.get("checks").is_none());

    let response = reqwest::get(format!("{}/health/detailed", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(
        body["checks"]["providers"],
        json!({ "anthropic": "configured", "gemini": "configured", "openai": "missing" })
    );
}

#[tokio::test]
async fn detailed_health_is_unavailable_without_keys() {
    let base = spawn_app(&Config::default()).await;

    let response = reqwest::get(format!("{}/health/detailed", base)).await.unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn missing_key_skips_provider_without_network_call() {
    let mut server = Server::new_async().await;
    let gemini = server
        .mock("POST", GEMINI_PATH)
        .expect(0)
        .create_async()
        .await;
    let openai = server
        .mock("POST", OPENAI_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(openai_body(r#"{"humanized_text":"Hi."}"#))
        .create_async()
        .await;
    let config = Config {
        google_api_key: String::new(),
        ..Config::for_mock(&server.url())
    };
    let base = spawn_app(&config).await;

    let response = post(format!("{}/humanize", base), json!({ "text": "Greetings." })).await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["humanized_text"], "Hi.");
    assert_eq!(body["data"]["confidence_score"], 0.8);
    gemini.assert_async().await;
    openai.assert_async().await;
}

#[tokio::test]
async fn root_and_cors_preflight() {
    let server = Server::new_async().await;
    let base = spawn_app(&Config::for_mock(&server.url())).await;

    let body: Value = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["endpoints"]["humanize"], "/humanize");

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/humanize", base))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
}
