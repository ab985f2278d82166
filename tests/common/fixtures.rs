//! Mock endpoints for the listing, PDF, generation and speech APIs

use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Body served for every successful PDF download
pub fn pdf_body(id: &str) -> Vec<u8> {
    format!("%PDF-1.7 fake paper {id}").into_bytes()
}

/// Serve a daily listing containing `ids`
pub async fn mount_listing(server: &MockServer, ids: &[&str]) {
    let records: Vec<Value> = ids
        .iter()
        .map(|id| json!({"paper": {"id": id, "title": format!("Paper {id}")}}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/daily_papers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(records)))
        .mount(server)
        .await;
}

/// Serve a PDF for `id`
pub async fn mount_pdf(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/pdf/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body(id)))
        .mount(server)
        .await;
}

/// Answer requests for `id` with `status`, at most `times` times
pub async fn mount_pdf_status(server: &MockServer, id: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/pdf/{id}")))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Generation endpoint that answers with "Segment: <prompt>"
pub struct EchoSegment;

impl Respond for EchoSegment {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": format!("Segment: {prompt}")}]},
                "finishReason": "STOP"
            }]
        }))
    }
}

/// Mount the echoing generation endpoint
pub async fn mount_gemini(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/[^/]+:generateContent$"))
        .respond_with(EchoSegment)
        .mount(server)
        .await;
}

/// Speech endpoint that returns the request text as the "audio"
pub struct EchoAudio;

impl Respond for EchoAudio {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let text = body["text"].as_str().unwrap_or_default().to_string();
        ResponseTemplate::new(200).set_body_bytes(text.into_bytes())
    }
}

/// Mount the echoing speech endpoint
pub async fn mount_speech(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/text-to-speech/[^/]+/stream$"))
        .respond_with(EchoAudio)
        .mount(server)
        .await;
}
