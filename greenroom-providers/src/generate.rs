use crate::request::{Body, HttpRequest};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    /// Endpoint streaming the critique back, e.g. `http://host/api/generate`.
    pub endpoint: String,
}

pub fn build_generate_request(cfg: &GenerateConfig, prompt: &str) -> HttpRequest {
    let payload = json!({ "prompt": prompt });

    HttpRequest {
        method: "POST".into(),
        url: cfg.endpoint.clone(),
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: Body::Json(payload.to_string()),
    }
}
