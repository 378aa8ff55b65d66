use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};

use super::{api_error, endpoint_string, parse_endpoint, Captioner, TRACING_TARGET};
use crate::error::{Error, Result};
use crate::types::CaptionRequest;

/// Host used when `OLLAMA_HOST` is not set.
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

const DEFAULT_PORT: u16 = 11434;
const BACKEND: &str = "ollama";

/// Normalize an Ollama host the way `OLLAMA_HOST` is usually written.
///
/// - `0.0.0.0` -> `http://0.0.0.0:11434` (no scheme: http on port 11434)
/// - `http://gpu-box` -> port 80, `https://ollama.example.com` -> port 443
/// - an empty value falls back to [`DEFAULT_OLLAMA_HOST`]
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the host does not parse as an http(s)
/// URL with a non-empty host name.
pub fn normalize_host(host: &str) -> Result<String> {
    resolve_host(host).map(|url| endpoint_string(&url))
}

fn resolve_host(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return parse_endpoint(DEFAULT_OLLAMA_HOST);
    }
    if host.contains("://") {
        return parse_endpoint(host);
    }

    let mut url = parse_endpoint(&format!("http://{host}"))?;
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|()| Error::InvalidConfig(format!("cannot set a port on '{host}'")))?;
    }
    Ok(url)
}

/// Captioner speaking the Ollama `/api/chat` protocol.
#[derive(Debug, Clone)]
pub struct OllamaCaptioner {
    client: Client,
    host: String,
}

impl OllamaCaptioner {
    /// Create a captioner for the given Ollama host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the host is not a usable http(s) URL.
    pub fn new(client: Client, host: &str) -> Result<Self> {
        let host = normalize_host(host)?;
        Ok(Self { client, host })
    }
}

/// Build the `/api/chat` request body.
pub(crate) fn chat_body(request: &CaptionRequest) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({
        "role": "user",
        "content": request.prompt,
        "images": [request.image_base64()],
    }));

    json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
        "options": request.options,
    })
}

#[async_trait]
impl Captioner for OllamaCaptioner {
    async fn caption(&self, request: &CaptionRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.host);
        tracing::debug!(
            target: TRACING_TARGET,
            url = %url,
            model = %request.model,
            image_bytes = request.image.len(),
            "sending ollama chat request"
        );

        let resp = self
            .client
            .post(&url)
            .json(&chat_body(request))
            .send()
            .await
            .map_err(|source| Error::Connection {
                backend: BACKEND,
                endpoint: self.host.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(api_error(BACKEND, resp).await);
        }

        let json: Value = resp.json().await.map_err(|e| Error::InvalidResponse {
            backend: BACKEND,
            message: e.to_string(),
        })?;

        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return Err(Error::Api {
                backend: BACKEND,
                status: 200,
                body: err.to_string(),
            });
        }

        let content = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidResponse {
                backend: BACKEND,
                message: "missing message.content".to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn endpoint(&self) -> &str {
        &self.host
    }
}
