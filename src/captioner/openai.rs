use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{api_error, endpoint_string, parse_endpoint, Captioner, TRACING_TARGET};
use crate::error::{Error, Result};
use crate::types::CaptionRequest;

const BACKEND: &str = "openai";

/// Captioner speaking the OpenAI chat-completions protocol.
///
/// Works with OpenAI itself and with compatible servers such as LM Studio,
/// vLLM or Ollama's `/v1` endpoint.
#[derive(Clone)]
pub struct OpenAiCaptioner {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCaptioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCaptioner")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

impl OpenAiCaptioner {
    /// Create a captioner for `base_url` (e.g. `http://localhost:1234/v1`).
    ///
    /// An empty `api_key` sends no `Authorization` header.
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Result<Self> {
        let url = parse_endpoint(base_url.trim())?;
        Ok(Self {
            client,
            base_url: endpoint_string(&url),
            api_key: api_key.to_string(),
        })
    }
}

/// Build the `/chat/completions` request body.
pub(crate) fn completion_body(request: &CaptionRequest) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }

    let data_url = format!("data:{};base64,{}", request.mime_type, request.image_base64());
    messages.push(json!({
        "role": "user",
        "content": [
            {"type": "text", "text": request.prompt},
            {"type": "image_url", "image_url": {"url": data_url}},
        ],
    }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.options.num_predict,
        "temperature": request.options.temperature,
        "seed": request.options.seed,
    });

    if let Some(stop) = &request.options.stop {
        body["stop"] = json!(stop);
    }

    body
}

#[async_trait]
impl Captioner for OpenAiCaptioner {
    async fn caption(&self, request: &CaptionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            target: TRACING_TARGET,
            url = %url,
            model = %request.model,
            mime_type = request.mime_type,
            image_bytes = request.image.len(),
            "sending chat completion request"
        );

        let mut builder = self.client.post(&url).json(&completion_body(request));
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let resp = builder.send().await.map_err(|source| Error::Connection {
            backend: BACKEND,
            endpoint: self.base_url.clone(),
            source,
        })?;

        if !resp.status().is_success() {
            return Err(api_error(BACKEND, resp).await);
        }

        let json: Value = resp.json().await.map_err(|e| Error::InvalidResponse {
            backend: BACKEND,
            message: e.to_string(),
        })?;

        let choice = json
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|choices| choices.first())
            .ok_or(Error::EmptyResponse { backend: BACKEND })?;

        // A null content (e.g. refusal or tool call) counts as an empty reply.
        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        Ok(content.trim().to_string())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
