//! Vision backends that turn an image and a prompt into caption text.
//!
//! The backend is chosen once from configuration and held behind
//! `Box<dyn Captioner>` for the whole run.

mod fake;
mod ollama;
mod openai;

pub use fake::FakeCaptioner;
pub use ollama::{normalize_host, OllamaCaptioner, DEFAULT_OLLAMA_HOST};
pub use openai::OpenAiCaptioner;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::{Error, Result};
use crate::types::CaptionRequest;
use crate::walker::image_extension;

pub(crate) const TRACING_TARGET: &str = "vision_caption::captioner";

/// Something that can caption an image.
#[async_trait]
pub trait Captioner: Send + Sync + fmt::Debug {
    /// Send the request and return the model's reply, trimmed.
    async fn caption(&self, request: &CaptionRequest) -> Result<String>;

    /// Short backend name used in logs and errors (e.g. "ollama").
    fn backend_name(&self) -> &'static str;

    /// The endpoint requests are sent to.
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<C: Captioner + ?Sized> Captioner for Arc<C> {
    async fn caption(&self, request: &CaptionRequest) -> Result<String> {
        (**self).caption(request).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Which protocol to speak, decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Ollama { host: String },
    OpenAi { base_url: String, api_key: String },
}

impl Backend {
    /// Select the OpenAI-compatible protocol when `openai_url` is non-empty,
    /// the Ollama chat protocol otherwise.
    pub fn from_settings(openai_url: &str, api_key: &str, ollama_host: &str) -> Self {
        if openai_url.trim().is_empty() {
            Backend::Ollama {
                host: ollama_host.to_string(),
            }
        } else {
            Backend::OpenAi {
                base_url: openai_url.trim().to_string(),
                api_key: api_key.to_string(),
            }
        }
    }
}

/// Build the captioner for `backend`.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the endpoint is not a usable URL.
pub fn create_captioner(backend: &Backend, client: Client) -> Result<Box<dyn Captioner>> {
    match backend {
        Backend::Ollama { host } => Ok(Box::new(OllamaCaptioner::new(client, host)?)),
        Backend::OpenAi { base_url, api_key } => {
            Ok(Box::new(OpenAiCaptioner::new(client, base_url, api_key)?))
        }
    }
}

/// MIME type for an image path, falling back to JPEG for unknown extensions.
pub fn mime_type_for(path: &Path) -> &'static str {
    match image_extension(path) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Parse an endpoint into a [`Url`], requiring an http(s) scheme and a host.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::InvalidConfig(format!("invalid endpoint '{endpoint}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidConfig(format!(
            "endpoint must use http or https: '{endpoint}'"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidConfig(format!("endpoint has no host: '{endpoint}'")));
    }
    Ok(url)
}

/// Render a parsed endpoint without the trailing slash so paths can be appended.
pub(crate) fn endpoint_string(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// Read a non-success response into [`Error::Api`].
async fn api_error(backend: &'static str, resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::Api {
        backend,
        status,
        body,
    }
}
