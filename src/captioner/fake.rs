//! Fake captioner for testing.
//!
//! Returns a canned reply without network access and remembers every request
//! it was given.

use std::sync::Mutex;

use async_trait::async_trait;

use super::Captioner;
use crate::error::{Error, Result};
use crate::types::CaptionRequest;

/// A captioner that answers every request with the same text.
#[derive(Debug)]
pub struct FakeCaptioner {
    reply: String,
    /// Fail with an API error from this call index (0-based) onward
    fail_from: Option<usize>,
    requests: Mutex<Vec<CaptionRequest>>,
}

impl FakeCaptioner {
    /// Create a fake that always replies with `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail_from: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Make every call from the `call`-th one (0-based) fail.
    pub fn failing_from(mut self, call: usize) -> Self {
        self.fail_from = Some(call);
        self
    }

    /// Number of caption calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Copies of all requests received so far.
    pub fn requests(&self) -> Vec<CaptionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Captioner for FakeCaptioner {
    async fn caption(&self, request: &CaptionRequest) -> Result<String> {
        let call = {
            let mut requests = self.requests.lock().map_err(|_| Error::InvalidResponse {
                backend: "fake",
                message: "request log poisoned".to_string(),
            })?;
            requests.push(request.clone());
            requests.len() - 1
        };

        if self.fail_from.is_some_and(|from| call >= from) {
            return Err(Error::Api {
                backend: "fake",
                status: 500,
                body: "injected failure".to_string(),
            });
        }

        Ok(self.reply.trim().to_string())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }

    fn endpoint(&self) -> &str {
        "memory://fake"
    }
}
