use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering, captioning or persisting images.
///
/// Every variant is fatal for a run: the pipeline stops at the first error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot access {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read image {}: {source}", .path.display())]
    ImageRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not write caption {}: {source}", .path.display())]
    CaptionWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Cannot connect to {backend} at {endpoint}: {source}")]
    Connection {
        backend: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{backend} returned HTTP {status}: {body}")]
    Api {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {backend}: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },

    #[error("No response from {backend}")]
    EmptyResponse { backend: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
