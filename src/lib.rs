//! # vision-caption
//!
//! Batch image captioning with vision LLMs.
//!
//! Walks a file or directory, finds `jpg`/`jpeg`/`png` images and asks a
//! vision model for a one-sentence caption of each, written next to the image
//! as a `.txt` file.
//!
//! ## Features
//!
//! - **Two backends**: a local Ollama server (`/api/chat`) or any
//!   OpenAI-compatible chat-completions API, chosen once per run
//! - **Idempotent reruns**: images that already have a caption are skipped
//!   unless forced
//! - **Dry-run** mode that prints captions without touching the filesystem
//! - **Caption fragments** prepended and appended to every caption
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vision_caption::{create_captioner, Backend, CaptionPipeline, CaptionSettings};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Backend::from_settings("", "", "localhost:11434");
//!     let captioner = create_captioner(&backend, reqwest::Client::new())?;
//!
//!     let settings = CaptionSettings::with_model("llava").fragments("photo of Leela,", "");
//!     let pipeline = CaptionPipeline::new(captioner, settings);
//!
//!     let summary = pipeline.run(Path::new("photos"), &mut std::io::stdout()).await?;
//!     println!("captioned {} images", summary.captioned);
//!     Ok(())
//! }
//! ```
//!
//! The image walker can be used on its own:
//!
//! ```rust,no_run
//! for image in vision_caption::walk_images("photos")? {
//!     println!("{} -> {}", image.path.display(), image.caption_path().display());
//! }
//! # Ok::<(), vision_caption::Error>(())
//! ```

pub mod captioner;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod walker;

// Re-export main types at crate root
pub use captioner::{create_captioner, Backend, Captioner, FakeCaptioner, OllamaCaptioner, OpenAiCaptioner};
pub use error::{Error, Result};
pub use pipeline::{CaptionPipeline, Outcome};
pub use types::{CaptionRequest, CaptionSettings, DiscoveredImage, GenerateOptions, RunSummary};
pub use walker::{is_image_file, walk_images, ImageWalk};
