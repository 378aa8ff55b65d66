use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Generation options sent with every caption request.
///
/// Serialized as-is into the Ollama `options` object; the OpenAI backend maps
/// the fields onto its own top-level request keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Maximum tokens to generate
    pub num_predict: u32,
    /// Sampling temperature (0 = deterministic)
    pub temperature: f32,
    /// Fixed random seed
    pub seed: i64,
    /// Stop sequences, omitted from the request when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_predict: 200,
            temperature: 0.0,
            seed: 1,
            stop: None,
        }
    }
}

impl GenerateOptions {
    /// Options for a run, stopping at the first period when `one_sentence` is set.
    pub fn for_run(one_sentence: bool) -> Self {
        Self {
            stop: one_sentence.then(|| vec![".".to_string()]),
            ..Default::default()
        }
    }
}

/// A single caption request, built fresh for every image.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// User prompt sent alongside the image
    pub prompt: String,
    /// Optional system message preceding the user message
    pub system_prompt: Option<String>,
    /// Raw image bytes
    pub image: Vec<u8>,
    /// MIME type derived from the file extension
    pub mime_type: &'static str,
    /// Vision model name (e.g., "qwen2.5vl", "llava")
    pub model: String,
    pub options: GenerateOptions,
}

impl CaptionRequest {
    /// Image bytes encoded as standard base64.
    pub fn image_base64(&self) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.image)
    }
}

/// An image found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    /// Path to the image file
    pub path: PathBuf,
    /// Discovery root, used only to shorten paths for display
    pub root: PathBuf,
}

impl DiscoveredImage {
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
        }
    }

    /// Sibling caption file: the image path with its extension replaced by `txt`.
    ///
    /// The extension starts at the last `.` of the file name, so `.jpg`
    /// maps to `.txt`.
    pub fn caption_path(&self) -> PathBuf {
        match self.path.file_name().and_then(|name| name.to_str()) {
            Some(name) => {
                let stem = name.rfind('.').map_or(name, |idx| &name[..idx]);
                self.path.with_file_name(format!("{stem}.txt"))
            }
            None => self.path.with_extension("txt"),
        }
    }

    /// Image path relative to the discovery root, or the full path when it
    /// does not live under the root.
    pub fn display_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }
}

/// Per-run settings for the caption pipeline.
#[derive(Debug, Clone)]
pub struct CaptionSettings {
    /// Vision model name
    pub model: String,
    /// User prompt
    pub prompt: String,
    /// System prompt; an empty string sends no system message
    pub system_prompt: String,
    /// Fragment prepended to every caption
    pub start: String,
    /// Fragment appended to every caption
    pub end: String,
    /// Print captions without writing `.txt` files
    pub dry_run: bool,
    /// Reprocess images that already have a caption file
    pub force: bool,
    /// Stop generation at the first period
    pub one_sentence: bool,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            prompt: crate::config::DEFAULT_PROMPT.to_string(),
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
            start: String::new(),
            end: String::new(),
            dry_run: false,
            force: false,
            one_sentence: false,
        }
    }
}

impl CaptionSettings {
    /// Create settings with the given model name.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the user prompt.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Set the caption start and end fragments.
    pub fn fragments(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = start.into();
        self.end = end.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn one_sentence(mut self, one_sentence: bool) -> Self {
        self.one_sentence = one_sentence;
        self
    }

    /// Assemble the final caption from the model's reply.
    pub fn compose_caption(&self, model_text: &str) -> String {
        format!("{} {} {}", self.start, model_text.trim(), self.end)
            .trim()
            .to_string()
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Images sent to the captioner
    pub captioned: usize,
    /// Images skipped because a caption file already existed
    pub skipped: usize,
    /// Caption files written
    pub written: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_options_defaults() {
        let options = GenerateOptions::default();
        assert_eq!(options.num_predict, 200);
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.seed, 1);
        assert!(options.stop.is_none());
    }

    #[test]
    fn test_generate_options_one_sentence() {
        let options = GenerateOptions::for_run(true);
        assert_eq!(options.stop, Some(vec![".".to_string()]));
        assert!(GenerateOptions::for_run(false).stop.is_none());
    }

    #[test]
    fn test_generate_options_serialization_skips_stop() {
        let value = serde_json::to_value(GenerateOptions::default()).unwrap();
        assert_eq!(value["num_predict"], 200);
        assert_eq!(value["seed"], 1);
        assert!(value.get("stop").is_none());

        let value = serde_json::to_value(GenerateOptions::for_run(true)).unwrap();
        assert_eq!(value["stop"], serde_json::json!(["."]));
    }

    #[test]
    fn test_caption_path_replaces_extension() {
        let image = DiscoveredImage::new("/photos/trip/beach.JPG", "/photos");
        assert_eq!(image.caption_path(), PathBuf::from("/photos/trip/beach.txt"));

        let image = DiscoveredImage::new("/photos/archive.v2.png", "/photos");
        assert_eq!(image.caption_path(), PathBuf::from("/photos/archive.v2.txt"));

        let image = DiscoveredImage::new("/photos/.jpg", "/photos");
        assert_eq!(image.caption_path(), PathBuf::from("/photos/.txt"));
    }

    #[test]
    fn test_display_path_strips_root() {
        let image = DiscoveredImage::new("/photos/trip/beach.jpg", "/photos");
        assert_eq!(image.display_path(), Path::new("trip/beach.jpg"));

        let image = DiscoveredImage::new("/elsewhere/beach.jpg", "/photos");
        assert_eq!(image.display_path(), Path::new("/elsewhere/beach.jpg"));
    }

    #[test]
    fn test_compose_caption_with_fragments() {
        let settings = CaptionSettings::default().fragments("photo of Leela,", "in sepia");
        assert_eq!(
            settings.compose_caption("  A dog runs on the beach.\n"),
            "photo of Leela, A dog runs on the beach. in sepia"
        );
    }

    #[test]
    fn test_compose_caption_without_fragments() {
        let settings = CaptionSettings::default();
        assert_eq!(settings.compose_caption(" A cat. "), "A cat.");
        assert_eq!(settings.compose_caption(""), "");

        let settings = CaptionSettings::default().fragments("start", "");
        assert_eq!(settings.compose_caption("A cat."), "start A cat.");
    }

    #[test]
    fn test_image_base64() {
        let request = CaptionRequest {
            prompt: String::new(),
            system_prompt: None,
            image: b"hello".to_vec(),
            mime_type: "image/png",
            model: "llava".to_string(),
            options: GenerateOptions::default(),
        };
        assert_eq!(request.image_base64(), "aGVsbG8=");
    }
}
