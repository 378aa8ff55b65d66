//! Per-image captioning workflow.
//!
//! For every discovered image: skip it if a caption already exists, build a
//! [`CaptionRequest`], ask the captioner, print the caption and write it next
//! to the image. The first error aborts the run.

use std::io::Write;
use std::path::Path;

use crate::captioner::{mime_type_for, Captioner};
use crate::error::{Error, Result};
use crate::types::{CaptionRequest, CaptionSettings, DiscoveredImage, GenerateOptions, RunSummary};
use crate::walker::walk_images;

const TRACING_TARGET: &str = "vision_caption::pipeline";

/// What happened to a single image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A caption file already existed and `force` was not set.
    Skipped,
    /// The image was captioned; `written` is false in dry-run mode.
    Captioned { caption: String, written: bool },
}

/// Sequential captioning pipeline bound to one captioner for its lifetime.
#[derive(Debug)]
pub struct CaptionPipeline {
    captioner: Box<dyn Captioner>,
    settings: CaptionSettings,
    options: GenerateOptions,
}

impl CaptionPipeline {
    pub fn new(captioner: Box<dyn Captioner>, settings: CaptionSettings) -> Self {
        let options = GenerateOptions::for_run(settings.one_sentence);
        Self {
            captioner,
            settings,
            options,
        }
    }

    /// Caption every image under `path`, writing one line per image to `out`.
    ///
    /// # Errors
    ///
    /// Stops at the first error: an inaccessible `path`, an unreadable image,
    /// a backend failure or an unwritable caption file. Images after the
    /// failing one are not processed.
    pub async fn run<W: Write>(&self, path: &Path, out: &mut W) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for image in walk_images(path)? {
            match self.process(&image, out).await? {
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Captioned { written, .. } => {
                    summary.captioned += 1;
                    if written {
                        summary.written += 1;
                    }
                }
            }
        }

        tracing::info!(
            target: TRACING_TARGET,
            captioned = summary.captioned,
            skipped = summary.skipped,
            written = summary.written,
            "run complete"
        );

        Ok(summary)
    }

    /// Caption a single image.
    pub async fn process<W: Write>(&self, image: &DiscoveredImage, out: &mut W) -> Result<Outcome> {
        let caption_path = image.caption_path();

        if !self.settings.force && caption_path.exists() {
            tracing::debug!(
                target: TRACING_TARGET,
                image = %image.path.display(),
                "caption exists, skipping"
            );
            return Ok(Outcome::Skipped);
        }

        let request = self.build_request(&image.path)?;
        let reply = self.captioner.caption(&request).await?;
        let caption = self.settings.compose_caption(&reply);

        writeln!(out, "{}: {}", image.display_path().display(), caption)?;

        if self.settings.dry_run {
            return Ok(Outcome::Captioned {
                caption,
                written: false,
            });
        }

        std::fs::write(&caption_path, caption.as_bytes()).map_err(|source| Error::CaptionWrite {
            path: caption_path.clone(),
            source,
        })?;

        tracing::debug!(
            target: TRACING_TARGET,
            caption_file = %caption_path.display(),
            "caption written"
        );

        Ok(Outcome::Captioned {
            caption,
            written: true,
        })
    }

    fn build_request(&self, image_path: &Path) -> Result<CaptionRequest> {
        let image = std::fs::read(image_path).map_err(|source| Error::ImageRead {
            path: image_path.to_path_buf(),
            source,
        })?;

        let system_prompt =
            (!self.settings.system_prompt.is_empty()).then(|| self.settings.system_prompt.clone());

        Ok(CaptionRequest {
            prompt: self.settings.prompt.clone(),
            system_prompt,
            image,
            mime_type: mime_type_for(image_path),
            model: self.settings.model.clone(),
            options: self.options.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captioner::FakeCaptioner;
    use std::fs;
    use std::sync::Arc;

    fn pipeline(fake: &Arc<FakeCaptioner>, settings: CaptionSettings) -> CaptionPipeline {
        CaptionPipeline::new(Box::new(Arc::clone(fake)), settings)
    }

    fn write_image(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"\x89PNG fake").unwrap();
        path
    }

    #[tokio::test]
    async fn test_process_writes_caption_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "dog.png");
        let fake = Arc::new(FakeCaptioner::with_reply("  A dog on a beach.  "));
        let pipeline = pipeline(&fake, CaptionSettings::default().fragments("photo of Leela,", "sepia"));

        let mut out = Vec::new();
        let outcome = pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut out)
            .await
            .unwrap();

        let expected = "photo of Leela, A dog on a beach. sepia";
        assert_eq!(
            outcome,
            Outcome::Captioned {
                caption: expected.to_string(),
                written: true
            }
        );
        assert_eq!(fs::read_to_string(dir.path().join("dog.txt")).unwrap(), expected);
        assert_eq!(String::from_utf8(out).unwrap(), format!("dog.png: {expected}\n"));
    }

    #[tokio::test]
    async fn test_process_builds_request() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "cat.PNG");
        let fake = Arc::new(FakeCaptioner::with_reply("A cat."));
        let settings = CaptionSettings::with_model("llava")
            .prompt("Describe")
            .system_prompt("Be neutral.")
            .one_sentence(true);
        let pipeline = pipeline(&fake, settings);

        pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut Vec::new())
            .await
            .unwrap();

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "llava");
        assert_eq!(request.prompt, "Describe");
        assert_eq!(request.system_prompt.as_deref(), Some("Be neutral."));
        assert_eq!(request.image, b"\x89PNG fake");
        assert_eq!(request.mime_type, "image/png");
        assert_eq!(request.options.num_predict, 200);
        assert_eq!(request.options.stop, Some(vec![".".to_string()]));
    }

    #[tokio::test]
    async fn test_empty_system_prompt_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "a.jpg");
        let fake = Arc::new(FakeCaptioner::with_reply("A thing."));
        let pipeline = pipeline(&fake, CaptionSettings::default().system_prompt(""));

        pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut Vec::new())
            .await
            .unwrap();

        assert!(fake.requests()[0].system_prompt.is_none());
        assert!(fake.requests()[0].options.stop.is_none());
    }

    #[tokio::test]
    async fn test_existing_caption_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "a.jpg");
        fs::write(dir.path().join("a.txt"), "old caption").unwrap();
        let fake = Arc::new(FakeCaptioner::with_reply("new caption"));
        let pipeline = pipeline(&fake, CaptionSettings::default());

        let mut out = Vec::new();
        let outcome = pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(fake.calls(), 0);
        assert!(out.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "old caption");
    }

    #[tokio::test]
    async fn test_force_overwrites_existing_caption() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "a.jpg");
        fs::write(dir.path().join("a.txt"), "a much longer old caption").unwrap();
        let fake = Arc::new(FakeCaptioner::with_reply("new"));
        let pipeline = pipeline(&fake, CaptionSettings::default().force(true));

        pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(fake.calls(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_dry_run_prints_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "sub/a.jpeg");
        let fake = Arc::new(FakeCaptioner::with_reply("A tree."));
        let pipeline = pipeline(&fake, CaptionSettings::default().dry_run(true));

        let mut out = Vec::new();
        let outcome = pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut out)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Captioned {
                caption: "A tree.".to_string(),
                written: false
            }
        );
        assert!(!dir.path().join("sub/a.txt").exists());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}: A tree.\n", Path::new("sub").join("a.jpeg").display())
        );
    }

    #[tokio::test]
    async fn test_run_counts_and_stops_on_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.jpg");
        write_image(dir.path(), "b.jpg");
        write_image(dir.path(), "c.jpg");
        let fake = Arc::new(FakeCaptioner::with_reply("ok").failing_from(1));
        let pipeline = pipeline(&fake, CaptionSettings::default());

        let mut out = Vec::new();
        let err = pipeline.run(dir.path(), &mut out).await.unwrap_err();

        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert_eq!(fake.calls(), 2);
        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert!(!dir.path().join("c.txt").exists());
        assert_eq!(String::from_utf8(out).unwrap(), "a.jpg: ok\n");
    }

    #[tokio::test]
    async fn test_run_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.jpg");
        write_image(dir.path(), "b.png");
        write_image(dir.path(), "notes.md");
        fs::write(dir.path().join("b.txt"), "existing").unwrap();
        let fake = Arc::new(FakeCaptioner::with_reply("ok"));
        let pipeline = pipeline(&fake, CaptionSettings::default());

        let summary = pipeline.run(dir.path(), &mut Vec::new()).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                captioned: 1,
                skipped: 1,
                written: 1
            }
        );
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCaptioner::with_reply("ok"));
        let pipeline = pipeline(&fake, CaptionSettings::default());

        let err = pipeline
            .run(&dir.path().join("missing"), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_caption_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "a.jpg");
        // A directory where the caption file should go makes the write fail.
        fs::create_dir(dir.path().join("a.txt")).unwrap();
        let fake = Arc::new(FakeCaptioner::with_reply("ok"));
        let pipeline = pipeline(&fake, CaptionSettings::default().force(true));

        let err = pipeline
            .process(&DiscoveredImage::new(&image, dir.path()), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CaptionWrite { .. }));
    }
}
