//! Image discovery.
//!
//! Turns a user-supplied path into a lazy sequence of [`DiscoveredImage`]s:
//! a single image file yields itself, a directory is walked recursively with
//! dot-directories pruned.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::DiscoveredImage;

const TRACING_TARGET: &str = "vision_caption::walker";

/// Lowercase extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Check whether a file name ends in an image extension (case-insensitive).
///
/// Matches on the name suffix, so a file called just `.jpg` counts too.
pub fn is_image_file(path: &Path) -> bool {
    image_extension(path).is_some()
}

/// The lowercase image extension the file name ends with, if any.
pub(crate) fn image_extension(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| name.strip_suffix(*ext).is_some_and(|rest| rest.ends_with('.')))
}

/// Start discovering images under `path`.
///
/// # Errors
///
/// Returns [`Error::Discovery`] if `path` itself cannot be stat'ed. Errors on
/// individual entries further down the tree are skipped silently.
pub fn walk_images(path: impl AsRef<Path>) -> Result<ImageWalk> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path).map_err(|source| Error::Discovery {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.is_dir() {
        let single = is_image_file(path).then(|| {
            let root = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            DiscoveredImage::new(path, root)
        });
        return Ok(ImageWalk {
            inner: Inner::Single(single),
        });
    }

    let root = path.to_path_buf();
    let entries = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // The starting directory is walked even when its own name is hidden.
            entry.depth() == 0 || !(entry.file_type().is_dir() && is_hidden(entry.file_name()))
        });

    Ok(ImageWalk {
        inner: Inner::Tree {
            root,
            entries: Box::new(entries),
        },
    })
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Lazy iterator over the images found by [`walk_images`].
pub struct ImageWalk {
    inner: Inner,
}

enum Inner {
    Single(Option<DiscoveredImage>),
    Tree {
        root: PathBuf,
        entries: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>>>,
    },
}

impl Iterator for ImageWalk {
    type Item = DiscoveredImage;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Single(image) => image.take(),
            Inner::Tree { root, entries } => loop {
                let entry = match entries.next()? {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::trace!(
                            target: TRACING_TARGET,
                            error = %err,
                            "skipping unreadable entry"
                        );
                        continue;
                    }
                };

                if entry.file_type().is_dir() || !is_image_file(entry.path()) {
                    continue;
                }

                return Some(DiscoveredImage::new(entry.into_path(), root.clone()));
            },
        }
    }
}

impl std::fmt::Debug for ImageWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Single(image) => f.debug_tuple("ImageWalk::Single").field(image).finish(),
            Inner::Tree { root, .. } => f
                .debug_struct("ImageWalk::Tree")
                .field("root", root)
                .finish(),
        }
    }
}
