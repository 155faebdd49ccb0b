//! Template lookup and caching.
//!
//! Searches refer to templates by name; a [`TemplateSource`] turns that name
//! into pixels. The filesystem store keeps decoded images in memory and
//! re-reads a file only when its modification time changes, so a search that
//! polls several times a second does not hit the disk on every attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::RgbaImage;

use crate::error::{VisionError, VisionResult};

/// Supplies template images by reference.
pub trait TemplateSource {
    fn resolve(&mut self, reference: &str) -> VisionResult<RgbaImage>;
}

struct CachedTemplate {
    image: RgbaImage,
    modified: Option<SystemTime>,
}

/// Filesystem-backed template store with an mtime-invalidated cache.
///
/// Relative references are joined onto the base directory; absolute paths
/// pass through untouched.
pub struct FsTemplateStore {
    base: PathBuf,
    cache: HashMap<PathBuf, CachedTemplate>,
}

impl FsTemplateStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            cache: HashMap::new(),
        }
    }

    fn full_path(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl TemplateSource for FsTemplateStore {
    fn resolve(&mut self, reference: &str) -> VisionResult<RgbaImage> {
        let path = self.full_path(reference);
        let modified = std::fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());

        // A cache hit without a readable mtime is never trusted; the file
        // may have been replaced without us noticing.
        if let Some(hit) = self.cache.get(&path)
            && hit.modified.is_some()
            && hit.modified == modified
        {
            return Ok(hit.image.clone());
        }

        let image = load_template(&path)?;
        log::debug!(
            "loaded template {path:?} ({}x{})",
            image.width(),
            image.height()
        );
        self.cache.insert(
            path,
            CachedTemplate {
                image: image.clone(),
                modified,
            },
        );
        Ok(image)
    }
}

fn load_template(path: &Path) -> VisionResult<RgbaImage> {
    let image = image::open(path)
        .map_err(|err| {
            log::debug!("template {path:?} failed to load: {err}");
            VisionError::TemplateNotFound {
                path: path.to_path_buf(),
            }
        })?
        .to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(VisionError::invalid_image(format!(
            "template {path:?} has no pixels"
        )));
    }
    Ok(image)
}
