//! Runtime configuration: where the catalogue, uploads and crops live,
//! plus the few policies the annotation workflow consults.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnnotatorError, Result};
use crate::imaging::crop::DEFAULT_MAX_CROP_PIXELS;

/// Environment variable that overrides the default data directory
pub const HOME_ENV: &str = "GESTURE_ANNOTATOR_HOME";

/// JPEG quality used for crop artifacts
pub const DEFAULT_CROP_QUALITY: u8 = 90;

const DB_FILENAME: &str = "annotator.db";
const UPLOADS_DIRNAME: &str = "uploads";
const CROPS_DIRNAME: &str = "crops";

/// How an `iconographic_variant_id` supplied in notes metadata is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantPolicy {
    /// Store the id as given, even if no such variant exists
    #[default]
    AcceptUnchecked,
    /// Reject ids that do not reference an existing variant
    RequireExisting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub crops_dir: PathBuf,
    pub crop_quality: u8,
    /// Largest crop area accepted, in pixels
    pub max_crop_pixels: u64,
    pub variant_policy: VariantPolicy,
}

impl AppConfig {
    /// Lay out every path under a single data directory
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: data_dir.join(DB_FILENAME),
            uploads_dir: data_dir.join(UPLOADS_DIRNAME),
            crops_dir: data_dir.join(CROPS_DIRNAME),
            data_dir,
            crop_quality: DEFAULT_CROP_QUALITY,
            max_crop_pixels: DEFAULT_MAX_CROP_PIXELS,
            variant_policy: VariantPolicy::default(),
        }
    }

    /// Resolve the data directory: explicit override, then `GESTURE_ANNOTATOR_HOME`,
    /// then the platform data directory:
    /// - Linux: ~/.local/share/gesture-annotator
    /// - macOS: ~/Library/Application Support/gesture-annotator
    /// - Windows: %APPDATA%\gesture-annotator
    pub fn resolve(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => match env::var(HOME_ENV).ok().filter(|v| !v.trim().is_empty()) {
                Some(dir) => PathBuf::from(dir),
                None => dirs::data_dir()
                    .or_else(dirs::home_dir)
                    .map(|base| base.join("gesture-annotator"))
                    .ok_or_else(|| {
                        AnnotatorError::validation(format!(
                            "could not determine a data directory; set {HOME_ENV}"
                        ))
                    })?,
            },
        };
        tracing::debug!(data_dir = %data_dir.display(), "resolved data directory");
        Ok(Self::from_data_dir(data_dir))
    }

    /// Create the data, uploads and crops directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.uploads_dir, &self.crops_dir] {
            fs::create_dir_all(dir).map_err(|e| AnnotatorError::io(dir.as_path(), e))?;
        }
        Ok(())
    }

    /// Path of an uploaded original, for the read-only uploads route
    pub fn upload_file(&self, filename: &str) -> Result<PathBuf> {
        serve_from(&self.uploads_dir, filename)
    }

    /// Path of a crop artifact, for the read-only crops route
    pub fn crop_file(&self, filename: &str) -> Result<PathBuf> {
        serve_from(&self.crops_dir, filename)
    }
}

/// Resolve a bare filename inside `dir`. Anything with a directory component is refused.
fn serve_from(dir: &Path, filename: &str) -> Result<PathBuf> {
    let candidate = Path::new(filename);
    let is_plain = matches!(
        candidate.components().collect::<Vec<_>>().as_slice(),
        [std::path::Component::Normal(_)]
    );
    if filename.is_empty() || !is_plain || filename.starts_with('.') {
        return Err(AnnotatorError::validation(format!(
            "not a servable filename: {filename:?}"
        )));
    }

    let path = dir.join(candidate);
    if !path.is_file() {
        return Err(AnnotatorError::not_found("File", filename));
    }
    Ok(path)
}
