//! Upload and annotate operations.
//!
//! `annotate` is the one place where filesystem and database state change
//! together. The crop is staged before the commit and published after it;
//! if anything fails first, the transaction rolls back and the staged crop
//! is removed, so no crop file outlives a failed annotation.

use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::catalog::MetadataCascade;
use crate::config::AppConfig;
use crate::error::{AnnotatorError, Result};
use crate::imaging::crop::CropService;
use crate::imaging::region::Region;
use crate::state::data::Gesture;
use crate::state::library::{
    find_gesture, find_image, insert_gesture_instance, insert_image, set_cropped_image_path,
    Library,
};
use crate::state::notes::Notes;

/// Extensions picked up by folder import
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

/// Body of an annotate call. Every field is optional here so that missing
/// required fields surface as validation errors rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotateRequest {
    pub image_id: Option<i64>,
    pub region_coordinates: Option<Region>,
    pub gesture_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotateResponse {
    pub gesture_instance_id: i64,
    pub cropped_image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub image_id: i64,
    pub filename: String,
}

/// Result of a folder import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<UploadResponse>,
    pub failed: usize,
}

impl AnnotateRequest {
    pub fn new(image_id: i64, region: Region) -> Self {
        Self {
            image_id: Some(image_id),
            region_coordinates: Some(region),
            ..Self::default()
        }
    }

    pub fn with_gesture(mut self, gesture_id: i64) -> Self {
        self.gesture_id = Some(gesture_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the required fields and return them
    fn required(&self) -> Result<(i64, Region)> {
        let (Some(image_id), Some(region)) = (self.image_id, self.region_coordinates) else {
            return Err(AnnotatorError::validation(
                "missing required fields: image_id and region_coordinates",
            ));
        };
        region.validate()?;
        Ok((image_id, region))
    }
}

pub struct AnnotationWorkflow {
    library: Library,
    config: AppConfig,
    crops: CropService,
    cascade: MetadataCascade,
}

impl AnnotationWorkflow {
    /// Create the data directories and open the catalogue they hold
    pub fn open(config: AppConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let library = Library::open(&config.database_path)?;
        Ok(Self::with_library(config, library))
    }

    pub fn with_library(config: AppConfig, library: Library) -> Self {
        let crops = CropService::new(&config.crops_dir, config.crop_quality)
            .with_max_pixels(config.max_crop_pixels);
        let cascade = MetadataCascade::new(config.variant_policy);
        Self {
            library,
            config,
            crops,
            cascade,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Store `bytes` under the sanitized client filename and record the image.
    ///
    /// Two uploads sanitizing to the same name overwrite each other's file.
    pub fn upload(&self, bytes: &[u8], client_filename: &str) -> Result<UploadResponse> {
        let filename = sanitize_filename(client_filename);
        if filename.is_empty() {
            return Err(AnnotatorError::validation(format!(
                "unusable filename: {client_filename:?}"
            )));
        }

        let path = self.config.uploads_dir.join(&filename);
        fs::create_dir_all(&self.config.uploads_dir)
            .map_err(|e| AnnotatorError::io(&self.config.uploads_dir, e))?;
        fs::write(&path, bytes).map_err(|e| AnnotatorError::io(&path, e))?;
        tracing::info!(path = %path.display(), "file saved");

        let image_id = insert_image(self.library.connection(), &filename)?;
        tracing::info!(image_id, %filename, "image record created");
        Ok(UploadResponse { image_id, filename })
    }

    /// Upload a file from disk, using its file name as the client filename
    pub fn upload_path(&self, path: &Path) -> Result<UploadResponse> {
        let bytes = fs::read(path).map_err(|e| AnnotatorError::io(path, e))?;
        let client_filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        self.upload(&bytes, &client_filename)
    }

    /// Upload every image file found under `folder`, recursively
    pub fn import_folder(&self, folder: &Path) -> ImportSummary {
        let mut summary = ImportSummary::default();
        tracing::info!(folder = %folder.display(), "scanning folder");

        for entry in WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !has_image_extension(path) {
                continue;
            }

            match self.upload_path(path) {
                Ok(uploaded) => summary.imported.push(uploaded),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err.detailed_message(), "import failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            imported = summary.imported.len(),
            failed = summary.failed,
            "folder import complete"
        );
        summary
    }

    // ========================================================================
    // Gesture vocabulary
    // ========================================================================

    pub fn list_gestures(&self) -> Result<Vec<Gesture>> {
        self.library.list_gestures()
    }

    pub fn add_gesture(&self, name: &str, description: Option<&str>) -> Result<Gesture> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AnnotatorError::validation("gesture name must not be empty"));
        }
        let id = self.library.add_gesture(name, description)?;
        Ok(Gesture {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    // ========================================================================
    // Annotation
    // ========================================================================

    /// Record an annotated region, crop it, and catalogue any notes metadata.
    pub fn annotate(&mut self, request: &AnnotateRequest) -> Result<AnnotateResponse> {
        match self.annotate_inner(request) {
            Ok(response) => {
                tracing::info!(
                    gesture_instance_id = response.gesture_instance_id,
                    crop = %response.cropped_image_path,
                    "annotation saved"
                );
                Ok(response)
            }
            Err(err) => {
                if err.is_client_error() {
                    tracing::warn!(category = err.category(), error = %err.detailed_message(), "annotation rejected");
                } else {
                    tracing::error!(category = err.category(), error = %err.detailed_message(), "annotation failed; rolled back");
                }
                Err(err)
            }
        }
    }

    fn annotate_inner(&mut self, request: &AnnotateRequest) -> Result<AnnotateResponse> {
        let (image_id, region) = request.required()?;

        if let Some(gesture_id) = request.gesture_id {
            if find_gesture(self.library.connection(), gesture_id)?.is_none() {
                return Err(AnnotatorError::InvalidReference {
                    field: "gesture_id",
                    id: gesture_id,
                });
            }
        }

        let tx = self.library.transaction()?;

        let image = find_image(&tx, image_id)?
            .ok_or_else(|| AnnotatorError::not_found("Image", image_id))?;

        let instance_id = insert_gesture_instance(
            &tx,
            image_id,
            request.gesture_id,
            &region,
            request.notes.as_deref(),
        )?;

        let source = self.config.uploads_dir.join(&image.filename);
        let decoded = CropService::open(&source)?;
        let (width, height) = decoded.dimensions();
        let pixel_box = region.to_pixel_box(width, height);
        tracing::debug!(instance_id, ?pixel_box, width, height, "mapped region");

        let staged = self.crops.crop_image(&decoded, pixel_box)?;
        set_cropped_image_path(&tx, instance_id, staged.filename())?;

        if let Some(text) = request.notes.as_deref() {
            if let Some(metadata) = Notes::parse(text).metadata() {
                self.cascade.apply(&tx, metadata, image_id)?;
            }
        }

        // an error here drops `staged`, which deletes the staged file
        tx.commit()?;

        let cropped_image_path = staged.filename().to_string();
        staged.publish()?;

        Ok(AnnotateResponse {
            gesture_instance_id: instance_id,
            cropped_image_path,
        })
    }
}

/// Reduce a client-supplied filename to `[A-Za-z0-9_.-]`.
///
/// Path separators and whitespace become `_`; other characters are dropped;
/// leading and trailing dots and underscores are stripped.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
