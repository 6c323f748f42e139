//! Crop artifact generation
//!
//! Crops are encoded once into a staging directory next to the published
//! crops, and only moved into place after the database commit succeeds.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView, RgbImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::region::PixelBox;
use crate::error::{AnnotatorError, Result};

/// Subdirectory of the crops directory holding uncommitted crops
pub const STAGING_DIRNAME: &str = ".staging";

/// Extension of every crop artifact
pub const CROP_EXTENSION: &str = "jpg";

/// Largest side a baseline JPEG can encode
pub const MAX_CROP_SIDE: u32 = 65_535;

/// Default cap on the pixels a single crop may cover (64 MP)
pub const DEFAULT_MAX_CROP_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CropService {
    crops_dir: PathBuf,
    quality: u8,
    max_pixels: u64,
}

/// A crop written to staging but not yet visible in the crops directory.
///
/// Dropping it without calling [`StagedCrop::publish`] removes the file.
#[derive(Debug)]
pub struct StagedCrop {
    filename: String,
    staged_path: PathBuf,
    final_path: PathBuf,
    settled: bool,
}

impl CropService {
    pub fn new(crops_dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            crops_dir: crops_dir.into(),
            quality: quality.clamp(1, 100),
            max_pixels: DEFAULT_MAX_CROP_PIXELS,
        }
    }

    /// Override the largest crop area accepted, in pixels
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn crops_dir(&self) -> &Path {
        &self.crops_dir
    }

    fn staging_dir(&self) -> PathBuf {
        self.crops_dir.join(STAGING_DIRNAME)
    }

    /// Decode a source image, mapping failures to the image-decode category
    pub fn open(source: &Path) -> Result<DynamicImage> {
        image::open(source).map_err(|e| AnnotatorError::ImageDecode {
            path: source.to_path_buf(),
            source: e,
        })
    }

    /// Crop `pixel_box` out of `source` into the staging area.
    pub fn crop(&self, source: &Path, pixel_box: PixelBox) -> Result<StagedCrop> {
        let img = Self::open(source)?;
        self.crop_image(&img, pixel_box)
    }

    /// Crop an already-decoded image into the staging area
    pub fn crop_image(&self, img: &DynamicImage, pixel_box: PixelBox) -> Result<StagedCrop> {
        let (width, height) = self.checked_dimensions(pixel_box)?;
        let cropped = extract(img, pixel_box, width, height);

        let staging = self.staging_dir();
        fs::create_dir_all(&staging).map_err(|e| AnnotatorError::io(&staging, e))?;

        let filename = new_crop_filename();
        let staged_path = staging.join(&filename);
        let final_path = self.crops_dir.join(&filename);

        let mut staged = StagedCrop {
            filename,
            staged_path,
            final_path,
            settled: false,
        };

        if let Err(err) = self.encode(&cropped, &staged.staged_path) {
            staged.discard();
            return Err(err);
        }

        tracing::debug!(
            crop = %staged.filename,
            width = cropped.width(),
            height = cropped.height(),
            "staged crop"
        );
        Ok(staged)
    }

    /// Reject boxes that are empty or too large to allocate and encode
    fn checked_dimensions(&self, pixel_box: PixelBox) -> Result<(u32, u32)> {
        if pixel_box.is_empty() {
            return Err(AnnotatorError::validation(format!(
                "region selects no pixels (box {}x{})",
                pixel_box.width(),
                pixel_box.height()
            )));
        }

        let too_large = || {
            AnnotatorError::validation(format!(
                "region too large to crop (box {}x{}, limit {} pixels and {} per side)",
                pixel_box.width(),
                pixel_box.height(),
                self.max_pixels,
                MAX_CROP_SIDE
            ))
        };
        let (width, height) = pixel_box.dimensions().ok_or_else(too_large)?;
        if width > MAX_CROP_SIDE
            || height > MAX_CROP_SIDE
            || pixel_box.area() > u128::from(self.max_pixels)
        {
            return Err(too_large());
        }
        Ok((width, height))
    }

    fn encode(&self, img: &RgbImage, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| AnnotatorError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(img)
            .map_err(|e| AnnotatorError::ImageDecode {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

impl StagedCrop {
    /// Bare filename, which is what gets stored on the gesture instance
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Move the crop into the crops directory
    pub fn publish(mut self) -> Result<PathBuf> {
        fs::rename(&self.staged_path, &self.final_path)
            .map_err(|e| AnnotatorError::io(&self.final_path, e))?;
        self.settled = true;
        Ok(self.final_path.clone())
    }

    /// Remove the staged file
    pub fn discard(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if let Err(e) = fs::remove_file(&self.staged_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.staged_path.display(),
                    error = %e,
                    "failed to remove staged crop"
                );
            }
        }
    }
}

impl Drop for StagedCrop {
    fn drop(&mut self) {
        self.discard();
    }
}

/// 128 random bits, hex encoded, plus the fixed extension
pub fn new_crop_filename() -> String {
    format!("{}.{}", Uuid::new_v4().simple(), CROP_EXTENSION)
}

/// Copy `pixel_box` out of `img`. Parts of the box outside the image stay black.
fn extract(img: &DynamicImage, pixel_box: PixelBox, width: u32, height: u32) -> RgbImage {
    let (img_w, img_h) = img.dimensions();

    let inside = pixel_box.left >= 0
        && pixel_box.top >= 0
        && pixel_box.right <= i64::from(img_w)
        && pixel_box.bottom <= i64::from(img_h);
    if inside {
        return img
            .crop_imm(pixel_box.left as u32, pixel_box.top as u32, width, height)
            .to_rgb8();
    }

    let mut canvas = RgbImage::new(width, height);
    imageops::overlay(&mut canvas, &img.to_rgb8(), -pixel_box.left, -pixel_box.top);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn write_source(dir: &Path, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let path = dir.join("source.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_crop_has_box_dimensions() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 120, 80);
        let service = CropService::new(dir.path().join("crops"), 90);

        let staged = service
            .crop(&source, PixelBox { left: 10, top: 20, right: 50, bottom: 60 })
            .unwrap();
        assert!(staged.staged_path().exists());
        assert!(staged.filename().ends_with(".jpg"));

        let published = staged.publish().unwrap();
        assert!(published.exists());
        let crop = image::open(&published).unwrap();
        assert_eq!(crop.dimensions(), (40, 40));
    }

    #[test]
    fn test_dropped_crop_is_discarded() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 60, 40);
        let service = CropService::new(dir.path().join("crops"), 90);

        let staged = service
            .crop(&source, PixelBox { left: 0, top: 0, right: 30, bottom: 20 })
            .unwrap();
        let staged_path = staged.staged_path().to_path_buf();
        drop(staged);

        assert!(!staged_path.exists());
        let published: Vec<_> = fs::read_dir(service.crops_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert!(published.is_empty());
    }

    #[test]
    fn test_box_outside_image_is_padded() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 40, 40);
        let service = CropService::new(dir.path().join("crops"), 100);

        let staged = service
            .crop(&source, PixelBox { left: -20, top: 0, right: 20, bottom: 10 })
            .unwrap();
        let crop = image::open(staged.publish().unwrap()).unwrap().to_rgb8();
        assert_eq!(crop.dimensions(), (40, 10));
        // left half falls outside the source
        assert!(crop.get_pixel(2, 5)[0] < 30);
        assert!(crop.get_pixel(35, 5)[0] > 220);
    }

    #[test]
    fn test_missing_source_is_decode_error() {
        let dir = tempdir().unwrap();
        let service = CropService::new(dir.path().join("crops"), 90);
        let err = service
            .crop(
                &dir.path().join("nope.png"),
                PixelBox { left: 0, top: 0, right: 1, bottom: 1 },
            )
            .unwrap_err();
        assert_eq!(err.category(), "image_decode");
    }

    #[test]
    fn test_empty_box_is_rejected() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 40, 40);
        let service = CropService::new(dir.path().join("crops"), 90);
        let err = service
            .crop(&source, PixelBox { left: 5, top: 5, right: 5, bottom: 30 })
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Validation { .. }));
    }

    #[test]
    fn test_oversized_box_is_rejected_before_allocating() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 100, 100);
        let service = CropService::new(dir.path().join("crops"), 90);

        // 1e12 pixels, far past the default cap
        let err = service
            .crop(&source, PixelBox { left: 0, top: 0, right: 1_000_000, bottom: 1_000_000 })
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Validation { .. }));

        // wider than a u32
        let err = service
            .crop(&source, PixelBox { left: 0, top: 0, right: 4_294_967_306, bottom: 10 })
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Validation { .. }));

        // within the pixel cap but past the JPEG side limit
        let err = service
            .crop(&source, PixelBox { left: 0, top: 0, right: 70_000, bottom: 1 })
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Validation { .. }));

        assert!(!dir.path().join("crops").join(STAGING_DIRNAME).exists());
    }

    #[test]
    fn test_pixel_cap_is_configurable() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 40, 40);
        let service = CropService::new(dir.path().join("crops"), 90).with_max_pixels(100);

        assert!(service
            .crop(&source, PixelBox { left: 0, top: 0, right: 10, bottom: 10 })
            .is_ok());
        assert!(service
            .crop(&source, PixelBox { left: 0, top: 0, right: 11, bottom: 10 })
            .is_err());
    }

    #[test]
    fn test_filenames_are_distinct() {
        let names: HashSet<String> = (0..1000).map(|_| new_crop_filename()).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| n.len() == 32 + 4));
    }
}
