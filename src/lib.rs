//! # Gesture Annotator
//!
//! Annotate gesture regions on uploaded images and build a catalogue from them.
//!
//! - Selections arrive in a fixed 600x400 canvas and are mapped onto the
//!   real image before cropping ([`imaging::region`]).
//! - Crops are staged and only published once the database commit succeeds
//!   ([`imaging::crop`], [`workflow`]).
//! - Notes may embed a JSON object describing the depicted icon; it is
//!   cascaded into the icon catalogue tables ([`state::notes`], [`catalog`]).
//! - A grouped HTML report joins everything back together ([`report`]).
//!
//! ```rust,no_run
//! use gesture_annotator::{AnnotateRequest, AnnotationWorkflow, AppConfig, Region};
//! use std::path::Path;
//!
//! let mut workflow = AnnotationWorkflow::open(AppConfig::from_data_dir("/tmp/annotator"))?;
//! let upload = workflow.upload_path(Path::new("icon.jpg"))?;
//! let saved = workflow.annotate(&AnnotateRequest::new(
//!     upload.image_id,
//!     Region::new(300.0, 200.0, -100.0, 50.0),
//! ))?;
//! println!("crop: {}", saved.cropped_image_path);
//! # Ok::<(), gesture_annotator::AnnotatorError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod imaging;
pub mod report;
pub mod state;
pub mod workflow;

pub use config::{AppConfig, VariantPolicy};
pub use error::{AnnotatorError, ErrorResponse, Result};
pub use imaging::region::{PixelBox, Region};
pub use report::{ReportAggregator, ReportLinks};
pub use state::library::Library;
pub use state::notes::Notes;
pub use workflow::{AnnotateRequest, AnnotateResponse, AnnotationWorkflow, UploadResponse};
