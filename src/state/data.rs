//! Shared data structures for the annotation catalogue
//!
//! These structs mirror the rows stored by the library and are what
//! flows between the database layer, the workflow and the report.

use serde::{Deserialize, Serialize};

use crate::imaging::region::Region;

/// An uploaded source image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Unique database ID
    pub id: i64,
    /// Sanitized filename inside the uploads directory
    pub filename: String,
    /// Provenance: where the photograph came from
    pub source: Option<String>,
    /// Provenance: where the depicted object is held
    pub location: Option<String>,
    /// RFC 3339 timestamp set on upload
    pub upload_timestamp: String,
}

/// A controlled-vocabulary gesture label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A named scheme for labelling gestures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSystem {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A gesture's label within one classification system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationLabel {
    pub id: i64,
    pub classification_system_id: i64,
    pub gesture_id: i64,
    pub gesture_name: String,
    pub label: Option<String>,
}

/// One annotated region on an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureInstance {
    pub id: i64,
    pub image_id: i64,
    /// `None` means the region is unclassified
    pub gesture_id: Option<i64>,
    /// UI-space rectangle exactly as submitted
    pub region_coordinates: Region,
    /// Crop filename; empty until the crop step has completed
    pub cropped_image_path: String,
    /// Raw notes text, possibly carrying embedded metadata
    pub notes: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconographicType {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub feast_association: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconographicVariant {
    pub id: i64,
    pub iconographic_type_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub regional_school: Option<String>,
    pub date_range: Option<String>,
    pub composition_notes: Option<String>,
    pub feast_association: Option<String>,
}

/// A catalogued icon, created by the metadata cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub id: i64,
    pub iconographic_variant_id: Option<i64>,
    pub title: String,
    pub object_type: String,
    pub museum_collection_number: Option<String>,
    pub culture_period: Option<String>,
    pub date_approx: Option<String>,
    pub place_of_creation: Option<String>,
    pub current_location: Option<String>,
    pub acquisition_method: Option<String>,
    pub acquisition_source: Option<String>,
    pub acquisition_date: Option<String>,
    pub materials: Option<Vec<String>>,
    pub techniques: Option<Vec<String>>,
    pub dimensions_mm: Option<String>,
    pub image_url: Option<String>,
    pub condition_report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconImage {
    pub id: i64,
    pub icon_id: i64,
    pub image_url: String,
    pub photographer: Option<String>,
    pub copyright_holder: Option<String>,
    pub date_taken: Option<String>,
    pub resolution: Option<String>,
    pub lighting_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconInscription {
    pub id: i64,
    pub icon_id: i64,
    pub language: Option<String>,
    pub text: Option<String>,
    pub location_on_icon: Option<String>,
    pub script_type: Option<String>,
    pub translation: Option<String>,
}
