//! Join gesture instances with their images and gestures, derive display
//! fields from the notes, and group rows for the report.

use rusqlite::params;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::Result;
use crate::imaging::region::Region;
use crate::state::library::Library;
use crate::state::notes::Notes;

/// Read-only display fields pulled from a row's notes metadata.
///
/// These come from the notes text itself, not from the catalogued icon
/// rows, so they follow later edits to the notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayFields {
    pub icon_title: Option<String>,
    pub culture_period: String,
    pub date_approx: String,
    pub place_of_creation: String,
    pub current_location: String,
    pub dimensions_mm: String,
    /// Comma-joined
    pub materials: String,
    pub source: String,
    pub location: String,
    /// Comma-joined
    pub depicted_figures: String,
    /// Space-joined
    pub interpretation_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub gesture_instance_id: i64,
    pub image_id: i64,
    pub gesture_id: Option<i64>,
    pub cropped_image_path: String,
    pub image_filename: String,
    pub gesture_description: Option<String>,
    #[serde(flatten)]
    pub display: DisplayFields,
}

/// All rows sharing one gesture description; `None` is the "no description" group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportGroup {
    pub description: Option<String>,
    pub rows: Vec<ReportRow>,
}

/// One image with the instances annotated on it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSummary {
    pub id: i64,
    pub filename: String,
    pub upload_timestamp: Option<String>,
    pub gesture_instances: Vec<InstanceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub id: i64,
    pub region_coordinates: Region,
    pub notes: Option<String>,
    /// Gesture name, when classified
    pub gesture: Option<String>,
    pub gesture_id: Option<i64>,
}

impl DisplayFields {
    pub fn from_notes(notes: &Notes) -> Self {
        let Some(metadata) = notes.metadata() else {
            return Self::default();
        };

        let mut fields = Self {
            depicted_figures: metadata.depicted_figures.join(", "),
            interpretation_notes: metadata.interpretation_notes.join(" "),
            ..Self::default()
        };

        if let Some(image) = &metadata.image {
            fields.source = image.source.clone().unwrap_or_default();
            fields.location = image.location.clone().unwrap_or_default();
        }

        if let Some(icon) = &metadata.icon {
            fields.icon_title = icon.title.clone();
            fields.culture_period = icon.culture_period.clone().unwrap_or_default();
            fields.date_approx = icon.date_approx.clone().unwrap_or_default();
            fields.place_of_creation = icon.place_of_creation.clone().unwrap_or_default();
            fields.current_location = icon.current_location.clone().unwrap_or_default();
            fields.dimensions_mm = icon.dimensions_mm.clone().unwrap_or_default();
            fields.materials = icon
                .materials
                .as_ref()
                .map(|m| m.join(", "))
                .unwrap_or_default();
        }

        fields
    }
}

/// Described groups ascending, the undescribed group last
fn compare_descriptions(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort rows by group, then image id, then instance id, and split them into groups
pub fn group_rows(mut rows: Vec<ReportRow>) -> Vec<ReportGroup> {
    rows.sort_by(|a, b| {
        compare_descriptions(&a.gesture_description, &b.gesture_description)
            .then(a.image_id.cmp(&b.image_id))
            .then(a.gesture_instance_id.cmp(&b.gesture_instance_id))
    });

    let mut groups: Vec<ReportGroup> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(group) if group.description == row.gesture_description => group.rows.push(row),
            _ => groups.push(ReportGroup {
                description: row.gesture_description.clone(),
                rows: vec![row],
            }),
        }
    }
    groups
}

pub struct ReportAggregator<'a> {
    library: &'a Library,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(library: &'a Library) -> Self {
        Self { library }
    }

    /// Every gesture instance joined with its image and (if any) gesture
    pub fn rows(&self) -> Result<Vec<ReportRow>> {
        let mut stmt = self.library.connection().prepare(
            "SELECT gi.id, gi.image_id, gi.gesture_id, gi.cropped_image_path, gi.notes,
                    img.filename, g.description
             FROM gesture_instances gi
             JOIN images img ON img.id = gi.image_id
             LEFT JOIN gestures g ON g.id = gi.gesture_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let notes: Option<String> = row.get(4)?;
                let display = notes
                    .as_deref()
                    .map(|text| DisplayFields::from_notes(&Notes::parse(text)))
                    .unwrap_or_default();
                Ok(ReportRow {
                    gesture_instance_id: row.get(0)?,
                    image_id: row.get(1)?,
                    gesture_id: row.get(2)?,
                    cropped_image_path: row.get(3)?,
                    image_filename: row.get(5)?,
                    gesture_description: row.get(6)?,
                    display,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(rows = rows.len(), "report rows loaded");
        Ok(rows)
    }

    pub fn groups(&self) -> Result<Vec<ReportGroup>> {
        Ok(group_rows(self.rows()?))
    }

    /// Images with their nested instances, for JSON consumers
    pub fn image_summaries(&self) -> Result<Vec<ImageSummary>> {
        let mut summaries: Vec<ImageSummary> = self
            .library
            .get_all_images()?
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                filename: image.filename,
                upload_timestamp: Some(image.upload_timestamp).filter(|t| !t.is_empty()),
                gesture_instances: Vec::new(),
            })
            .collect();

        let mut stmt = self.library.connection().prepare(
            "SELECT gi.image_id, gi.id, gi.region_coordinates, gi.notes, g.name, gi.gesture_id
             FROM gesture_instances gi
             LEFT JOIN gestures g ON g.id = gi.gesture_id
             WHERE gi.image_id = ?1
             ORDER BY gi.id",
        )?;

        for summary in &mut summaries {
            summary.gesture_instances = stmt
                .query_map(params![summary.id], |row| {
                    let region_json: String = row.get(2)?;
                    let region_coordinates = serde_json::from_str(&region_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(InstanceSummary {
                        id: row.get(1)?,
                        region_coordinates,
                        notes: row.get(3)?,
                        gesture: row.get(4)?,
                        gesture_id: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }

        Ok(summaries)
    }
}
