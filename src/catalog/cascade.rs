//! Metadata cascade
//!
//! Turns one structured notes payload into ordered inserts: the icon first,
//! then the rows that need its generated id. Everything runs on the caller's
//! transaction; nothing here commits or rolls back.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::config::VariantPolicy;
use crate::error::{AnnotatorError, Result};
use crate::state::library::{find_variant, update_image_provenance};
use crate::state::notes::{CatalogMetadata, IconImageMetadata, IconMetadata, InscriptionMetadata};

/// Rows written by one cascade run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub image_updated: bool,
    pub icon_id: Option<i64>,
    pub icon_image_id: Option<i64>,
    pub inscription_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataCascade {
    variant_policy: VariantPolicy,
}

impl MetadataCascade {
    pub fn new(variant_policy: VariantPolicy) -> Self {
        Self { variant_policy }
    }

    /// Apply `metadata` against the already-persisted image `image_id`.
    ///
    /// Each run creates a fresh icon subtree; existing icons are never merged into.
    pub fn apply(
        &self,
        conn: &Connection,
        metadata: &CatalogMetadata,
        image_id: i64,
    ) -> Result<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();

        if let Some(image) = metadata.image_update() {
            outcome.image_updated = update_image_provenance(
                conn,
                image_id,
                image.source.as_deref(),
                image.location.as_deref(),
            )?;
        }

        let Some(icon) = metadata.icon() else {
            tracing::debug!(image_id, "notes metadata carries no icon; image update only");
            return Ok(outcome);
        };

        self.check_variant(conn, icon)?;
        let icon_id = insert_icon(conn, icon)?;
        outcome.icon_id = Some(icon_id);

        if let Some(icon_image) = metadata.icon_image() {
            outcome.icon_image_id = Some(insert_icon_image(conn, icon_id, icon_image)?);
        }

        for inscription in &metadata.icon_inscriptions {
            outcome
                .inscription_ids
                .push(insert_inscription(conn, icon_id, inscription)?);
        }

        tracing::info!(
            image_id,
            icon_id,
            icon_image = outcome.icon_image_id.is_some(),
            inscriptions = outcome.inscription_ids.len(),
            "catalogued icon from notes metadata"
        );
        Ok(outcome)
    }

    fn check_variant(&self, conn: &Connection, icon: &IconMetadata) -> Result<()> {
        let Some(variant_id) = icon.iconographic_variant_id else {
            return Ok(());
        };
        match self.variant_policy {
            VariantPolicy::AcceptUnchecked => Ok(()),
            VariantPolicy::RequireExisting => match find_variant(conn, variant_id)? {
                Some(_) => Ok(()),
                None => Err(AnnotatorError::InvalidReference {
                    field: "iconographic_variant_id",
                    id: variant_id,
                }),
            },
        }
    }
}

/// Insert the icon and return its generated id so children can reference it
fn insert_icon(conn: &Connection, icon: &IconMetadata) -> Result<i64> {
    let materials = icon.materials.as_ref().map(serde_json::to_string).transpose()?;
    let techniques = icon.techniques.as_ref().map(serde_json::to_string).transpose()?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO icons (
            iconographic_variant_id, title, object_type, museum_collection_number,
            culture_period, date_approx, place_of_creation, current_location,
            acquisition_method, acquisition_source, acquisition_date, materials,
            techniques, dimensions_mm, image_url, condition_report, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
        params![
            icon.iconographic_variant_id,
            icon.title,
            icon.object_type.as_deref().unwrap_or("icon"),
            icon.museum_collection_number,
            icon.culture_period,
            icon.date_approx,
            icon.place_of_creation,
            icon.current_location,
            icon.acquisition_method,
            icon.acquisition_source,
            icon.acquisition_date,
            materials,
            techniques,
            icon.dimensions_mm,
            icon.image_url,
            icon.condition_report,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_icon_image(conn: &Connection, icon_id: i64, meta: &IconImageMetadata) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO icon_images (
            icon_id, image_url, photographer, copyright_holder, date_taken,
            resolution, lighting_notes, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            icon_id,
            meta.image_url,
            meta.photographer,
            meta.copyright_holder,
            meta.date_taken,
            meta.resolution,
            meta.lighting_notes,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_inscription(conn: &Connection, icon_id: i64, meta: &InscriptionMetadata) -> Result<i64> {
    conn.execute(
        "INSERT INTO icon_inscriptions (
            icon_id, language, text, location_on_icon, script_type, translation
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            icon_id,
            meta.language,
            meta.text,
            meta.location_on_icon,
            meta.script_type,
            meta.translation,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
