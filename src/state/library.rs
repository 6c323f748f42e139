use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};

use super::data::{
    ClassificationLabel, ClassificationSystem, Gesture, GestureInstance, Icon, IconImage, IconInscription, IconographicType,
    IconographicVariant, Image,
};
use crate::error::Result;
use crate::imaging::region::Region;

/// Tables, indexes and triggers. Every statement is idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    filename            TEXT NOT NULL,
    source              TEXT,
    location            TEXT,
    upload_timestamp    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gestures (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT
);

CREATE TABLE IF NOT EXISTS gesture_instances (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id            INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    gesture_id          INTEGER REFERENCES gestures(id),
    region_coordinates  TEXT NOT NULL,
    cropped_image_path  TEXT NOT NULL DEFAULT '',
    notes               TEXT,
    embedding           BLOB
);

CREATE TABLE IF NOT EXISTS classification_systems (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT
);

CREATE TABLE IF NOT EXISTS classification_system_gestures (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    classification_system_id    INTEGER NOT NULL REFERENCES classification_systems(id) ON DELETE CASCADE,
    gesture_id                  INTEGER NOT NULL REFERENCES gestures(id) ON DELETE CASCADE,
    label                       TEXT
);

CREATE INDEX IF NOT EXISTS idx_gesture_instances_image_id
    ON gesture_instances(image_id);

CREATE TABLE IF NOT EXISTS iconographic_types (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    title               TEXT NOT NULL,
    description         TEXT,
    feast_association   TEXT,
    notes               TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS iconographic_variants (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    iconographic_type_id    INTEGER NOT NULL REFERENCES iconographic_types(id) ON DELETE CASCADE,
    title                   TEXT NOT NULL,
    description             TEXT,
    regional_school         TEXT,
    date_range              TEXT,
    composition_notes       TEXT,
    feast_association       TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

-- iconographic_variant_id is not a declared foreign key;
-- unknown ids are accepted unless the caller's policy checks them.
CREATE TABLE IF NOT EXISTS icons (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    iconographic_variant_id     INTEGER,
    title                       TEXT NOT NULL,
    object_type                 TEXT NOT NULL DEFAULT 'icon',
    museum_collection_number    TEXT,
    culture_period              TEXT,
    date_approx                 TEXT,
    place_of_creation           TEXT,
    current_location            TEXT,
    acquisition_method          TEXT,
    acquisition_source          TEXT,
    acquisition_date            TEXT,
    materials                   TEXT,
    techniques                  TEXT,
    dimensions_mm               TEXT,
    image_url                   TEXT,
    condition_report            TEXT,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_icons_variant_id
    ON icons(iconographic_variant_id);

CREATE TRIGGER IF NOT EXISTS trg_variant_delete_icons
AFTER DELETE ON iconographic_variants
BEGIN
    DELETE FROM icons WHERE iconographic_variant_id = OLD.id;
END;

CREATE TABLE IF NOT EXISTS icon_images (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    icon_id             INTEGER NOT NULL REFERENCES icons(id) ON DELETE CASCADE,
    image_url           TEXT NOT NULL,
    photographer        TEXT,
    copyright_holder    TEXT,
    date_taken          TEXT,
    resolution          TEXT,
    lighting_notes      TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS icon_inscriptions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    icon_id             INTEGER NOT NULL REFERENCES icons(id) ON DELETE CASCADE,
    language            TEXT,
    text                TEXT,
    location_on_icon    TEXT,
    script_type         TEXT,
    translation         TEXT
);
"#;

/// The Library manages the SQLite annotation catalogue.
/// It stores uploaded images, the gesture vocabulary, annotated regions
/// and the icon catalogue hierarchy.
pub struct Library {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the catalogue at `db_path` and initialize the schema
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| crate::error::AnnotatorError::io(parent, e))?;
            }
        }

        let conn = Connection::open(db_path)?;
        tracing::info!(path = %db_path.display(), "database opened");

        let mut library = Library {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// A private catalogue that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let mut library = Library {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    fn init_schema(&mut self) -> Result<()> {
        // cascades and gesture references depend on this; it is per-connection
        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.conn.execute_batch(SCHEMA)?;
        tracing::debug!("database schema initialized");
        Ok(())
    }

    /// Get the path to the database file (`None` for in-memory catalogues)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction; dropping it without commit rolls back
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Get a count of images in the library
    pub fn image_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Record a newly uploaded file. Returns the new image ID
    pub fn insert_image(&self, filename: &str) -> Result<i64> {
        insert_image(&self.conn, filename)
    }

    pub fn get_image(&self, id: i64) -> Result<Option<Image>> {
        find_image(&self.conn, id)
    }

    /// Get all images ordered by id
    pub fn get_all_images(&self) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, filename, source, location, upload_timestamp FROM images ORDER BY id",
        )?;
        let images = stmt
            .query_map([], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    /// Delete an image together with its gesture instances.
    /// Returns false if no such image existed
    pub fn delete_image(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Gesture vocabulary
    // ========================================================================

    pub fn add_gesture(&self, name: &str, description: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO gestures (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_gesture(&self, id: i64) -> Result<Option<Gesture>> {
        find_gesture(&self.conn, id)
    }

    /// The full controlled vocabulary, ordered by id
    pub fn list_gestures(&self) -> Result<Vec<Gesture>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM gestures ORDER BY id")?;
        let gestures = stmt
            .query_map([], gesture_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(gestures)
    }

    // ========================================================================
    // Classification systems
    // ========================================================================

    pub fn add_classification_system(&self, name: &str, description: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO classification_systems (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_classification_systems(&self) -> Result<Vec<ClassificationSystem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM classification_systems ORDER BY id")?;
        let systems = stmt
            .query_map([], |row| {
                Ok(ClassificationSystem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(systems)
    }

    /// Label a gesture within a classification system. Returns the mapping id
    pub fn label_gesture(
        &self,
        classification_system_id: i64,
        gesture_id: i64,
        label: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO classification_system_gestures (classification_system_id, gesture_id, label)
             VALUES (?1, ?2, ?3)",
            params![classification_system_id, gesture_id, label],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Every gesture label in one system, ordered by mapping id
    pub fn classification_labels(
        &self,
        classification_system_id: i64,
    ) -> Result<Vec<ClassificationLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT csg.id, csg.classification_system_id, csg.gesture_id, g.name, csg.label
             FROM classification_system_gestures csg
             JOIN gestures g ON g.id = csg.gesture_id
             WHERE csg.classification_system_id = ?1
             ORDER BY csg.id",
        )?;
        let labels = stmt
            .query_map(params![classification_system_id], |row| {
                Ok(ClassificationLabel {
                    id: row.get(0)?,
                    classification_system_id: row.get(1)?,
                    gesture_id: row.get(2)?,
                    gesture_name: row.get(3)?,
                    label: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    // ========================================================================
    // Gesture instances
    // ========================================================================

    pub fn get_gesture_instance(&self, id: i64) -> Result<Option<GestureInstance>> {
        let instance = self
            .conn
            .query_row(
                &format!("{INSTANCE_SELECT} WHERE id = ?1"),
                params![id],
                instance_from_row,
            )
            .optional()?;
        Ok(instance)
    }

    pub fn gesture_instances_for_image(&self, image_id: i64) -> Result<Vec<GestureInstance>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INSTANCE_SELECT} WHERE image_id = ?1 ORDER BY id"))?;
        let instances = stmt
            .query_map(params![image_id], instance_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(instances)
    }

    pub fn gesture_instance_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM gesture_instances", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Attach an embedding vector to an existing instance
    pub fn set_instance_embedding(&self, id: i64, embedding: &[f32]) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE gesture_instances SET embedding = ?1 WHERE id = ?2",
            params![embedding_to_bytes(embedding), id],
        )?;
        Ok(updated > 0)
    }

    // ========================================================================
    // Icon catalogue
    // ========================================================================

    pub fn add_iconographic_type(
        &self,
        title: &str,
        description: Option<&str>,
        feast_association: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO iconographic_types (title, description, feast_association, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![title, description, feast_association, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_iconographic_variant(
        &self,
        iconographic_type_id: i64,
        title: &str,
        regional_school: Option<&str>,
        date_range: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO iconographic_variants
                (iconographic_type_id, title, regional_school, date_range, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![iconographic_type_id, title, regional_school, date_range, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_iconographic_type(&self, id: i64) -> Result<Option<IconographicType>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, description, feast_association, notes
                 FROM iconographic_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(IconographicType {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                        feast_association: row.get(3)?,
                        notes: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_iconographic_variant(&self, id: i64) -> Result<Option<IconographicVariant>> {
        find_variant(&self.conn, id)
    }

    pub fn delete_iconographic_variant(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM iconographic_variants WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Every icon, oldest first
    pub fn list_icons(&self) -> Result<Vec<Icon>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, iconographic_variant_id, title, object_type, museum_collection_number,
                    culture_period, date_approx, place_of_creation, current_location,
                    acquisition_method, acquisition_source, acquisition_date, materials,
                    techniques, dimensions_mm, image_url, condition_report
             FROM icons ORDER BY id",
        )?;
        let icons = stmt
            .query_map([], icon_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(icons)
    }

    pub fn icon_images_for(&self, icon_id: i64) -> Result<Vec<IconImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, icon_id, image_url, photographer, copyright_holder, date_taken,
                    resolution, lighting_notes
             FROM icon_images WHERE icon_id = ?1 ORDER BY id",
        )?;
        let images = stmt
            .query_map(params![icon_id], |row| {
                Ok(IconImage {
                    id: row.get(0)?,
                    icon_id: row.get(1)?,
                    image_url: row.get(2)?,
                    photographer: row.get(3)?,
                    copyright_holder: row.get(4)?,
                    date_taken: row.get(5)?,
                    resolution: row.get(6)?,
                    lighting_notes: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    pub fn inscriptions_for(&self, icon_id: i64) -> Result<Vec<IconInscription>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, icon_id, language, text, location_on_icon, script_type, translation
             FROM icon_inscriptions WHERE icon_id = ?1 ORDER BY id",
        )?;
        let inscriptions = stmt
            .query_map(params![icon_id], |row| {
                Ok(IconInscription {
                    id: row.get(0)?,
                    icon_id: row.get(1)?,
                    language: row.get(2)?,
                    text: row.get(3)?,
                    location_on_icon: row.get(4)?,
                    script_type: row.get(5)?,
                    translation: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(inscriptions)
    }

    /// Row counts for (icons, icon_images, icon_inscriptions)
    pub fn icon_counts(&self) -> Result<(i64, i64, i64)> {
        let counts = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM icons),
                    (SELECT COUNT(*) FROM icon_images),
                    (SELECT COUNT(*) FROM icon_inscriptions)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(counts)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

// ============================================================================
// Statement helpers shared by Library and by code running inside a Transaction
// (a Transaction derefs to Connection)
// ============================================================================

const INSTANCE_SELECT: &str = "SELECT id, image_id, gesture_id, region_coordinates, \
     cropped_image_path, notes, embedding FROM gesture_instances";

pub fn insert_image(conn: &Connection, filename: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO images (filename, upload_timestamp) VALUES (?1, ?2)",
        params![filename, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_image(conn: &Connection, id: i64) -> Result<Option<Image>> {
    let image = conn
        .query_row(
            "SELECT id, filename, source, location, upload_timestamp FROM images WHERE id = ?1",
            params![id],
            image_from_row,
        )
        .optional()?;
    Ok(image)
}

/// Overwrite provenance fields that are `Some`; `None` leaves the stored value alone
pub fn update_image_provenance(
    conn: &Connection,
    id: i64,
    source: Option<&str>,
    location: Option<&str>,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE images SET source = COALESCE(?1, source), location = COALESCE(?2, location)
         WHERE id = ?3",
        params![source, location, id],
    )?;
    Ok(updated > 0)
}

pub fn find_gesture(conn: &Connection, id: i64) -> Result<Option<Gesture>> {
    let gesture = conn
        .query_row(
            "SELECT id, name, description FROM gestures WHERE id = ?1",
            params![id],
            gesture_from_row,
        )
        .optional()?;
    Ok(gesture)
}

pub fn find_variant(conn: &Connection, id: i64) -> Result<Option<IconographicVariant>> {
    let variant = conn
        .query_row(
            "SELECT id, iconographic_type_id, title, description, regional_school, date_range,
                    composition_notes, feast_association
             FROM iconographic_variants WHERE id = ?1",
            params![id],
            |row| {
                Ok(IconographicVariant {
                    id: row.get(0)?,
                    iconographic_type_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    regional_school: row.get(4)?,
                    date_range: row.get(5)?,
                    composition_notes: row.get(6)?,
                    feast_association: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(variant)
}

/// Insert a gesture instance with an empty crop path. Returns its id
pub fn insert_gesture_instance(
    conn: &Connection,
    image_id: i64,
    gesture_id: Option<i64>,
    region: &Region,
    notes: Option<&str>,
) -> Result<i64> {
    let region_json = serde_json::to_string(region)?;
    conn.execute(
        "INSERT INTO gesture_instances (image_id, gesture_id, region_coordinates, cropped_image_path, notes)
         VALUES (?1, ?2, ?3, '', ?4)",
        params![image_id, gesture_id, region_json, notes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_cropped_image_path(conn: &Connection, instance_id: i64, filename: &str) -> Result<()> {
    conn.execute(
        "UPDATE gesture_instances SET cropped_image_path = ?1 WHERE id = ?2",
        params![filename, instance_id],
    )?;
    Ok(())
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        filename: row.get(1)?,
        source: row.get(2)?,
        location: row.get(3)?,
        upload_timestamp: row.get(4)?,
    })
}

fn gesture_from_row(row: &Row<'_>) -> rusqlite::Result<Gesture> {
    Ok(Gesture {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<GestureInstance> {
    let region_json: String = row.get(3)?;
    let region_coordinates = serde_json::from_str(&region_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let embedding: Option<Vec<u8>> = row.get(6)?;

    Ok(GestureInstance {
        id: row.get(0)?,
        image_id: row.get(1)?,
        gesture_id: row.get(2)?,
        region_coordinates,
        cropped_image_path: row.get(4)?,
        notes: row.get(5)?,
        embedding: embedding.map(|bytes| bytes_to_embedding(&bytes)),
    })
}

fn icon_from_row(row: &Row<'_>) -> rusqlite::Result<Icon> {
    Ok(Icon {
        id: row.get(0)?,
        iconographic_variant_id: row.get(1)?,
        title: row.get(2)?,
        object_type: row.get(3)?,
        museum_collection_number: row.get(4)?,
        culture_period: row.get(5)?,
        date_approx: row.get(6)?,
        place_of_creation: row.get(7)?,
        current_location: row.get(8)?,
        acquisition_method: row.get(9)?,
        acquisition_source: row.get(10)?,
        acquisition_date: row.get(11)?,
        materials: string_list(row, 12)?,
        techniques: string_list(row, 13)?,
        dimensions_mm: row.get(14)?,
        image_url: row.get(15)?,
        condition_report: row.get(16)?,
    })
}

/// Text columns holding a JSON array of strings
fn string_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<String>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog").join("annotator.db");
        {
            let library = Library::open(&db_path).unwrap();
            library.insert_image("a.jpg").unwrap();
        }
        let library = Library::open(&db_path).unwrap();
        assert_eq!(library.image_count().unwrap(), 1);
        assert_eq!(library.path(), Some(db_path.as_path()));
    }

    #[test]
    fn test_gesture_names_are_unique() {
        let library = Library::open_in_memory().unwrap();
        library.add_gesture("Blessing", Some("Raised right hand")).unwrap();
        let err = library.add_gesture("Blessing", None).unwrap_err();
        assert_eq!(err.category(), "storage");
        assert_eq!(library.list_gestures().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_gesture_reference_is_refused() {
        let library = Library::open_in_memory().unwrap();
        let image_id = library.insert_image("a.jpg").unwrap();
        let region = Region::new(0.0, 0.0, 10.0, 10.0);
        let result = insert_gesture_instance(library.connection(), image_id, Some(99), &region, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_instance_round_trips_region_and_embedding() {
        let library = Library::open_in_memory().unwrap();
        let image_id = library.insert_image("a.jpg").unwrap();
        let region = Region::new(300.0, 200.0, -100.0, 50.5);
        let id =
            insert_gesture_instance(library.connection(), image_id, None, &region, Some("note"))
                .unwrap();

        let instance = library.get_gesture_instance(id).unwrap().unwrap();
        assert_eq!(instance.region_coordinates, region);
        assert_eq!(instance.cropped_image_path, "");
        assert_eq!(instance.gesture_id, None);
        assert_eq!(instance.embedding, None);

        assert!(library.set_instance_embedding(id, &[0.5, -1.25, 3.0]).unwrap());
        let instance = library.get_gesture_instance(id).unwrap().unwrap();
        assert_eq!(instance.embedding, Some(vec![0.5, -1.25, 3.0]));
    }

    #[test]
    fn test_delete_image_cascades_to_instances() {
        let library = Library::open_in_memory().unwrap();
        let image_id = library.insert_image("a.jpg").unwrap();
        let region = Region::new(0.0, 0.0, 10.0, 10.0);
        insert_gesture_instance(library.connection(), image_id, None, &region, None).unwrap();
        insert_gesture_instance(library.connection(), image_id, None, &region, None).unwrap();
        assert_eq!(library.gesture_instance_count().unwrap(), 2);

        assert!(library.delete_image(image_id).unwrap());
        assert_eq!(library.gesture_instance_count().unwrap(), 0);
        assert!(!library.delete_image(image_id).unwrap());
    }

    #[test]
    fn test_provenance_update_is_partial() {
        let library = Library::open_in_memory().unwrap();
        let id = library.insert_image("a.jpg").unwrap();
        update_image_provenance(library.connection(), id, Some("Archive"), Some("Sinai")).unwrap();
        update_image_provenance(library.connection(), id, None, Some("Athens")).unwrap();

        let image = library.get_image(id).unwrap().unwrap();
        assert_eq!(image.source.as_deref(), Some("Archive"));
        assert_eq!(image.location.as_deref(), Some("Athens"));
    }

    #[test]
    fn test_classification_labels() {
        let library = Library::open_in_memory().unwrap();
        let blessing = library.add_gesture("Blessing", None).unwrap();
        let orans = library.add_gesture("Orans", None).unwrap();
        let system = library
            .add_classification_system("Hand types", Some("Hand position typology"))
            .unwrap();
        library.label_gesture(system, orans, Some("B-2")).unwrap();
        library.label_gesture(system, blessing, None).unwrap();

        let labels = library.classification_labels(system).unwrap();
        let names: Vec<&str> = labels.iter().map(|l| l.gesture_name.as_str()).collect();
        assert_eq!(names, vec!["Orans", "Blessing"]);
        assert_eq!(labels[0].label.as_deref(), Some("B-2"));
        assert_eq!(library.list_classification_systems().unwrap()[0].name, "Hand types");

        // unknown gesture and duplicate system name are refused
        assert!(library.label_gesture(system, 99, None).is_err());
        assert!(library.add_classification_system("Hand types", None).is_err());
    }

    #[test]
    fn test_rolled_back_transaction_leaves_nothing() {
        let mut library = Library::open_in_memory().unwrap();
        {
            let tx = library.transaction().unwrap();
            insert_image(&tx, "a.jpg").unwrap();
            // dropped without commit
        }
        assert_eq!(library.image_count().unwrap(), 0);
    }
}
