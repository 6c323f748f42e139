//! Notes field parsing
//!
//! A notes string is either free text or a JSON object carrying catalogue
//! metadata. The decision is made once, here, and carried as a tagged value
//! by both the annotation workflow and the report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parsed notes, always keeping the original text
#[derive(Debug, Clone, PartialEq)]
pub enum Notes {
    /// Opaque annotation text (including malformed JSON)
    Plain(String),
    /// A JSON object we could read as catalogue metadata
    Structured {
        raw: String,
        metadata: CatalogMetadata,
    },
}

/// Everything the notes JSON may carry. Unknown keys are ignored.
///
/// Every field is read leniently: numbers and booleans are accepted where
/// text is expected, `null` or an unusable value counts as absent, and a
/// lone string stands in for a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogMetadata {
    #[serde(deserialize_with = "lenient::object")]
    pub image: Option<ImageMetadata>,
    #[serde(deserialize_with = "lenient::object")]
    pub icon: Option<IconMetadata>,
    #[serde(deserialize_with = "lenient::object")]
    pub icon_image: Option<IconImageMetadata>,
    #[serde(deserialize_with = "lenient::objects")]
    pub icon_inscriptions: Vec<InscriptionMetadata>,
    #[serde(deserialize_with = "lenient::strings")]
    pub depicted_figures: Vec<String>,
    #[serde(deserialize_with = "lenient::strings")]
    pub interpretation_notes: Vec<String>,
}

/// Provenance overrides for the annotated image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageMetadata {
    #[serde(deserialize_with = "lenient::text")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconMetadata {
    #[serde(deserialize_with = "lenient::id")]
    pub iconographic_variant_id: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub object_type: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub museum_collection_number: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub culture_period: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub date_approx: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub place_of_creation: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub current_location: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub acquisition_method: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub acquisition_source: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub acquisition_date: Option<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub materials: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub techniques: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient::text")]
    pub dimensions_mm: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub image_url: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub condition_report: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconImageMetadata {
    #[serde(deserialize_with = "lenient::text")]
    pub image_url: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub photographer: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub copyright_holder: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub date_taken: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub resolution: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub lighting_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InscriptionMetadata {
    #[serde(deserialize_with = "lenient::text")]
    pub language: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub location_on_icon: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub script_type: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub translation: Option<String>,
}

impl Notes {
    /// Classify a notes string.
    ///
    /// Only text whose first non-whitespace character is `{` is tried as
    /// JSON. Any well-formed JSON object is structured; malformed JSON is
    /// not an error, the text just stays plain.
    pub fn parse(text: &str) -> Self {
        let raw = text.to_string();
        if !text.trim_start().starts_with('{') {
            return Notes::Plain(raw);
        }

        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => value,
            Ok(_) => return Notes::Plain(raw),
            Err(e) => {
                tracing::debug!(error = %e, "notes look like JSON but do not parse; keeping as text");
                return Notes::Plain(raw);
            }
        };

        match CatalogMetadata::deserialize(value) {
            Ok(metadata) => Notes::Structured { raw, metadata },
            Err(e) => {
                tracing::debug!(error = %e, "notes object not readable as metadata; keeping as text");
                Notes::Plain(raw)
            }
        }
    }

    /// The text exactly as submitted
    pub fn as_str(&self) -> &str {
        match self {
            Notes::Plain(raw) | Notes::Structured { raw, .. } => raw,
        }
    }

    pub fn metadata(&self) -> Option<&CatalogMetadata> {
        match self {
            Notes::Plain(_) => None,
            Notes::Structured { metadata, .. } => Some(metadata),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Notes::Structured { .. })
    }
}

/// Field readers that take whatever JSON value is present
mod lenient {
    use serde::de::{DeserializeOwned, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    fn scalar_text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn text_items(value: Value) -> Option<Vec<String>> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(items.into_iter().filter_map(scalar_text).collect()),
            other => scalar_text(other).map(|s| vec![s]),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_text(Value::deserialize(de)?))
    }

    pub fn text_list<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<String>>, D::Error> {
        Ok(text_items(Value::deserialize(de)?))
    }

    pub fn strings<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
        Ok(text_items(Value::deserialize(de)?).unwrap_or_default())
    }

    /// Integers, integral floats, or strings holding an integer
    pub fn id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// A nested object; anything that is not an object counts as absent
    pub fn object<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(de)? {
            value @ Value::Object(_) => T::deserialize(value).ok(),
            _ => None,
        })
    }

    /// A list of objects; a lone object is a one-element list, other elements are skipped
    pub fn objects<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let items = match Value::deserialize(de)? {
            Value::Array(items) => items,
            value @ Value::Object(_) => vec![value],
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|value| T::deserialize(value).ok())
            .collect())
    }
}

impl CatalogMetadata {
    /// Image-level provenance, if the payload carries any
    pub fn image_update(&self) -> Option<&ImageMetadata> {
        self.image
            .as_ref()
            .filter(|m| m.source.is_some() || m.location.is_some())
    }

    /// The icon object, unless absent or empty
    pub fn icon(&self) -> Option<&IconMetadata> {
        self.icon.as_ref().filter(|m| **m != IconMetadata::default())
    }

    /// The icon image object, unless absent or empty
    pub fn icon_image(&self) -> Option<&IconImageMetadata> {
        self.icon_image
            .as_ref()
            .filter(|m| **m != IconImageMetadata::default())
    }
}
