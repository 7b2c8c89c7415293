//! Preset data model.
//!
//! City presets live in a `country -> state/province -> [city]` tree, client
//! presets in a flat list. Both are persisted as whole documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Document version written with every city preset save.
pub const CITY_DOCUMENT_VERSION: &str = "2.0";

/// Version assumed for a client document that does not carry one.
pub const DEFAULT_CLIENT_DOCUMENT_VERSION: &str = "1.0";

/// `country -> state/province -> cities`, ordered by key.
pub type CityTree = BTreeMap<String, BTreeMap<String, Vec<CityPreset>>>;

// ─────────────────────────────────────────────────────────────────────────────
// City Presets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Bounding quadrilateral of a city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundaries {
    pub top_left: LatLng,
    pub top_right: LatLng,
    pub bottom_left: LatLng,
    pub bottom_right: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityPreset {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub center: LatLng,
    pub boundaries: Boundaries,
    #[serde(default)]
    pub zoom_level: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub sublocation: Option<String>,
    /// Keys this client does not model, such as `state_province`. Written
    /// back untouched on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET`/`POST /api/presets/city`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityPresetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// A document without `countries` is an empty tree.
    #[serde(default)]
    pub countries: CityTree,
}

impl CityPresetDocument {
    /// Document sent on save.
    pub fn for_save(countries: CityTree) -> Self {
        Self {
            version: Some(CITY_DOCUMENT_VERSION.to_string()),
            countries,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Presets
// ─────────────────────────────────────────────────────────────────────────────

/// Contact metadata template. Optional fields are never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPreset {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub creator_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_string_as_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_list_as_none")]
    pub keywords: Option<Vec<String>>,
    /// Unmodelled keys, written back untouched on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientPreset {
    /// Maps blank optional fields to `None` and drops blank keywords.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.creator,
            &mut self.creator_title,
            &mut self.address,
            &mut self.city,
            &mut self.state,
            &mut self.postal_code,
            &mut self.country,
            &mut self.phone,
            &mut self.email,
            &mut self.url,
        ] {
            *field = field.take().filter(|v| !v.trim().is_empty());
        }
        self.keywords = self.keywords.take().and_then(clean_keywords);
        self
    }

    /// Parses a comma-separated keyword list as typed in the preset editor.
    pub fn parse_keywords(raw: &str) -> Option<Vec<String>> {
        clean_keywords(raw.split(',').map(str::to_string).collect())
    }
}

/// Body of `GET`/`POST /api/presets/client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPresetDocument {
    #[serde(default = "default_client_version")]
    pub version: String,
    #[serde(default)]
    pub presets: Vec<ClientPreset>,
}

impl Default for ClientPresetDocument {
    fn default() -> Self {
        Self {
            version: default_client_version(),
            presets: Vec::new(),
        }
    }
}

fn default_client_version() -> String {
    DEFAULT_CLIENT_DOCUMENT_VERSION.to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn clean_keywords(keywords: Vec<String>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

fn empty_list_as_none<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Vec<String>>::deserialize(deserializer)?;
    Ok(value.and_then(clean_keywords))
}
