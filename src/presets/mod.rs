//! City and client presets.
//!
//! - `model` - wire and in-memory types
//! - `remote` - preset backend trait and HTTP adapter
//! - `store` - in-memory mirror with CRUD merge semantics
//! - `selector` - country/state/city cascading selection
//! - `prefill` - contact form prefill from a client preset

use std::fmt;

use serde::Serialize;

pub mod model;
pub mod prefill;
pub mod remote;
pub mod selector;
pub mod store;

pub use model::{
    Boundaries, CityPreset, CityPresetDocument, CityTree, ClientPreset, ClientPresetDocument,
    LatLng,
};
pub use remote::{HttpPresetBackend, PresetBackend};
pub use store::PresetStore;

/// The two preset datasets, loaded and persisted independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetFamily {
    City,
    Client,
}

impl PresetFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetFamily::City => "city",
            PresetFamily::Client => "client",
        }
    }
}

impl fmt::Display for PresetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives a preset ID from its display name: lowercase, with every run of
/// characters outside `[a-z0-9]` collapsed into a single `_`.
pub fn derive_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut in_separator = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            id.push(c);
            in_separator = false;
        } else if !in_separator {
            id.push('_');
            in_separator = true;
        }
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_collapses_separator_runs() {
        assert_eq!(derive_id("New York City"), "new_york_city");
        assert_eq!(derive_id("Saint-Denis  (Réunion)"), "saint_denis_r_union_");
        assert_eq!(derive_id("ACME Corp."), "acme_corp_");
        assert_eq!(derive_id("  Lyon"), "_lyon");
        assert_eq!(derive_id("zone 51"), "zone_51");
    }

    #[test]
    fn derive_id_is_stable() {
        let once = derive_id("Rio de Janeiro");
        assert_eq!(derive_id("rio de janeiro"), once);
        assert_eq!(derive_id(&once), once);
    }

    #[test]
    fn family_displays_lowercase() {
        assert_eq!(PresetFamily::City.to_string(), "city");
        assert_eq!(PresetFamily::Client.to_string(), "client");
    }
}
