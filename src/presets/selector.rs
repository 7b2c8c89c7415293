//! Country → state/province → city cascading selection.
//!
//! Each level's option list is derived from the city tree and the selection
//! of the level above it. Changing a level resets every level below it along
//! with the coordinate fields the city pick fills in.

use serde::Serialize;

use crate::presets::model::{CityPreset, CityTree};
use crate::surface::UiEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorLevel {
    Country,
    State,
    City,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    fn same(text: &str) -> Self {
        Self {
            value: text.to_string(),
            label: text.to_string(),
        }
    }
}

/// Geotagging fields filled by a city pick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinateFields {
    /// Latitude with six decimals, empty when unset.
    pub latitude: String,
    pub longitude: String,
    pub sublocation: String,
    pub use_random_coordinates: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CascadingSelector {
    country: Option<String>,
    state: Option<String>,
    city: Option<CityPreset>,
    country_options: Vec<SelectOption>,
    state_options: Vec<SelectOption>,
    city_options: Vec<SelectOption>,
    fields: CoordinateFields,
}

impl CascadingSelector {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Picks a country (empty clears it). States are repopulated; the city
    /// level and coordinate fields are always reset.
    pub fn select_country(&mut self, tree: &CityTree, country: &str) -> Vec<UiEvent> {
        self.country = tree.contains_key(country).then(|| country.to_string());
        self.state = None;
        self.city = None;
        self.fields = CoordinateFields::default();

        self.state_options = state_options(tree, self.country.as_deref());
        self.city_options.clear();

        vec![self.options_event(SelectorLevel::State), self.options_event(SelectorLevel::City)]
    }

    /// Picks a state/province of the current country (empty clears it).
    pub fn select_state(&mut self, tree: &CityTree, state: &str) -> Vec<UiEvent> {
        let exists = self
            .country
            .as_deref()
            .and_then(|c| tree.get(c))
            .is_some_and(|states| states.contains_key(state));

        self.state = exists.then(|| state.to_string());
        self.city = None;
        self.fields = CoordinateFields::default();

        self.city_options = city_options(tree, self.country.as_deref(), self.state.as_deref());

        vec![self.options_event(SelectorLevel::City)]
    }

    /// Picks a city by ID. A known city fills the coordinates with six
    /// decimals, turns on random coordinates and copies the sublocation; an
    /// empty or unknown ID clears them.
    pub fn select_city(&mut self, tree: &CityTree, city_id: &str) {
        let found = match (self.country.as_deref(), self.state.as_deref()) {
            (Some(country), Some(state)) if !city_id.is_empty() => tree
                .get(country)
                .and_then(|states| states.get(state))
                .and_then(|cities| cities.iter().find(|c| c.id == city_id)),
            _ => None,
        };

        match found {
            Some(city) => {
                self.fields = CoordinateFields {
                    latitude: format!("{:.6}", city.center.lat),
                    longitude: format!("{:.6}", city.center.lng),
                    sublocation: city.sublocation.clone().unwrap_or_default(),
                    use_random_coordinates: true,
                };
                self.city = Some(city.clone());
            }
            None => {
                self.city = None;
                self.fields = CoordinateFields::default();
            }
        }
    }

    /// Re-derives every option list from a freshly loaded tree. Selections
    /// that no longer exist are dropped along with everything below them.
    /// The coordinate fields are only cleared when the city that filled them
    /// is gone; typed coordinates without a city pick survive.
    pub fn refresh(&mut self, tree: &CityTree) -> Vec<UiEvent> {
        self.country_options = tree.keys().map(|c| SelectOption::same(c)).collect();

        let country = self.country.take().filter(|c| tree.contains_key(c));
        let state = self.state.take();
        let city_id = self.city.take().map(|c| c.id);
        let mut fields = std::mem::take(&mut self.fields);

        self.select_country(tree, country.as_deref().unwrap_or_default());
        if let (Some(_), Some(state)) = (&self.country, state) {
            self.select_state(tree, &state);
        }

        match city_id {
            Some(id) => {
                self.select_city(tree, &id);
                if self.city.is_some() {
                    fields.use_random_coordinates = self.fields.use_random_coordinates;
                    self.fields = fields;
                }
            }
            None => self.fields = fields,
        }

        vec![
            self.options_event(SelectorLevel::Country),
            self.options_event(SelectorLevel::State),
            self.options_event(SelectorLevel::City),
        ]
    }

    /// Clears all selections (form clear). Country options are kept.
    pub fn reset(&mut self) -> Vec<UiEvent> {
        self.country = None;
        self.state = None;
        self.city = None;
        self.fields = CoordinateFields::default();
        self.state_options.clear();
        self.city_options.clear();
        vec![self.options_event(SelectorLevel::State), self.options_event(SelectorLevel::City)]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn city(&self) -> Option<&CityPreset> {
        self.city.as_ref()
    }

    pub fn fields(&self) -> &CoordinateFields {
        &self.fields
    }

    /// Manual edit of the coordinate fields.
    pub fn set_coordinates(&mut self, latitude: &str, longitude: &str) {
        self.fields.latitude = latitude.to_string();
        self.fields.longitude = longitude.to_string();
    }

    pub fn options(&self, level: SelectorLevel) -> &[SelectOption] {
        match level {
            SelectorLevel::Country => &self.country_options,
            SelectorLevel::State => &self.state_options,
            SelectorLevel::City => &self.city_options,
        }
    }

    pub fn is_enabled(&self, level: SelectorLevel) -> bool {
        !self.options(level).is_empty()
    }

    fn options_event(&self, level: SelectorLevel) -> UiEvent {
        UiEvent::Options {
            level,
            options: self.options(level).to_vec(),
            enabled: self.is_enabled(level),
        }
    }
}

fn state_options(tree: &CityTree, country: Option<&str>) -> Vec<SelectOption> {
    country
        .and_then(|c| tree.get(c))
        .map(|states| states.keys().map(|s| SelectOption::same(s)).collect())
        .unwrap_or_default()
}

fn city_options(tree: &CityTree, country: Option<&str>, state: Option<&str>) -> Vec<SelectOption> {
    let Some(cities) = country
        .zip(state)
        .and_then(|(c, s)| tree.get(c).and_then(|states| states.get(s)))
    else {
        return Vec::new();
    };

    let mut sorted: Vec<&CityPreset> = cities.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .into_iter()
        .map(|c| SelectOption {
            value: c.id.clone(),
            label: c.name.clone(),
        })
        .collect()
}
