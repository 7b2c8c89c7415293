//! In-memory mirror of the remote preset store.
//!
//! Every write builds the complete next dataset, persists it as a whole and
//! then reloads from the remote store. A failed write leaves the in-memory
//! copy untouched; a failed load keeps the previous copy.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::AppError;
use crate::presets::model::{CityPreset, CityTree, ClientPreset, ClientPresetDocument};
use crate::presets::remote::PresetBackend;
use crate::presets::{derive_id, PresetFamily};
use crate::surface::{AlertSink, EventSink, UiEvent};

/// Location of a city inside the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityLocation {
    pub country: String,
    pub state: String,
    pub index: usize,
}

/// One row of the city preset table.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRow<'a> {
    pub country: &'a str,
    pub state: &'a str,
    pub preset: &'a CityPreset,
}

pub struct PresetStore {
    backend: Arc<dyn PresetBackend>,
    alerts: Arc<dyn AlertSink>,
    events: Arc<dyn EventSink>,
    cities: CityTree,
    clients: ClientPresetDocument,
}

impl PresetStore {
    pub fn new(
        backend: Arc<dyn PresetBackend>,
        alerts: Arc<dyn AlertSink>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            backend,
            alerts,
            events,
            cities: CityTree::new(),
            clients: ClientPresetDocument::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Load
    // ─────────────────────────────────────────────────────────────────────────

    /// Loads both families. A failure of one is alerted and does not affect
    /// the other.
    pub async fn load(&mut self) {
        if let Err(e) = self.reload_cities().await {
            self.alerts.alert_error(&e);
        }
        if let Err(e) = self.reload_clients().await {
            self.alerts.alert_error(&e);
        }
    }

    async fn reload_cities(&mut self) -> Result<(), AppError> {
        match self.backend.fetch_cities().await {
            Ok(tree) => {
                info!("[PRESETS] Loaded {} city presets", count_cities(&tree));
                self.cities = tree;
                self.events.emit(UiEvent::PresetsReloaded {
                    family: PresetFamily::City,
                });
                Ok(())
            }
            Err(e) => {
                warn!("[PRESETS] City preset load failed: {}", e);
                Err(e)
            }
        }
    }

    async fn reload_clients(&mut self) -> Result<(), AppError> {
        match self.backend.fetch_clients().await {
            Ok(document) => {
                info!("[PRESETS] Loaded {} client presets", document.presets.len());
                self.clients = document;
                self.events.emit(UiEvent::PresetsReloaded {
                    family: PresetFamily::Client,
                });
                Ok(())
            }
            Err(e) => {
                warn!("[PRESETS] Client preset load failed: {}", e);
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // City CRUD
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts or replaces a city preset.
    ///
    /// A blank ID is derived from the name. When the ID already exists
    /// anywhere in the tree, the entry is replaced where it lives; otherwise
    /// it is appended to `country`/`state`.
    ///
    /// # Returns
    ///
    /// The ID the preset was stored under.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidParameter` - blank name, country or state
    /// - `AppError::PresetSaveFailed` - the remote store rejected the write
    pub async fn save_city(
        &mut self,
        mut preset: CityPreset,
        country: &str,
        state: &str,
    ) -> Result<String, AppError> {
        let result = self.try_save_city(&mut preset, country, state).await;
        self.finish_write(PresetFamily::City, result.map(|_| preset.id))
    }

    async fn try_save_city(
        &mut self,
        preset: &mut CityPreset,
        country: &str,
        state: &str,
    ) -> Result<(), AppError> {
        if preset.name.trim().is_empty() {
            return Err(AppError::InvalidParameter("Preset name is required.".into()));
        }
        if country.trim().is_empty() || state.trim().is_empty() {
            return Err(AppError::InvalidParameter(
                "Country and state/province are required.".into(),
            ));
        }
        if preset.id.trim().is_empty() {
            preset.id = derive_id(&preset.name);
        }

        let mut next = self.cities.clone();
        match locate_city(&next, &preset.id) {
            Some(location) => {
                preset.country = location.country.clone();
                if let Some(slot) = next
                    .get_mut(&location.country)
                    .and_then(|states| states.get_mut(&location.state))
                    .and_then(|cities| cities.get_mut(location.index))
                {
                    keep_unknown_keys(&mut preset.extra, &slot.extra);
                    *slot = preset.clone();
                }
                // Any later copy of the ID goes; the first one was replaced.
                retain_cities(&mut next, |city, seen| city.id != preset.id || !seen);
            }
            None => {
                preset.country = country.to_string();
                next.entry(country.to_string())
                    .or_default()
                    .entry(state.to_string())
                    .or_default()
                    .push(preset.clone());
            }
        }

        info!("[PRESETS] Saving city preset {}", preset.id);
        self.persist_cities(next).await
    }

    /// Removes a city preset and prunes emptied buckets.
    ///
    /// # Errors
    ///
    /// - `AppError::PresetNotFound` - no city with this ID; nothing is sent
    /// - `AppError::PresetSaveFailed` - the remote store rejected the write
    pub async fn delete_city(&mut self, id: &str) -> Result<(), AppError> {
        let result = self.try_delete_city(id).await;
        self.finish_write(PresetFamily::City, result)
    }

    async fn try_delete_city(&mut self, id: &str) -> Result<(), AppError> {
        if locate_city(&self.cities, id).is_none() {
            return Err(AppError::PresetNotFound(id.to_string()));
        }

        let mut next = self.cities.clone();
        retain_cities(&mut next, |city, _| city.id != id);

        info!("[PRESETS] Deleting city preset {}", id);
        self.persist_cities(next).await
    }

    async fn persist_cities(&mut self, next: CityTree) -> Result<(), AppError> {
        self.backend.store_cities(&next).await?;
        if let Err(e) = self.reload_cities().await {
            // The write went through; mirror what was persisted.
            self.alerts.alert_error(&e);
            self.cities = next;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Client CRUD
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts or replaces a client preset by ID. Blank optional fields are
    /// dropped before saving.
    pub async fn save_client(&mut self, preset: ClientPreset) -> Result<String, AppError> {
        let mut preset = preset.normalized();
        let result = self.try_save_client(&mut preset).await;
        self.finish_write(PresetFamily::Client, result.map(|_| preset.id))
    }

    async fn try_save_client(&mut self, preset: &mut ClientPreset) -> Result<(), AppError> {
        if preset.name.trim().is_empty() {
            return Err(AppError::InvalidParameter("Preset name is required.".into()));
        }
        if preset.id.trim().is_empty() {
            preset.id = derive_id(&preset.name);
        }

        let mut next = self.clients.clone();
        match next.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => {
                keep_unknown_keys(&mut preset.extra, &existing.extra);
                *existing = preset.clone();
            }
            None => next.presets.push(preset.clone()),
        }
        let mut seen = false;
        next.presets.retain(|p| {
            if p.id != preset.id {
                return true;
            }
            let first = !seen;
            seen = true;
            first
        });

        info!("[PRESETS] Saving client preset {}", preset.id);
        self.persist_clients(next).await
    }

    pub async fn delete_client(&mut self, id: &str) -> Result<(), AppError> {
        let result = self.try_delete_client(id).await;
        self.finish_write(PresetFamily::Client, result)
    }

    async fn try_delete_client(&mut self, id: &str) -> Result<(), AppError> {
        if self.find_client(id).is_none() {
            return Err(AppError::PresetNotFound(id.to_string()));
        }

        let mut next = self.clients.clone();
        next.presets.retain(|p| p.id != id);

        info!("[PRESETS] Deleting client preset {}", id);
        self.persist_clients(next).await
    }

    async fn persist_clients(&mut self, next: ClientPresetDocument) -> Result<(), AppError> {
        self.backend.store_clients(&next).await?;
        if let Err(e) = self.reload_clients().await {
            self.alerts.alert_error(&e);
            self.clients = next;
        }
        Ok(())
    }

    /// Alerts on failure and passes the result through.
    fn finish_write<T>(&self, family: PresetFamily, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            warn!("[PRESETS] {} preset write failed: {}", family, e);
            self.alerts.alert_error(e);
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Helpers
    // ─────────────────────────────────────────────────────────────────────────

    pub fn city_tree(&self) -> &CityTree {
        &self.cities
    }

    pub fn clients(&self) -> &[ClientPreset] {
        &self.clients.presets
    }

    pub fn find_city(&self, id: &str) -> Option<(CityLocation, &CityPreset)> {
        let location = locate_city(&self.cities, id)?;
        let preset = self
            .cities
            .get(&location.country)?
            .get(&location.state)?
            .get(location.index)?;
        Some((location, preset))
    }

    pub fn find_client(&self, id: &str) -> Option<&ClientPreset> {
        self.clients.presets.iter().find(|p| p.id == id)
    }

    /// All cities ordered by country, state and name.
    pub fn city_rows(&self) -> Vec<CityRow<'_>> {
        let mut rows = Vec::new();
        for (country, states) in &self.cities {
            for (state, cities) in states {
                let mut sorted: Vec<&CityPreset> = cities.iter().collect();
                sorted.sort_by(|a, b| a.name.cmp(&b.name));
                rows.extend(sorted.into_iter().map(|preset| CityRow {
                    country,
                    state,
                    preset,
                }));
            }
        }
        rows
    }

    pub fn clients_sorted(&self) -> Vec<&ClientPreset> {
        let mut sorted: Vec<&ClientPreset> = self.clients.presets.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    pub fn countries(&self) -> Vec<&str> {
        self.cities.keys().map(String::as_str).collect()
    }

    pub fn states(&self, country: &str) -> Vec<&str> {
        self.cities
            .get(country)
            .map(|states| states.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn cities(&self, country: &str, state: &str) -> &[CityPreset] {
        self.cities
            .get(country)
            .and_then(|states| states.get(state))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Finds a city by ID anywhere in the tree.
pub fn locate_city(tree: &CityTree, id: &str) -> Option<CityLocation> {
    tree.iter().find_map(|(country, states)| {
        states.iter().find_map(|(state, cities)| {
            cities
                .iter()
                .position(|c| c.id == id)
                .map(|index| CityLocation {
                    country: country.clone(),
                    state: state.clone(),
                    index,
                })
        })
    })
}

/// Keeps the cities for which `keep(city, seen_same_id_before)` holds, in
/// tree order, then prunes emptied states and countries.
fn retain_cities(tree: &mut CityTree, mut keep: impl FnMut(&CityPreset, bool) -> bool) {
    let mut seen: HashSet<String> = HashSet::new();
    for states in tree.values_mut() {
        for cities in states.values_mut() {
            cities.retain(|city| {
                let seen_before = !seen.insert(city.id.clone());
                keep(city, seen_before)
            });
        }
        states.retain(|_, cities| !cities.is_empty());
    }
    tree.retain(|_, states| !states.is_empty());
}

/// Carries keys the stored entry had and the edited one lacks.
fn keep_unknown_keys(edited: &mut Map<String, Value>, stored: &Map<String, Value>) {
    for (key, value) in stored {
        edited.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn count_cities(tree: &CityTree) -> usize {
    tree.values()
        .flat_map(|states| states.values())
        .map(Vec::len)
        .sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
