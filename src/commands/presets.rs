//! Preset management and cascading selection commands.
//!
//! The preset store alerts its own load and write failures; these commands
//! only keep the selector in step with the reloaded tree.

use crate::error::AppError;
use crate::presets::model::{CityPreset, ClientPreset};
use crate::presets::prefill::{apply_client_preset, ContactForm};
use crate::presets::selector::CoordinateFields;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Load / CRUD
// ─────────────────────────────────────────────────────────────────────────────

/// Loads both preset families and repopulates the selector.
pub async fn load_presets(state: &AppState) {
    let mut presets = state.presets.write().await;
    presets.load().await;
    refresh_selector(state, &presets).await;
}

/// Creates or updates a city preset under `country`/`province`.
///
/// # Returns
///
/// The ID the preset was stored under.
pub async fn save_city_preset(
    state: &AppState,
    preset: CityPreset,
    country: &str,
    province: &str,
) -> Result<String, AppError> {
    let mut presets = state.presets.write().await;
    let id = presets.save_city(preset, country, province).await?;
    refresh_selector(state, &presets).await;
    Ok(id)
}

pub async fn delete_city_preset(state: &AppState, id: &str) -> Result<(), AppError> {
    let mut presets = state.presets.write().await;
    presets.delete_city(id).await?;
    refresh_selector(state, &presets).await;
    Ok(())
}

pub async fn save_client_preset(state: &AppState, preset: ClientPreset) -> Result<String, AppError> {
    state.presets.write().await.save_client(preset).await
}

pub async fn delete_client_preset(state: &AppState, id: &str) -> Result<(), AppError> {
    state.presets.write().await.delete_client(id).await
}

async fn refresh_selector(state: &AppState, presets: &crate::presets::PresetStore) {
    let events = state.selector.write().await.refresh(presets.city_tree());
    for event in events {
        state.events.emit(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

pub async fn pick_country(state: &AppState, country: &str) {
    let presets = state.presets.read().await;
    let events = state
        .selector
        .write()
        .await
        .select_country(presets.city_tree(), country);
    for event in events {
        state.events.emit(event);
    }
}

pub async fn pick_state(state: &AppState, province: &str) {
    let presets = state.presets.read().await;
    let events = state
        .selector
        .write()
        .await
        .select_state(presets.city_tree(), province);
    for event in events {
        state.events.emit(event);
    }
}

/// Picks a city and returns the coordinate fields it filled in.
pub async fn pick_city(state: &AppState, city_id: &str) -> CoordinateFields {
    let presets = state.presets.read().await;
    let mut selector = state.selector.write().await;
    selector.select_city(presets.city_tree(), city_id);
    selector.fields().clone()
}

/// Prefills the contact form from a client preset.
///
/// # Errors
///
/// - `AppError::PresetNotFound` - no client preset has this ID
pub async fn pick_client_preset(state: &AppState, id: &str) -> Result<ContactForm, AppError> {
    let presets = state.presets.read().await;
    let preset = presets
        .find_client(id)
        .ok_or_else(|| AppError::PresetNotFound(id.to_string()))?;

    let mut contact = state.contact.write().await;
    apply_client_preset(&mut contact, preset);
    Ok(contact.clone())
}
