//! Remote preset store.
//!
//! Presets are always fetched and persisted as whole documents:
//!
//! - `GET  /api/presets/city`   -> `{ countries }`
//! - `POST /api/presets/city`   <- `{ version: "2.0", countries }`
//! - `GET  /api/presets/client` -> `{ version, presets }`
//! - `POST /api/presets/client` <- `{ version, presets }`
//!
//! Saves answer `{ status, error? }`; anything but `status == "success"` is a
//! failure regardless of the HTTP status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::presets::model::{CityPresetDocument, CityTree, ClientPresetDocument};
use crate::presets::PresetFamily;

/// Operations on the remote preset store.
pub trait PresetBackend: Send + Sync {
    fn fetch_cities(&self) -> Pin<Box<dyn Future<Output = Result<CityTree, AppError>> + Send + '_>>;

    fn store_cities<'a>(
        &'a self,
        countries: &'a CityTree,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn fetch_clients(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ClientPresetDocument, AppError>> + Send + '_>>;

    fn store_clients<'a>(
        &'a self,
        document: &'a ClientPresetDocument,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

/// `{ status, error? }` answer to a save.
#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpPresetBackend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpPresetBackend {
    client: Arc<Client>,
    base_url: Url,
}

impl HttpPresetBackend {
    pub fn new(client: Arc<Client>, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub async fn fetch_cities(&self) -> Result<CityTree, AppError> {
        let document: CityPresetDocument = self.fetch(PresetFamily::City).await?;
        Ok(document.countries)
    }

    pub async fn store_cities(&self, countries: &CityTree) -> Result<(), AppError> {
        self.store(PresetFamily::City, &CityPresetDocument::for_save(countries.clone()))
            .await
    }

    pub async fn fetch_clients(&self) -> Result<ClientPresetDocument, AppError> {
        self.fetch(PresetFamily::Client).await
    }

    pub async fn store_clients(&self, document: &ClientPresetDocument) -> Result<(), AppError> {
        self.store(PresetFamily::Client, document).await
    }

    async fn fetch<T>(&self, family: PresetFamily) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.build_presets_url(family)?;
        let load_failed = |message: String| AppError::PresetLoadFailed { family, message };

        info!("[PRESETS] GET /api/presets/{}", family);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| load_failed(format!("Request failed: {}", e)))?;

        let status = response.status();
        info!("[PRESETS] GET /api/presets/{} -> {}", family, status.as_u16());

        if !status.is_success() {
            return Err(load_failed(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| load_failed(format!("Failed to parse presets: {}", e)))
    }

    async fn store<T>(&self, family: PresetFamily, document: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + ?Sized,
    {
        let url = self.build_presets_url(family)?;
        let save_failed = |message: String| AppError::PresetSaveFailed { family, message };

        info!("[PRESETS] POST /api/presets/{}", family);

        let response = self
            .client
            .post(url)
            .json(document)
            .send()
            .await
            .map_err(|_| {
                save_failed(format!(
                    "A network error occurred while saving {} presets.",
                    family
                ))
            })?;

        let status = response.status();
        info!("[PRESETS] POST /api/presets/{} -> {}", family, status.as_u16());

        let generic = format!("Failed to save {} presets.", family);
        let body: SaveResponse = match response.json().await {
            Ok(body) => body,
            Err(_) => return Err(save_failed(generic)),
        };

        if body.status.as_deref() == Some("success") {
            Ok(())
        } else {
            Err(save_failed(body.error.unwrap_or(generic)))
        }
    }

    fn build_presets_url(&self, family: PresetFamily) -> Result<Url, AppError> {
        let path = format!("/api/presets/{}", family);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build presets URL: {}", e)))
    }
}

impl PresetBackend for HttpPresetBackend {
    fn fetch_cities(&self) -> Pin<Box<dyn Future<Output = Result<CityTree, AppError>> + Send + '_>> {
        Box::pin(HttpPresetBackend::fetch_cities(self))
    }

    fn store_cities<'a>(
        &'a self,
        countries: &'a CityTree,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(HttpPresetBackend::store_cities(self, countries))
    }

    fn fetch_clients(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ClientPresetDocument, AppError>> + Send + '_>> {
        Box::pin(HttpPresetBackend::fetch_clients(self))
    }

    fn store_clients<'a>(
        &'a self,
        document: &'a ClientPresetDocument,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(HttpPresetBackend::store_clients(self, document))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
