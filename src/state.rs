//! Application state shared by every command.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::files::FileSelections;
use crate::presets::prefill::ContactForm;
use crate::presets::selector::CascadingSelector;
use crate::presets::{HttpPresetBackend, PresetBackend, PresetStore};
use crate::session::{HttpJobBackend, JobBackend, JobSessionController, SessionTiming};
use crate::surface::{AlertSink, EventSink};
use crate::tool::Tool;

/// Connect timeout of the shared HTTP client. The overall request cap is
/// enforced per session.
const CONNECT_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the command layer operates on.
pub struct AppState {
    pub config: ClientConfig,
    pub events: Arc<dyn EventSink>,
    pub alerts: Arc<dyn AlertSink>,
    /// City and client presets. Single editor; writers hold the lock across
    /// persist and reload.
    pub presets: RwLock<PresetStore>,
    /// Country/state/city selection of the geotagging form.
    pub selector: RwLock<CascadingSelector>,
    /// Pending files, per tool. Shared with the tasks that drop a batch once
    /// its job succeeds.
    pub files: Arc<RwLock<FileSelections>>,
    /// Contact fields of the geotagging form.
    pub contact: RwLock<ContactForm>,
    controllers: Controllers,
}

struct Controllers {
    geotagging: JobSessionController,
    conversion: JobSessionController,
    resizing: JobSessionController,
    watermark: JobSessionController,
}

impl AppState {
    /// Creates state talking HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidParameter` - the base URL does not parse
    /// - `AppError::Internal` - the HTTP client cannot be built
    pub fn new(
        config: ClientConfig,
        events: Arc<dyn EventSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, AppError> {
        let base_url = config.base_url()?;
        let client = Arc::new(
            Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?,
        );

        let jobs = Arc::new(HttpJobBackend::new(client.clone(), base_url.clone()));
        let presets = Arc::new(HttpPresetBackend::new(client, base_url));
        Ok(Self::with_backends(config, jobs, presets, events, alerts))
    }

    /// Creates state over arbitrary backends.
    pub fn with_backends(
        config: ClientConfig,
        jobs: Arc<dyn JobBackend>,
        presets: Arc<dyn PresetBackend>,
        events: Arc<dyn EventSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let timing = SessionTiming::from(&config);
        let controller = |tool| {
            JobSessionController::new(tool, jobs.clone(), events.clone(), alerts.clone(), timing)
        };
        let controllers = Controllers {
            geotagging: controller(Tool::Geotagging),
            conversion: controller(Tool::Conversion),
            resizing: controller(Tool::Resizing),
            watermark: controller(Tool::Watermark),
        };

        Self {
            presets: RwLock::new(PresetStore::new(presets, alerts.clone(), events.clone())),
            selector: RwLock::new(CascadingSelector::new()),
            files: Arc::new(RwLock::new(FileSelections::new())),
            contact: RwLock::new(ContactForm::default()),
            config,
            events,
            alerts,
            controllers,
        }
    }

    /// The session controller of `tool`.
    pub fn controller(&self, tool: Tool) -> &JobSessionController {
        match tool {
            Tool::Geotagging => &self.controllers.geotagging,
            Tool::Conversion => &self.controllers.conversion,
            Tool::Resizing => &self.controllers.resizing,
            Tool::Watermark => &self.controllers.watermark,
        }
    }
}
