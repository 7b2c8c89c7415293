//! Abstract UI surface.
//!
//! The controller never renders anything itself. It pushes projections of its
//! state as [`UiEvent`]s to an [`EventSink`] and user-facing text to an
//! [`AlertSink`].

use serde::Serialize;

use crate::error::AppError;
use crate::files::SelectionView;
use crate::presets::selector::{SelectOption, SelectorLevel};
use crate::presets::PresetFamily;
use crate::tool::Tool;

/// Text shown to the user in an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn from_error(error: &AppError) -> Self {
        let presentation = error.to_presentation();
        Self {
            message: presentation.full_text(),
            title: presentation.title,
        }
    }
}

/// State projections pushed to the UI surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiEvent {
    /// The pending-file list of a tool, grouped by directory.
    FileList { tool: Tool, view: SelectionView },
    /// Show or hide the file-list container of a tool.
    FileListVisible { tool: Tool, visible: bool },
    /// Option list of one cascading-selector level.
    Options {
        level: SelectorLevel,
        options: Vec<SelectOption>,
        enabled: bool,
    },
    /// Upload or server-side progress of the current job (0-100).
    JobProgress { tool: Tool, percent: u8 },
    /// Terminal success with a download link.
    JobSucceeded {
        tool: Tool,
        message: String,
        download_url: String,
    },
    /// Terminal failure.
    JobFailed { tool: Tool, message: String },
    /// Tool form cleared; hide progress and results.
    JobCleared { tool: Tool },
    /// A preset family was reloaded from the remote store.
    PresetsReloaded { family: PresetFamily },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);

    fn alert_error(&self, error: &AppError) {
        self.alert(Alert::from_error(error));
    }
}

/// Surface that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl EventSink for NullSurface {
    fn emit(&self, _event: UiEvent) {}
}

impl AlertSink for NullSurface {
    fn alert(&self, _alert: Alert) {}
}
