use serde::Serialize;
use thiserror::Error;

use crate::presets::PresetFamily;

/// Fallback text when the backend rejects a job without saying why.
pub(crate) const GENERIC_PROCESSING_ERROR: &str = "An error occurred while processing the images.";

/// User-friendly error presentation for the alert surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorPresentation {
    /// Message with the technical details appended, as shown in an alert.
    pub fn full_text(&self) -> String {
        match &self.details {
            Some(details) if !details.trim().is_empty() => {
                format!("{}\n\nDetails: {}", self.message, details)
            }
            _ => self.message.clone(),
        }
    }
}

/// Classification of a non-success HTTP status returned by the job backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    PayloadTooLarge,
    UnsupportedMediaType,
    ServerError,
    ServiceUnavailable,
    GatewayTimeout,
    Generic,
}

impl RejectionCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            413 => RejectionCategory::PayloadTooLarge,
            415 => RejectionCategory::UnsupportedMediaType,
            500 => RejectionCategory::ServerError,
            503 => RejectionCategory::ServiceUnavailable,
            504 => RejectionCategory::GatewayTimeout,
            _ => RejectionCategory::Generic,
        }
    }

    /// Tailored message for the category. `Generic` has none; the server's
    /// own error text is used instead.
    pub fn tailored_message(&self) -> Option<&'static str> {
        match self {
            RejectionCategory::PayloadTooLarge => Some(
                "The uploaded files are too large. Please reduce the file size or upload fewer files.",
            ),
            RejectionCategory::UnsupportedMediaType => Some(
                "One or more files are in an unsupported format. Please check your file types.",
            ),
            RejectionCategory::ServerError => {
                Some("A server error occurred. Please try again later.")
            }
            RejectionCategory::ServiceUnavailable => {
                Some("The server is temporarily unavailable. Please try again later.")
            }
            RejectionCategory::GatewayTimeout => Some(
                "The request timed out. Please try again with fewer files or smaller file sizes.",
            ),
            RejectionCategory::Generic => None,
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Input validation ──────────────────────────────────────────────────────
    #[error("No files selected")]
    NoFilesSelected,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // ── Transfer ──────────────────────────────────────────────────────────────
    #[error("Server unreachable: {0}")]
    Offline(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Request timed out")]
    Timeout,

    // ── Backend ───────────────────────────────────────────────────────────────
    #[error("Backend rejected request with HTTP {status}")]
    BackendRejected {
        status: u16,
        category: RejectionCategory,
        message: Option<String>,
        details: Option<String>,
    },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    // ── Presets ───────────────────────────────────────────────────────────────
    #[error("Failed to load {family} presets: {message}")]
    PresetLoadFailed {
        family: PresetFamily,
        message: String,
    },

    #[error("Failed to save {family} presets: {message}")]
    PresetSaveFailed {
        family: PresetFamily,
        message: String,
    },

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a backend rejection from the HTTP status and the parsed
    /// `{ error, details }` body (both optional).
    pub fn rejected(status: u16, message: Option<String>, details: Option<String>) -> Self {
        AppError::BackendRejected {
            status,
            category: RejectionCategory::from_status(status),
            message,
            details,
        }
    }

    /// Converts the error into a presentation suitable for the alert surface.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Input validation ──────────────────────────────────────────────
            AppError::NoFilesSelected => ErrorPresentation {
                title: "Error".into(),
                message: "Please select at least one image file.".into(),
                details: None,
            },

            AppError::MissingField(prompt) => ErrorPresentation {
                title: "Error".into(),
                message: prompt.clone(),
                details: None,
            },

            AppError::InvalidParameter(msg) => ErrorPresentation {
                title: "Error".into(),
                message: msg.clone(),
                details: None,
            },

            // ── Transfer ──────────────────────────────────────────────────────
            AppError::Offline(_) => ErrorPresentation {
                title: "Error".into(),
                message: "A network error occurred. You appear to be offline. Please check your internet connection.".into(),
                details: None,
            },

            AppError::NetworkFailure(_) => ErrorPresentation {
                title: "Error".into(),
                message: "A network error occurred. Please check your connection and try again. If the problem persists, the server may be temporarily unavailable.".into(),
                details: None,
            },

            AppError::Timeout => ErrorPresentation {
                title: "Error".into(),
                message: "The request timed out. This could be due to large file sizes or a slow connection. Please try again with fewer files or smaller file sizes.".into(),
                details: None,
            },

            // ── Backend ───────────────────────────────────────────────────────
            AppError::BackendRejected {
                category,
                message,
                details,
                ..
            } => {
                let message = category
                    .tailored_message()
                    .map(str::to_string)
                    .or_else(|| message.clone())
                    .unwrap_or_else(|| GENERIC_PROCESSING_ERROR.to_string());
                ErrorPresentation {
                    title: "Error".into(),
                    message,
                    details: details.clone(),
                }
            }

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Error".into(),
                message: GENERIC_PROCESSING_ERROR.into(),
                details: None,
            },

            // ── Presets ───────────────────────────────────────────────────────
            AppError::PresetLoadFailed { family, .. } => ErrorPresentation {
                title: "Error".into(),
                message: format!("Could not load {} presets.", family),
                details: None,
            },

            AppError::PresetSaveFailed { message, .. } => ErrorPresentation {
                title: "Error".into(),
                message: message.clone(),
                details: None,
            },

            AppError::PresetNotFound(_) => ErrorPresentation {
                title: "Error".into(),
                message: "The selected preset no longer exists.".into(),
                details: None,
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                details: None,
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
