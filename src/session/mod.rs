//! Batch job sessions.
//!
//! - `request` - request building and validation
//! - `backend` - job backend trait and HTTP adapter
//! - `controller` - per-tool session lifecycle

pub mod backend;
pub mod controller;
pub mod request;

pub use backend::{HttpJobBackend, JobAccepted, JobBackend, UploadProgress};
pub use controller::{JobSession, JobSessionController, JobState, SessionTiming};
pub use request::{
    GeotagMetadata, JobParameters, JobRequest, OutputFormat, ResizeMode, ResizeParams,
    WatermarkKind, WatermarkParams, WatermarkPosition,
};
