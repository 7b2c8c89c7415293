//! Command handlers.
//!
//! Plain async functions over [`AppState`](crate::state::AppState), one per
//! user action.

pub mod files;
pub mod jobs;
pub mod presets;

pub use files::*;
pub use jobs::*;
pub use presets::*;
