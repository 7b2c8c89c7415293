pub mod commands;
pub mod config;
pub mod error;
pub mod files;
pub mod presets;
pub mod session;
pub mod state;
pub mod surface;
pub mod tool;

pub use config::ClientConfig;
pub use error::AppError;
pub use state::AppState;
pub use tool::Tool;
