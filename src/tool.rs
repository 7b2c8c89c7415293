//! The four batch tools exposed by the processing service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the batch operations the backend performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Geotagging,
    Conversion,
    Resizing,
    Watermark,
}

impl Tool {
    pub const ALL: [Tool; 4] = [
        Tool::Geotagging,
        Tool::Conversion,
        Tool::Resizing,
        Tool::Watermark,
    ];

    /// Path segment used in `/api/{tool}/...`.
    pub fn as_path(&self) -> &'static str {
        match self {
            Tool::Geotagging => "geotagging",
            Tool::Conversion => "conversion",
            Tool::Resizing => "resizing",
            Tool::Watermark => "watermark",
        }
    }

    /// Whether per-file relative paths are sent with the upload.
    pub fn sends_file_paths(&self) -> bool {
        matches!(self, Tool::Geotagging)
    }

    /// Whether the backend exposes a progress endpoint for this tool.
    pub fn reports_progress(&self) -> bool {
        matches!(self, Tool::Geotagging)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_geotagging_sends_paths_and_polls() {
        for tool in Tool::ALL {
            let is_geo = tool == Tool::Geotagging;
            assert_eq!(tool.sends_file_paths(), is_geo);
            assert_eq!(tool.reports_progress(), is_geo);
        }
    }

    #[test]
    fn serializes_as_path_segment() {
        for tool in Tool::ALL {
            let json = serde_json::to_string(&tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.as_path()));
        }
    }
}
