//! Pending-file aggregation for one tool.
//!
//! A pick or drop event delivers an ordered batch of raw entries. The batch
//! replaces whatever the tool had selected before. Entries without a usable
//! handle are skipped individually and zero-byte entries are shown with a
//! "potential issue" marker but never reach the pending set that is submitted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::tool::Tool;

/// Label shown instead of a size for zero-byte entries.
pub const POTENTIAL_ISSUE_LABEL: &str = "0 Bytes (Potential Issue)";

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

// ─────────────────────────────────────────────────────────────────────────────
// Input Types
// ─────────────────────────────────────────────────────────────────────────────

/// Binary source of a selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileHandle {
    /// Streamed from disk at upload time.
    Path(PathBuf),
    /// Already in memory.
    Memory(Bytes),
}

/// One entry of a raw pick/drop event.
#[derive(Debug, Clone)]
pub struct RawFileEntry {
    pub name: String,
    /// Directory-qualified path relative to the picked root, when the picker
    /// provides one.
    pub relative_path: Option<String>,
    pub size_bytes: u64,
    pub handle: Option<FileHandle>,
}

impl RawFileEntry {
    /// Builds an entry from a file on disk. Directories and unreadable paths
    /// yield an entry without a handle, which the aggregator skips.
    pub fn from_path(path: &Path, relative_path: Option<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Self {
                name,
                relative_path,
                size_bytes: meta.len(),
                handle: Some(FileHandle::Path(path.to_path_buf())),
            },
            _ => Self {
                name,
                relative_path,
                size_bytes: 0,
                handle: None,
            },
        }
    }

    pub fn in_memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            relative_path: None,
            size_bytes: data.len() as u64,
            handle: Some(FileHandle::Memory(data)),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    /// Best available path: the relative path when present, else the name.
    fn resolved_path(&self) -> String {
        match &self.relative_path {
            Some(p) if !p.is_empty() => p.clone(),
            _ => self.name.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output Types
// ─────────────────────────────────────────────────────────────────────────────

/// A file that will be submitted. `size_bytes` is always greater than zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub handle: FileHandle,
    pub path: String,
    pub size_bytes: u64,
}

impl PendingFile {
    /// Last path segment, used as the multipart file name.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionRow {
    pub path: String,
    pub size_label: String,
    pub potential_issue: bool,
}

/// Files sharing a directory. `directory` is empty for root-level files,
/// which render without a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryGroup {
    pub directory: String,
    pub rows: Vec<SelectionRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionView {
    pub groups: Vec<DirectoryGroup>,
}

impl SelectionView {
    pub fn potential_issue_count(&self) -> usize {
        self.rows().filter(|r| r.potential_issue).count()
    }

    pub fn rows(&self) -> impl Iterator<Item = &SelectionRow> {
        self.groups.iter().flat_map(|g| g.rows.iter())
    }

    fn remove_row(&mut self, path: &str) -> bool {
        let mut removed = false;
        for group in &mut self.groups {
            if let Some(pos) = group.rows.iter().position(|r| r.path == path) {
                group.rows.remove(pos);
                removed = true;
                break;
            }
        }
        self.groups.retain(|g| !g.rows.is_empty());
        removed
    }
}

/// Result of removing one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: bool,
    /// Whether the file-list container should stay visible.
    pub list_visible: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// FileSelections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ToolSelection {
    pending: Vec<PendingFile>,
    view: SelectionView,
}

/// Pending-file sets of every tool.
#[derive(Debug, Default)]
pub struct FileSelections {
    tools: HashMap<Tool, ToolSelection>,
}

impl FileSelections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selection of `tool` with `entries` and returns the view
    /// to render.
    pub fn select(&mut self, tool: Tool, entries: Vec<RawFileEntry>) -> SelectionView {
        let mut selection = ToolSelection::default();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in entries {
            let Some(handle) = entry.handle.clone() else {
                warn!("[FILES] Skipping entry without a file handle: {}", entry.name);
                continue;
            };
            if entry.name.is_empty() {
                warn!("[FILES] Skipping entry without a name");
                continue;
            }

            let path = entry.resolved_path();
            if !seen.insert(path.clone()) {
                debug!("[FILES] Ignoring duplicate entry {}", path);
                continue;
            }

            let potential_issue = entry.size_bytes == 0;
            let row = SelectionRow {
                path: path.clone(),
                size_label: if potential_issue {
                    POTENTIAL_ISSUE_LABEL.to_string()
                } else {
                    format_file_size(entry.size_bytes)
                },
                potential_issue,
            };
            push_row(&mut selection.view, directory_of(&path), row);

            if potential_issue {
                warn!("[FILES] Excluding zero-byte file {} from {}", path, tool);
                continue;
            }

            selection.pending.push(PendingFile {
                handle,
                path,
                size_bytes: entry.size_bytes,
            });
        }

        debug!(
            "[FILES] {} selection: {} pending, {} flagged",
            tool,
            selection.pending.len(),
            selection.view.potential_issue_count()
        );

        let view = selection.view.clone();
        self.tools.insert(tool, selection);
        view
    }

    /// Removes the entry at `path` from both the pending set and the view.
    pub fn remove(&mut self, tool: Tool, path: &str) -> RemoveOutcome {
        let Some(selection) = self.tools.get_mut(&tool) else {
            return RemoveOutcome {
                removed: false,
                list_visible: false,
            };
        };

        let before = selection.pending.len();
        selection.pending.retain(|f| f.path != path);
        let removed_pending = selection.pending.len() != before;
        let removed_row = selection.view.remove_row(path);

        RemoveOutcome {
            removed: removed_pending || removed_row,
            list_visible: !selection.pending.is_empty(),
        }
    }

    pub fn pending(&self, tool: Tool) -> &[PendingFile] {
        self.tools
            .get(&tool)
            .map(|s| s.pending.as_slice())
            .unwrap_or(&[])
    }

    pub fn view(&self, tool: Tool) -> SelectionView {
        self.tools
            .get(&tool)
            .map(|s| s.view.clone())
            .unwrap_or_default()
    }

    pub fn is_list_visible(&self, tool: Tool) -> bool {
        !self.pending(tool).is_empty()
    }

    pub fn clear(&mut self, tool: Tool) {
        self.tools.remove(&tool);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

fn push_row(view: &mut SelectionView, directory: &str, row: SelectionRow) {
    match view.groups.iter_mut().find(|g| g.directory == directory) {
        Some(group) => group.rows.push(row),
        None => view.groups.push(DirectoryGroup {
            directory: directory.to_string(),
            rows: vec![row],
        }),
    }
}

/// Directory part of a relative path; empty for root-level files.
fn directory_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Human-readable size with base 1024 and at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0usize;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, size: usize) -> RawFileEntry {
        let name = path.rsplit('/').next().unwrap().to_string();
        let mut e = RawFileEntry::in_memory(name, vec![7u8; size]);
        if path.contains('/') {
            e = e.with_relative_path(path);
        }
        e
    }

    #[test]
    fn test_zero_byte_entry_is_flagged_but_not_pending() {
        let mut selections = FileSelections::new();
        let view = selections.select(
            Tool::Geotagging,
            vec![entry("a.jpg", 500), entry("b.jpg", 0)],
        );

        let pending = selections.pending(Tool::Geotagging);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "a.jpg");
        assert!(pending.iter().all(|f| f.size_bytes > 0));

        assert_eq!(view.potential_issue_count(), 1);
        let flagged: Vec<_> = view.rows().filter(|r| r.potential_issue).collect();
        assert_eq!(flagged[0].path, "b.jpg");
        assert_eq!(flagged[0].size_label, POTENTIAL_ISSUE_LABEL);
    }

    #[test]
    fn test_groups_by_directory_in_first_seen_order() {
        let mut selections = FileSelections::new();
        let view = selections.select(
            Tool::Geotagging,
            vec![
                entry("trip/day2/c.jpg", 10),
                entry("root.jpg", 10),
                entry("trip/day1/a.jpg", 10),
                entry("trip/day2/d.jpg", 10),
            ],
        );

        let dirs: Vec<&str> = view.groups.iter().map(|g| g.directory.as_str()).collect();
        assert_eq!(dirs, vec!["trip/day2", "", "trip/day1"]);
        assert_eq!(view.groups[0].rows.len(), 2);

        let paths: Vec<&str> = selections
            .pending(Tool::Geotagging)
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec!["trip/day2/c.jpg", "root.jpg", "trip/day1/a.jpg", "trip/day2/d.jpg"]
        );
    }

    #[test]
    fn test_malformed_entries_are_skipped_individually() {
        let mut selections = FileSelections::new();
        let broken = RawFileEntry {
            name: "ghost.jpg".into(),
            relative_path: None,
            size_bytes: 42,
            handle: None,
        };

        let view = selections.select(
            Tool::Conversion,
            vec![entry("a.png", 3), broken, entry("b.png", 4)],
        );

        assert_eq!(selections.pending(Tool::Conversion).len(), 2);
        assert_eq!(view.rows().count(), 2);
    }

    #[test]
    fn test_duplicate_paths_are_collapsed() {
        let mut selections = FileSelections::new();
        selections.select(
            Tool::Resizing,
            vec![entry("dir/a.jpg", 3), entry("dir/a.jpg", 5)],
        );

        let pending = selections.pending(Tool::Resizing);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].size_bytes, 3);
    }

    #[test]
    fn test_new_selection_replaces_previous_one() {
        let mut selections = FileSelections::new();
        selections.select(Tool::Watermark, vec![entry("a.jpg", 3)]);
        selections.select(Tool::Watermark, vec![entry("b.jpg", 3)]);

        let pending = selections.pending(Tool::Watermark);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "b.jpg");
    }

    #[test]
    fn test_selections_are_per_tool() {
        let mut selections = FileSelections::new();
        selections.select(Tool::Watermark, vec![entry("a.jpg", 3)]);
        selections.select(Tool::Conversion, vec![entry("b.jpg", 3)]);

        assert_eq!(selections.pending(Tool::Watermark)[0].path, "a.jpg");
        assert_eq!(selections.pending(Tool::Conversion)[0].path, "b.jpg");
        assert!(selections.pending(Tool::Geotagging).is_empty());
    }

    #[test]
    fn test_remove_last_entry_hides_list() {
        let mut selections = FileSelections::new();
        selections.select(Tool::Geotagging, vec![entry("a.jpg", 3), entry("b.jpg", 3)]);

        let first = selections.remove(Tool::Geotagging, "a.jpg");
        assert!(first.removed);
        assert!(first.list_visible);

        let second = selections.remove(Tool::Geotagging, "b.jpg");
        assert!(second.removed);
        assert!(!second.list_visible);
        assert!(selections.view(Tool::Geotagging).groups.is_empty());
    }

    #[test]
    fn test_flagged_row_can_be_removed() {
        let mut selections = FileSelections::new();
        selections.select(Tool::Geotagging, vec![entry("a.jpg", 3), entry("empty.jpg", 0)]);

        let outcome = selections.remove(Tool::Geotagging, "empty.jpg");
        assert!(outcome.removed);
        assert!(outcome.list_visible);
        assert_eq!(selections.view(Tool::Geotagging).potential_issue_count(), 0);
    }

    #[test]
    fn test_only_zero_byte_entries_keep_list_hidden() {
        let mut selections = FileSelections::new();
        let view = selections.select(Tool::Geotagging, vec![entry("empty.jpg", 0)]);

        assert_eq!(view.potential_issue_count(), 1);
        assert!(!selections.is_list_visible(Tool::Geotagging));
    }

    #[test]
    fn test_from_path_reads_size_and_rejects_directories() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("photo.jpg");
        std::fs::write(&file_path, b"abcdef").unwrap();

        let file = RawFileEntry::from_path(&file_path, None);
        assert_eq!(file.size_bytes, 6);
        assert_eq!(file.name, "photo.jpg");
        assert!(matches!(file.handle, Some(FileHandle::Path(_))));

        let directory = RawFileEntry::from_path(dir.path(), None);
        assert!(directory.handle.is_none());
    }

    #[test]
    fn test_pending_file_name_is_last_segment() {
        let mut selections = FileSelections::new();
        selections.select(Tool::Geotagging, vec![entry("trip/day1/a.jpg", 3)]);
        assert_eq!(selections.pending(Tool::Geotagging)[0].file_name(), "a.jpg");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_048_576), "1 MB");
        assert_eq!(format_file_size(5_368_709_120), "5 GB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }
}
