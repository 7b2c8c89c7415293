//! File selection for the tool forms.

pub mod selection;

pub use selection::{
    format_file_size, DirectoryGroup, FileHandle, FileSelections, PendingFile, RawFileEntry,
    RemoveOutcome, SelectionRow, SelectionView,
};
