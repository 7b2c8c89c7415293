//! File pick/drop commands.

use crate::files::{RawFileEntry, RemoveOutcome, SelectionView};
use crate::state::AppState;
use crate::surface::UiEvent;
use crate::tool::Tool;

/// Replaces the pending files of `tool` with a freshly picked or dropped
/// batch and renders the grouped list.
pub async fn select_files(state: &AppState, tool: Tool, entries: Vec<RawFileEntry>) -> SelectionView {
    let (view, visible) = {
        let mut files = state.files.write().await;
        let view = files.select(tool, entries);
        (view, files.is_list_visible(tool))
    };

    state.events.emit(UiEvent::FileList {
        tool,
        view: view.clone(),
    });
    state.events.emit(UiEvent::FileListVisible { tool, visible });
    view
}

/// Removes one file from the pending set of `tool`. The list is hidden once
/// nothing is left to submit.
pub async fn remove_file(state: &AppState, tool: Tool, path: &str) -> RemoveOutcome {
    let (outcome, view) = {
        let mut files = state.files.write().await;
        let outcome = files.remove(tool, path);
        (outcome, files.view(tool))
    };

    if outcome.removed {
        state.events.emit(UiEvent::FileList { tool, view });
    }
    state.events.emit(UiEvent::FileListVisible {
        tool,
        visible: outcome.list_visible,
    });
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    fn entries() -> Vec<RawFileEntry> {
        vec![
            RawFileEntry::in_memory("a.jpg", vec![1u8; 2048]).with_relative_path("trip/a.jpg"),
            RawFileEntry::in_memory("b.jpg", Vec::<u8>::new()).with_relative_path("trip/b.jpg"),
        ]
    }

    #[tokio::test]
    async fn test_select_renders_list_and_visibility() {
        let test = test_state();

        let view = select_files(&test.state, Tool::Conversion, entries()).await;

        assert_eq!(view.potential_issue_count(), 1);
        assert_eq!(test.state.files.read().await.pending(Tool::Conversion).len(), 1);
        let events = test.surface.events();
        assert!(matches!(&events[0], UiEvent::FileList { tool: Tool::Conversion, .. }));
        assert_eq!(
            events[1],
            UiEvent::FileListVisible {
                tool: Tool::Conversion,
                visible: true
            }
        );
    }

    #[tokio::test]
    async fn test_removing_last_file_hides_list() {
        let test = test_state();
        select_files(&test.state, Tool::Resizing, entries()).await;

        let outcome = remove_file(&test.state, Tool::Resizing, "trip/a.jpg").await;

        assert!(outcome.removed);
        assert!(!outcome.list_visible);
        assert_eq!(
            test.surface.events().last(),
            Some(&UiEvent::FileListVisible {
                tool: Tool::Resizing,
                visible: false
            })
        );
    }

    #[tokio::test]
    async fn test_selections_are_per_tool() {
        let test = test_state();
        select_files(&test.state, Tool::Watermark, entries()).await;

        let outcome = remove_file(&test.state, Tool::Geotagging, "trip/a.jpg").await;

        assert!(!outcome.removed);
        assert_eq!(test.state.files.read().await.pending(Tool::Watermark).len(), 1);
    }
}
