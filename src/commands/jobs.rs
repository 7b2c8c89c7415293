//! Job submission commands.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::presets::prefill::ContactForm;
use crate::session::{
    GeotagMetadata, JobParameters, JobRequest, JobSession, JobState, OutputFormat, ResizeParams,
    WatermarkParams,
};
use crate::state::AppState;
use crate::surface::UiEvent;
use crate::tool::Tool;

/// Tool-specific form input of one submission. Geotagging metadata is
/// collected from the selector and contact form held in the state.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Geotagging {
        /// When set, GPS date/time stamps are written.
        taken_at: Option<DateTime<Utc>>,
    },
    Conversion,
    Resizing(ResizeParams),
    Watermark(WatermarkParams),
}

impl ToolInput {
    pub fn tool(&self) -> Tool {
        match self {
            ToolInput::Geotagging { .. } => Tool::Geotagging,
            ToolInput::Conversion => Tool::Conversion,
            ToolInput::Resizing(_) => Tool::Resizing,
            ToolInput::Watermark(_) => Tool::Watermark,
        }
    }
}

/// Submits the pending files of the tool with `input`, superseding the live
/// session of that tool. Once the job succeeds the submitted files are
/// dropped from the pending set, unless a new batch was picked meanwhile.
///
/// # Returns
///
/// The token of the new session.
///
/// # Errors
///
/// Validation errors; the alert sink has already been notified.
pub async fn submit_tool(
    state: &AppState,
    input: ToolInput,
    output_format: OutputFormat,
) -> Result<u64, AppError> {
    let tool = input.tool();
    let files = state.files.read().await.pending(tool).to_vec();

    let parameters = match input {
        ToolInput::Geotagging { taken_at } => {
            let selector = state.selector.read().await;
            let contact = state.contact.read().await;
            match GeotagMetadata::collect(&selector, &contact, taken_at) {
                Ok(metadata) => JobParameters::Geotagging(metadata),
                Err(e) => {
                    warn!("[SESSION] {} submission rejected: {}", tool, e);
                    state.alerts.alert_error(&e);
                    return Err(e);
                }
            }
        }
        ToolInput::Conversion => JobParameters::Conversion,
        ToolInput::Resizing(params) => JobParameters::Resizing(params),
        ToolInput::Watermark(params) => JobParameters::Watermark(params),
    };

    let controller = state.controller(tool).clone();
    let token = controller.submit(JobRequest::new(files.clone(), parameters, output_format))?;

    let selections = state.files.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let session = controller.wait_until_settled(token).await;
        if session.token != token || session.state != JobState::Succeeded {
            return;
        }
        let mut pending = selections.write().await;
        if pending.pending(tool) != files.as_slice() {
            return;
        }
        pending.clear(tool);
        drop(pending);

        debug!("[FILES] {} batch submitted by session {} cleared", tool, token);
        events.emit(UiEvent::FileList {
            tool,
            view: Default::default(),
        });
        events.emit(UiEvent::FileListVisible {
            tool,
            visible: false,
        });
    });

    Ok(token)
}

/// Clears the form of `tool`: pending files, the live session, and for
/// geotagging the location selection and contact fields.
pub async fn clear_tool(state: &AppState, tool: Tool) {
    state.files.write().await.clear(tool);
    state.events.emit(UiEvent::FileList {
        tool,
        view: Default::default(),
    });
    state.events.emit(UiEvent::FileListVisible {
        tool,
        visible: false,
    });

    state.controller(tool).clear();

    if tool == Tool::Geotagging {
        let events = state.selector.write().await.reset();
        for event in events {
            state.events.emit(event);
        }
        *state.contact.write().await = ContactForm::default();
    }
}

/// The download link of `tool` was activated; schedules the backend cleanup.
pub async fn download_activated(state: &AppState, tool: Tool) -> bool {
    state.controller(tool).download_activated()
}

/// Waits for session `token` of `tool` to finish or be superseded.
pub async fn wait_for_job(state: &AppState, tool: Tool, token: u64) -> JobSession {
    state.controller(tool).wait_until_settled(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{pick_city, pick_country, pick_state, select_files};
    use crate::files::RawFileEntry;
    use crate::presets::selector::SelectorLevel;
    use crate::session::controller::tests::accepted;
    use crate::state::tests::test_state;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    async fn pick_files(state: &AppState, tool: Tool) {
        select_files(
            state,
            tool,
            vec![RawFileEntry::in_memory("a.jpg", vec![7u8; 128]).with_relative_path("trip/a.jpg")],
        )
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_submits_pending_files() {
        let test = test_state();
        test.jobs.push_submission(Duration::from_millis(10), Ok(accepted(None)));
        pick_files(&test.state, Tool::Conversion).await;

        let token = submit_tool(&test.state, ToolInput::Conversion, OutputFormat::Png)
            .await
            .unwrap();
        let session = wait_for_job(&test.state, Tool::Conversion, token).await;

        assert_eq!(session.state, JobState::Succeeded);
        let requests = test.jobs.requests.lock().unwrap();
        assert_eq!(requests[0].files[0].path, "trip/a.jpg");
        assert_eq!(requests[0].output_format, OutputFormat::Png);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_drops_submitted_batch() {
        let test = test_state();
        test.jobs.push_submission(Duration::from_millis(10), Ok(accepted(None)));
        pick_files(&test.state, Tool::Conversion).await;

        let token = submit_tool(&test.state, ToolInput::Conversion, OutputFormat::Jpeg)
            .await
            .unwrap();
        wait_for_job(&test.state, Tool::Conversion, token).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(test.state.files.read().await.pending(Tool::Conversion).is_empty());
        assert_eq!(
            test.surface.events().last(),
            Some(&UiEvent::FileListVisible {
                tool: Tool::Conversion,
                visible: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_batch_for_retry() {
        let test = test_state();
        test.jobs.push_submission(Duration::ZERO, Err(AppError::Timeout));
        pick_files(&test.state, Tool::Resizing).await;
        let params = ResizeParams {
            width: Some(800),
            ..Default::default()
        };

        let token = submit_tool(&test.state, ToolInput::Resizing(params), OutputFormat::Jpeg)
            .await
            .unwrap();
        let session = wait_for_job(&test.state, Tool::Resizing, token).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(session.state, JobState::Failed);
        assert_eq!(test.state.files.read().await.pending(Tool::Resizing).len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_files_is_rejected() {
        let test = test_state();

        let result = submit_tool(&test.state, ToolInput::Conversion, OutputFormat::Jpeg).await;

        assert!(matches!(result, Err(AppError::NoFilesSelected)));
        assert_eq!(test.jobs.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(test.surface.alerts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geotag_collects_selector_and_contact() {
        let test = test_state();
        test.jobs.push_submission(Duration::ZERO, Ok(accepted(Some("geo1"))));
        test.jobs.push_progress(vec![Ok(Some(100.0))]);
        crate::commands::load_presets(&test.state).await;
        pick_files(&test.state, Tool::Geotagging).await;
        pick_country(&test.state, "Japan").await;
        pick_state(&test.state, "Kyoto").await;
        pick_city(&test.state, "kyoto").await;
        test.state.contact.write().await.creator = "Ana".into();

        let token = submit_tool(
            &test.state,
            ToolInput::Geotagging { taken_at: None },
            OutputFormat::Jpeg,
        )
        .await
        .unwrap();
        wait_for_job(&test.state, Tool::Geotagging, token).await;

        let requests = test.jobs.requests.lock().unwrap();
        let JobParameters::Geotagging(metadata) = &requests[0].parameters else {
            panic!("expected geotagging parameters");
        };
        assert_eq!(metadata.country.as_deref(), Some("Japan"));
        assert_eq!(metadata.state.as_deref(), Some("Kyoto"));
        assert_eq!(metadata.gps_latitude, Some(35.0116));
        assert_eq!(metadata.use_random_coordinates, Some(true));
        assert_eq!(metadata.creator.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_bad_coordinate_is_alerted() {
        let test = test_state();
        pick_files(&test.state, Tool::Geotagging).await;
        test.state.selector.write().await.set_coordinates("north", "2.0");

        let result = submit_tool(
            &test.state,
            ToolInput::Geotagging { taken_at: None },
            OutputFormat::Jpeg,
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidParameter(_))));
        assert_eq!(test.surface.alerts().len(), 1);
        assert_eq!(test.jobs.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_geotagging_resets_form() {
        let test = test_state();
        crate::commands::load_presets(&test.state).await;
        pick_files(&test.state, Tool::Geotagging).await;
        pick_country(&test.state, "France").await;
        test.state.contact.write().await.email = "a@b.c".into();

        clear_tool(&test.state, Tool::Geotagging).await;

        assert!(test.state.files.read().await.pending(Tool::Geotagging).is_empty());
        assert_eq!(test.state.selector.read().await.country(), None);
        assert!(!test.state.selector.read().await.is_enabled(SelectorLevel::State));
        assert_eq!(*test.state.contact.read().await, ContactForm::default());
        assert_eq!(test.state.controller(Tool::Geotagging).snapshot().state, JobState::Idle);
        assert!(test
            .surface
            .events()
            .contains(&UiEvent::JobCleared { tool: Tool::Geotagging }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_schedules_cleanup() {
        let test = test_state();
        test.jobs.push_submission(Duration::ZERO, Ok(accepted(Some("abc"))));
        test.jobs.push_progress(vec![Ok(Some(100.0))]);
        pick_files(&test.state, Tool::Geotagging).await;
        let token = submit_tool(
            &test.state,
            ToolInput::Geotagging { taken_at: None },
            OutputFormat::Jpeg,
        )
        .await
        .unwrap();
        wait_for_job(&test.state, Tool::Geotagging, token).await;

        assert!(download_activated(&test.state, Tool::Geotagging).await);
        assert!(!download_activated(&test.state, Tool::Geotagging).await);
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(*test.jobs.cleanups.lock().unwrap(), vec!["abc".to_string()]);
    }
}
