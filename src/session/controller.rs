//! Per-tool job session lifecycle.
//!
//! `Idle → Submitting → UploadInProgress → AwaitingServerProgress →
//! Succeeded | Failed`
//!
//! Each submission gets a new token. Every asynchronous continuation (upload
//! progress, acceptance, poll answer, cleanup timer) carries the token it was
//! started with and is dropped when the live session has moved on. Poll and
//! cleanup tasks also watch the session's cancellation token, which is
//! cancelled when the session is superseded or cleared.
//!
//! A superseded job keeps running on the backend; there is no cancel
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::session::backend::{redact_id, JobAccepted, JobBackend, UploadProgress};
use crate::session::request::JobRequest;
use crate::surface::{AlertSink, EventSink, UiEvent};
use crate::tool::Tool;

// ─────────────────────────────────────────────────────────────────────────────
// Session Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Submitting,
    UploadInProgress,
    AwaitingServerProgress,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobState::Submitting | JobState::UploadInProgress | JobState::AwaitingServerProgress
        )
    }
}

/// The live session of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct JobSession {
    pub token: u64,
    pub tool: Tool,
    pub state: JobState,
    pub session_id: Option<String>,
    pub progress_percent: u8,
    pub download_url: Option<String>,
    pub message: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip)]
    cancel: CancellationToken,
    #[serde(skip)]
    cleanup_scheduled: bool,
}

impl JobSession {
    fn new(tool: Tool, token: u64, state: JobState) -> Self {
        Self {
            token,
            tool,
            state,
            session_id: None,
            progress_percent: 0,
            download_url: None,
            message: None,
            error_message: None,
            cancel: CancellationToken::new(),
            cleanup_scheduled: false,
        }
    }

    /// Backend session to clean up: the reported ID, else the download URL
    /// segment that names it.
    pub fn cleanup_id(&self) -> Option<String> {
        self.session_id
            .clone()
            .or_else(|| self.download_url.as_deref().and_then(session_id_from_download_url))
    }
}

/// Timing knobs, taken from [`ClientConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub cleanup_delay: Duration,
}

impl From<&ClientConfig> for SessionTiming {
    fn from(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            request_timeout: config.request_timeout(),
            cleanup_delay: config.cleanup_delay(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobSessionController
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the one live session of a tool. Cheap to clone.
#[derive(Clone)]
pub struct JobSessionController {
    inner: Arc<Inner>,
}

struct Inner {
    tool: Tool,
    backend: Arc<dyn JobBackend>,
    events: Arc<dyn EventSink>,
    alerts: Arc<dyn AlertSink>,
    timing: SessionTiming,
    session: watch::Sender<JobSession>,
}

impl JobSessionController {
    pub fn new(
        tool: Tool,
        backend: Arc<dyn JobBackend>,
        events: Arc<dyn EventSink>,
        alerts: Arc<dyn AlertSink>,
        timing: SessionTiming,
    ) -> Self {
        let (session, _) = watch::channel(JobSession::new(tool, 0, JobState::Idle));
        Self {
            inner: Arc::new(Inner {
                tool,
                backend,
                events,
                alerts,
                timing,
                session,
            }),
        }
    }

    pub fn tool(&self) -> Tool {
        self.inner.tool
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> JobSession {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSession> {
        self.inner.session.subscribe()
    }

    /// Validates and starts a submission, superseding the live session.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Returns
    ///
    /// The token of the new session.
    ///
    /// # Errors
    ///
    /// Validation errors; nothing is sent and the alert sink is notified.
    pub fn submit(&self, request: JobRequest) -> Result<u64, AppError> {
        let tool = self.inner.tool;
        if request.tool() != tool {
            return Err(AppError::Internal(format!(
                "{} request submitted to the {} controller",
                request.tool(),
                tool
            )));
        }
        if let Err(e) = request.validate() {
            warn!("[SESSION] {} submission rejected: {}", tool, e);
            self.inner.alerts.alert_error(&e);
            return Err(e);
        }

        let mut token = 0;
        let mut cancel = CancellationToken::new();
        self.inner.session.send_modify(|session| {
            if session.state.is_in_flight() {
                info!(
                    "[SESSION] {} session {} superseded; the backend job is not cancelled",
                    tool, session.token
                );
            }
            session.cancel.cancel();
            token = session.token + 1;
            *session = JobSession::new(tool, token, JobState::Submitting);
            cancel = session.cancel.clone();
        });

        info!("[SESSION] {} session {} submitting {} files", tool, token, request.files.len());
        self.inner.events.emit(UiEvent::JobProgress { tool, percent: 0 });

        tokio::spawn(run_job(self.inner.clone(), token, cancel, request));
        Ok(token)
    }

    /// Returns to `Idle`, cancelling polling and a pending cleanup. No
    /// backend call is made.
    pub fn clear(&self) {
        let tool = self.inner.tool;
        self.inner.session.send_modify(|session| {
            session.cancel.cancel();
            let token = session.token + 1;
            *session = JobSession::new(tool, token, JobState::Idle);
        });
        debug!("[SESSION] {} cleared", tool);
        self.inner.events.emit(UiEvent::JobCleared { tool });
    }

    /// The download link was activated: schedule one cleanup request after
    /// the cleanup delay.
    ///
    /// # Returns
    ///
    /// `true` when a cleanup was scheduled by this call.
    pub fn download_activated(&self) -> bool {
        let mut scheduled = None;
        self.inner.session.send_if_modified(|session| {
            if session.state != JobState::Succeeded || session.cleanup_scheduled {
                return false;
            }
            let Some(id) = session.cleanup_id() else {
                return false;
            };
            session.cleanup_scheduled = true;
            scheduled = Some((session.token, session.cancel.clone(), id));
            true
        });

        let Some((token, cancel, session_id)) = scheduled else {
            return false;
        };

        debug!(
            "[SESSION] {} cleanup of {} in {:?}",
            self.inner.tool,
            redact_id(&session_id),
            self.inner.timing.cleanup_delay
        );
        tokio::spawn(run_cleanup(self.inner.clone(), token, cancel, session_id));
        true
    }

    /// Waits until session `token` is terminal or superseded and returns the
    /// snapshot at that point.
    pub async fn wait_until_settled(&self, token: u64) -> JobSession {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| s.token != token || s.state.is_terminal())
            .await
            .map(|s| s.clone());
        match settled {
            Ok(session) => session,
            // Sender lives in `inner`, which `self` keeps alive.
            Err(_) => self.snapshot(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Mutation
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    /// Applies `f` if `token` is still the live session.
    fn update(&self, token: u64, f: impl FnOnce(&mut JobSession) -> bool) -> bool {
        self.session.send_if_modified(|session| {
            if session.token != token {
                return false;
            }
            f(session)
        })
    }

    fn is_current(&self, token: u64) -> bool {
        self.session.borrow().token == token
    }

    fn upload_progress(&self, token: u64, percent: u8) {
        let applied = self.update(token, |s| {
            if !matches!(s.state, JobState::Submitting | JobState::UploadInProgress) {
                return false;
            }
            s.state = JobState::UploadInProgress;
            s.progress_percent = percent;
            true
        });
        if applied {
            self.events.emit(UiEvent::JobProgress {
                tool: self.tool,
                percent,
            });
        }
    }

    fn server_progress(&self, token: u64, percent: u8) {
        let applied = self.update(token, |s| {
            if s.state != JobState::AwaitingServerProgress {
                return false;
            }
            s.progress_percent = percent;
            true
        });
        if applied {
            self.events.emit(UiEvent::JobProgress {
                tool: self.tool,
                percent,
            });
        }
    }

    fn await_server(&self, token: u64, accepted: &JobAccepted, session_id: &str) -> bool {
        self.update(token, |s| {
            s.state = JobState::AwaitingServerProgress;
            s.session_id = Some(session_id.to_string());
            s.download_url = Some(accepted.download_url.clone());
            s.message = Some(accepted.message.clone());
            s.progress_percent = 0;
            true
        })
    }

    fn succeed(&self, token: u64, accepted: Option<&JobAccepted>) {
        let mut result = None;
        self.update(token, |s| {
            if s.state.is_terminal() {
                return false;
            }
            if let Some(accepted) = accepted {
                s.session_id = accepted.session_id.clone();
                s.download_url = Some(accepted.download_url.clone());
                s.message = Some(accepted.message.clone());
            }
            s.state = JobState::Succeeded;
            s.progress_percent = 100;
            s.cancel.cancel();
            result = Some((
                s.message.clone().unwrap_or_default(),
                s.download_url.clone().unwrap_or_default(),
            ));
            // The cleanup timer gets a token of its own.
            s.cancel = CancellationToken::new();
            true
        });

        if let Some((message, download_url)) = result {
            info!("[SESSION] {} session {} succeeded", self.tool, token);
            self.events.emit(UiEvent::JobSucceeded {
                tool: self.tool,
                message,
                download_url,
            });
        }
    }

    fn fail(&self, token: u64, error: &AppError) {
        let message = error.to_presentation().full_text();
        let applied = self.update(token, |s| {
            if s.state.is_terminal() {
                return false;
            }
            s.state = JobState::Failed;
            s.error_message = Some(message.clone());
            s.cancel.cancel();
            true
        });

        if applied {
            warn!("[SESSION] {} session {} failed: {}", self.tool, token, error);
            self.events.emit(UiEvent::JobFailed {
                tool: self.tool,
                message,
            });
            self.alerts.alert_error(error);
        } else {
            debug!(
                "[SESSION] Ignoring late failure for superseded {} session {}",
                self.tool, token
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn run_job(inner: Arc<Inner>, token: u64, cancel: CancellationToken, request: JobRequest) {
    let progress_inner = inner.clone();
    let on_progress: UploadProgress =
        Arc::new(move |percent: u8| progress_inner.upload_progress(token, percent));

    let submitted = tokio::time::timeout(
        inner.timing.request_timeout,
        inner.backend.submit(&request, on_progress),
    )
    .await
    .unwrap_or(Err(AppError::Timeout));

    if !inner.is_current(token) {
        debug!(
            "[SESSION] Dropping late {} response for superseded session {}",
            inner.tool, token
        );
        return;
    }

    let accepted = match submitted {
        Ok(accepted) => accepted,
        Err(e) => {
            inner.fail(token, &e);
            return;
        }
    };

    match accepted.session_id.clone() {
        Some(session_id) if inner.tool.reports_progress() => {
            if inner.await_server(token, &accepted, &session_id) {
                info!(
                    "[SESSION] {} session {} accepted as {}",
                    inner.tool,
                    token,
                    redact_id(&session_id)
                );
                poll_until_done(inner, token, cancel, session_id).await;
            }
        }
        _ => inner.succeed(token, Some(&accepted)),
    }
}

/// Polls until progress reaches 100, an error occurs, the session is
/// cancelled, or the request timeout elapses. Stops on the first of these.
async fn poll_until_done(inner: Arc<Inner>, token: u64, cancel: CancellationToken, session_id: String) {
    let timeout = inner.timing.request_timeout;
    let polling = poll_loop(&inner, token, &cancel, &session_id);

    if tokio::time::timeout(timeout, polling).await.is_err() {
        inner.fail(token, &AppError::Timeout);
    }
}

async fn poll_loop(inner: &Inner, token: u64, cancel: &CancellationToken, session_id: &str) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("[SESSION] {} polling cancelled for session {}", inner.tool, token);
                return;
            }
            _ = tokio::time::sleep(inner.timing.poll_interval) => {}
        }

        let polled = tokio::select! {
            _ = cancel.cancelled() => return,
            polled = inner.backend.poll_progress(inner.tool, session_id) => polled,
        };

        if !inner.is_current(token) {
            return;
        }

        match polled {
            Ok(Some(progress)) if progress >= 100.0 => {
                inner.succeed(token, None);
                return;
            }
            Ok(Some(progress)) => {
                inner.server_progress(token, progress.clamp(0.0, 100.0).round() as u8);
            }
            Ok(None) => {}
            Err(e) => {
                inner.fail(token, &e);
                return;
            }
        }
    }
}

async fn run_cleanup(inner: Arc<Inner>, token: u64, cancel: CancellationToken, session_id: String) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("[SESSION] {} cleanup cancelled for session {}", inner.tool, token);
            return;
        }
        _ = tokio::time::sleep(inner.timing.cleanup_delay) => {}
    }

    if !inner.is_current(token) {
        return;
    }

    if let Err(e) = inner.backend.cleanup(inner.tool, &session_id).await {
        warn!(
            "[SESSION] {} cleanup of {} failed: {}",
            inner.tool,
            redact_id(&session_id),
            e
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the session ID from `/api/{tool}/download/{session_id}/zip|single`.
pub fn session_id_from_download_url(download_url: &str) -> Option<String> {
    let path = download_url.split(['?', '#']).next().unwrap_or(download_url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let id = match segments.as_slice() {
        [.., id, "zip" | "single"] => *id,
        [.., id] => *id,
        [] => return None,
    };
    Some(id.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
