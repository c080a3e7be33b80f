// ==============================================================================
// session.rs - Analysis Session Orchestration
// ==============================================================================
// Description: Session lifecycle (upload -> schedule -> aggregate -> store),
//              status and result retrieval
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Lifecycle:
//   Created -> Uploaded -> Queued -> Analyzing -> Completed | Failed
//   - Upload is accepted in any state except Queued/Analyzing and restarts
//     the session from Created
//   - Analysis may be re-requested on a Completed session (result replaced)
//   - Failed is terminal until the next upload
// ==============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{log_event, AuditEventType};
use crate::config::{ConfigError, EngineConfig};
use crate::models::{AnalysisRequest, AnalysisResult, CallSequence};
use crate::parsers::{Genome23Parser, InputError};
use crate::reference_index::{CorpusError, ReferenceIndex};
use crate::scheduler::{CancellationToken, ScheduleError, ScheduleStats, Scheduler};
use crate::validator::{UploadError, UploadValidator};

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Created,
    Uploaded,
    Queued,
    Analyzing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Queued | SessionState::Analyzing)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Analysis already in progress for session {0}")]
    AnalysisInProgress(SessionId),

    #[error("Session {id} is {state:?}; cannot {operation}")]
    InvalidState {
        id: SessionId,
        state: SessionState,
        operation: &'static str,
    },

    #[error("No result available for session {0}")]
    ResultUnavailable(SessionId),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("No compute lanes available")]
    NoLanesAvailable,

    #[error("No async runtime available to run the analysis")]
    RuntimeUnavailable,

    #[error("Analysis aborted: {0}")]
    AnalysisAborted(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Input(#[from] InputError),
}

impl From<ScheduleError> for SessionError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NoLanesAvailable => SessionError::NoLanesAvailable,
            ScheduleError::Cancelled => SessionError::Cancelled,
        }
    }
}

/// Accepted input, as reported back to the uploader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSummary {
    pub calls: usize,
    pub malformed_lines: u64,
    pub comment_lines: u64,
    pub blank_lines: u64,
    /// Sanitized client file name, if one was supplied
    pub file_name: Option<String>,
    pub size_bytes: Option<usize>,
    pub compressed: bool,
    pub sha256: Option<String>,
}

impl UploadSummary {
    fn from_calls(calls: &CallSequence) -> Self {
        Self {
            calls: calls.len(),
            malformed_lines: calls.malformed_count,
            comment_lines: calls.comment_count,
            blank_lines: calls.blank_count,
            file_name: None,
            size_bytes: None,
            compressed: false,
            sha256: None,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub state: SessionState,
    /// Fraction of calls matched so far; present while Analyzing
    pub progress: Option<f64>,
    pub error: Option<String>,
    pub upload: Option<UploadSummary>,
    pub schedule: Option<ScheduleStats>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of the session listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub file_name: Option<String>,
    /// Reported findings of the stored result
    pub findings: Option<usize>,
}

/// Calls-completed / calls-total counters written by the coordinator
#[derive(Debug, Default)]
struct ProgressCell {
    done: AtomicU64,
    total: AtomicU64,
}

impl ProgressCell {
    fn record(&self, done: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.fetch_max(done, Ordering::Relaxed);
    }

    fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        (self.done.load(Ordering::Relaxed) as f64 / total as f64).min(1.0)
    }
}

/// Stored session state
pub struct SessionRecord {
    state: SessionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    calls: Option<CallSequence>,
    upload: Option<UploadSummary>,
    result: Option<Arc<AnalysisResult>>,
    failure: Option<SessionError>,
    schedule: Option<ScheduleStats>,
    cancel: Option<CancellationToken>,
    progress: Arc<ProgressCell>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionRecord {
    fn new() -> Self {
        let now = Utc::now();
        let (state_tx, _) = watch::channel(SessionState::Created);
        Self {
            state: SessionState::Created,
            created_at: now,
            updated_at: now,
            calls: None,
            upload: None,
            result: None,
            failure: None,
            schedule: None,
            cancel: None,
            progress: Arc::new(ProgressCell::default()),
            state_tx,
        }
    }

    fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.updated_at = Utc::now();
        self.state_tx.send_replace(state);
    }

    fn fail(&mut self, error: SessionError) {
        self.failure = Some(error);
        self.cancel = None;
        self.transition(SessionState::Failed);
    }

    fn summary(&self, id: SessionId) -> SessionSummary {
        SessionSummary {
            id,
            state: self.state,
            created_at: self.created_at,
            file_name: self.upload.as_ref().and_then(|u| u.file_name.clone()),
            findings: self.result.as_ref().map(|r| r.findings.len()),
        }
    }

    fn status(&self, id: SessionId) -> SessionStatus {
        SessionStatus {
            id,
            state: self.state,
            progress: (self.state == SessionState::Analyzing).then(|| self.progress.fraction()),
            error: self.failure.as_ref().map(|e| e.to_string()),
            upload: self.upload.clone(),
            schedule: self.schedule.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Key-value session storage keyed by session id
pub trait SessionStore: Send + Sync + 'static {
    fn insert(&self, id: SessionId, record: SessionRecord);

    /// Run `f` against a session under the store's lock
    fn with<R>(&self, id: &SessionId, f: impl FnOnce(&mut SessionRecord) -> R) -> Option<R>;

    fn remove(&self, id: &SessionId) -> Option<SessionRecord>;

    /// Map every stored session through `f`
    fn collect<R>(&self, f: impl FnMut(&SessionId, &SessionRecord) -> R) -> Vec<R>;

    /// Drop sessions for which `keep` returns false; returns their ids
    fn retain(&self, keep: impl FnMut(&SessionId, &SessionRecord) -> bool) -> Vec<SessionId>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, id: SessionId, record: SessionRecord) {
        self.lock().insert(id, record);
    }

    fn with<R>(&self, id: &SessionId, f: impl FnOnce(&mut SessionRecord) -> R) -> Option<R> {
        self.lock().get_mut(id).map(f)
    }

    fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        self.lock().remove(id)
    }

    fn collect<R>(&self, mut f: impl FnMut(&SessionId, &SessionRecord) -> R) -> Vec<R> {
        self.lock().iter().map(|(id, record)| f(id, record)).collect()
    }

    fn retain(&self, mut keep: impl FnMut(&SessionId, &SessionRecord) -> bool) -> Vec<SessionId> {
        let mut removed = Vec::new();
        self.lock().retain(|id, record| {
            let kept = keep(id, record);
            if !kept {
                removed.push(*id);
            }
            kept
        });
        removed.sort();
        removed
    }
}

/// Source of the shared reference index
pub enum CorpusHandle {
    /// Already loaded
    Resident(Arc<ReferenceIndex>),
    /// Opened on first use; a failed open is retried on the next analysis
    Lazy {
        location: PathBuf,
        loaded: Mutex<Option<Arc<ReferenceIndex>>>,
    },
}

impl CorpusHandle {
    pub fn resident(index: Arc<ReferenceIndex>) -> Self {
        CorpusHandle::Resident(index)
    }

    pub fn lazy(location: impl Into<PathBuf>) -> Self {
        CorpusHandle::Lazy {
            location: location.into(),
            loaded: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<ReferenceIndex>, CorpusError> {
        match self {
            CorpusHandle::Resident(index) => Ok(Arc::clone(index)),
            CorpusHandle::Lazy { location, loaded } => {
                let mut slot = loaded.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(index) = slot.as_ref() {
                    return Ok(Arc::clone(index));
                }
                let index = Arc::new(ReferenceIndex::open(location)?);
                *slot = Some(Arc::clone(&index));
                Ok(index)
            }
        }
    }
}

struct ServiceInner<S> {
    store: S,
    corpus: CorpusHandle,
    config: EngineConfig,
    scheduler: Scheduler,
    validator: UploadValidator,
    parser: Genome23Parser,
}

/// Entry point for the transport layer
pub struct AnalysisService<S: SessionStore = InMemorySessionStore> {
    inner: Arc<ServiceInner<S>>,
}

impl<S: SessionStore> Clone for AnalysisService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AnalysisService<InMemorySessionStore> {
    pub fn new(corpus: CorpusHandle, config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_store(corpus, config, InMemorySessionStore::default())
    }
}

impl<S: SessionStore> AnalysisService<S> {
    pub fn with_store(
        corpus: CorpusHandle,
        config: EngineConfig,
        store: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.scheduler.clone()).with_probe(config.probe.build());
        Self::with_scheduler(corpus, config, store, scheduler)
    }

    /// Service over a caller-built scheduler (custom lane backends)
    ///
    /// # Returns
    /// * `Err(ConfigError::Invalid)` - `config` fails validation
    pub fn with_scheduler(
        corpus: CorpusHandle,
        config: EngineConfig,
        store: S,
        scheduler: Scheduler,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let validator = UploadValidator::new(config.max_upload_bytes);
        Ok(Self {
            inner: Arc::new(ServiceInner {
                store,
                corpus,
                config,
                scheduler,
                validator,
                parser: Genome23Parser::new(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn create_session(&self) -> SessionId {
        let id = Uuid::new_v4();
        self.inner.store.insert(id, SessionRecord::new());
        log_event(AuditEventType::SessionCreated, Some(id), serde_json::json!({}));
        id
    }

    /// Validate, parse and store an upload
    ///
    /// # Returns
    /// * `Ok(UploadSummary)` - Session is now Uploaded
    /// * `Err(SessionError::AnalysisInProgress)` - Session is Queued or Analyzing
    /// * `Err(SessionError::Upload)` - Empty or oversized upload (session unchanged)
    /// * `Err(SessionError::Input)` - Stream could not be read (session unchanged)
    pub fn upload(
        &self,
        id: SessionId,
        name: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadSummary, SessionError> {
        self.ensure_idle(id)?;

        let accepted = self
            .inner
            .validator
            .validate_upload(name, bytes)
            .map_err(SessionError::from)
            .and_then(|validated| {
                let calls = self.inner.parser.parse(bytes)?;
                Ok((validated, calls))
            });

        let (validated, calls) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                log_event(
                    AuditEventType::UploadRejected,
                    Some(id),
                    serde_json::json!({ "error": e.to_string(), "size": bytes.len() }),
                );
                return Err(e);
            }
        };

        let summary = UploadSummary {
            file_name: validated.safe_name.clone(),
            size_bytes: Some(validated.size),
            compressed: validated.compressed,
            sha256: Some(validated.hash_sha256.clone()),
            ..UploadSummary::from_calls(&calls)
        };

        self.store_calls(id, calls, summary.clone())?;

        log_event(
            AuditEventType::UploadAccepted,
            Some(id),
            serde_json::json!({
                "calls": summary.calls,
                "malformed_lines": summary.malformed_lines,
                "size": validated.size,
                "sha256": validated.hash_sha256,
            }),
        );
        Ok(summary)
    }

    /// Queue an analysis of the uploaded calls; returns once the session is Queued
    pub fn start_analysis(
        &self,
        id: SessionId,
        request: AnalysisRequest,
    ) -> Result<(), SessionError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::RuntimeUnavailable)?;

        let queued = self
            .inner
            .store
            .with(&id, |session| match session.state {
                SessionState::Queued | SessionState::Analyzing => {
                    Err(SessionError::AnalysisInProgress(id))
                }
                SessionState::Uploaded | SessionState::Completed => match session.calls.clone() {
                    Some(calls) => {
                        let cancel = CancellationToken::new();
                        let progress = Arc::new(ProgressCell::default());
                        session.cancel = Some(cancel.clone());
                        session.progress = Arc::clone(&progress);
                        session.result = None;
                        session.failure = None;
                        session.transition(SessionState::Queued);
                        Ok((calls, cancel, progress))
                    }
                    None => Err(SessionError::InvalidState {
                        id,
                        state: session.state,
                        operation: "start analysis without input",
                    }),
                },
                state @ (SessionState::Created | SessionState::Failed) => {
                    Err(SessionError::InvalidState {
                        id,
                        state,
                        operation: "start analysis",
                    })
                }
            })
            .ok_or(SessionError::SessionNotFound(id))??;

        let (calls, cancel, progress) = queued;
        log_event(
            AuditEventType::AnalysisStarted,
            Some(id),
            serde_json::json!({
                "calls": calls.len(),
                "magnitude_threshold": request.magnitude_threshold,
                "limit": request.limit,
            }),
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn_blocking(move || {
            let run = catch_unwind(AssertUnwindSafe(|| {
                inner.run_analysis(id, calls, request, cancel, progress)
            }));
            if let Err(payload) = run {
                inner.abort_analysis(id, payload);
            }
        });
        Ok(())
    }

    /// Store a parsed call sequence and queue its analysis in one step
    pub fn start_analysis_with_calls(
        &self,
        id: SessionId,
        calls: CallSequence,
        request: AnalysisRequest,
    ) -> Result<(), SessionError> {
        self.ensure_idle(id)?;
        let summary = UploadSummary::from_calls(&calls);
        self.store_calls(id, calls, summary)?;
        self.start_analysis(id, request)
    }

    pub fn get_status(&self, id: SessionId) -> Result<SessionStatus, SessionError> {
        self.inner
            .store
            .with(&id, |session| session.status(id))
            .ok_or(SessionError::SessionNotFound(id))
    }

    /// Completed result, or the failure that ended the session
    pub fn get_result(&self, id: SessionId) -> Result<Arc<AnalysisResult>, SessionError> {
        self.inner
            .store
            .with(&id, |session| match (&session.result, &session.failure) {
                (Some(result), _) if session.state == SessionState::Completed => {
                    Ok(Arc::clone(result))
                }
                (_, Some(failure)) if session.state == SessionState::Failed => Err(failure.clone()),
                _ => Err(SessionError::ResultUnavailable(id)),
            })
            .ok_or(SessionError::SessionNotFound(id))?
    }

    /// Request cancellation; takes effect at the next batch boundary
    pub fn cancel(&self, id: SessionId) -> Result<(), SessionError> {
        self.inner
            .store
            .with(&id, |session| match (&session.cancel, session.state.is_running()) {
                (Some(token), true) => {
                    token.cancel();
                    Ok(())
                }
                _ => Err(SessionError::InvalidState {
                    id,
                    state: session.state,
                    operation: "cancel",
                }),
            })
            .ok_or(SessionError::SessionNotFound(id))?
    }

    /// Wait until the session is no longer Queued or Analyzing
    pub async fn wait(&self, id: SessionId) -> Result<SessionState, SessionError> {
        let mut rx = self
            .inner
            .store
            .with(&id, |session| session.state_tx.subscribe())
            .ok_or(SessionError::SessionNotFound(id))?;

        let state = rx
            .wait_for(|state| !state.is_running())
            .await
            .map(|state| *state)
            .map_err(|_| SessionError::SessionNotFound(id))?;
        Ok(state)
    }

    /// Every stored session, oldest first
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions = self
            .inner
            .store
            .collect(|id, session| session.summary(*id));
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn remove(&self, id: SessionId) -> Result<(), SessionError> {
        self.ensure_idle(id)?;
        self.inner
            .store
            .remove(&id)
            .ok_or(SessionError::SessionNotFound(id))?;
        log_event(AuditEventType::SessionRemoved, Some(id), serde_json::json!({}));
        Ok(())
    }

    /// Drop idle sessions not updated within `max_age`
    pub fn expire(&self, max_age: Duration) -> Vec<SessionId> {
        let cutoff = Utc::now() - max_age;
        let expired = self
            .inner
            .store
            .retain(|_, session| session.state.is_running() || session.updated_at >= cutoff);

        for id in &expired {
            log_event(
                AuditEventType::SessionExpired,
                Some(*id),
                serde_json::json!({ "cutoff": cutoff }),
            );
        }
        if !expired.is_empty() {
            info!("Expired {} sessions", expired.len());
        }
        expired
    }

    fn ensure_idle(&self, id: SessionId) -> Result<(), SessionError> {
        self.inner
            .store
            .with(&id, |session| {
                if session.state.is_running() {
                    Err(SessionError::AnalysisInProgress(id))
                } else {
                    Ok(())
                }
            })
            .ok_or(SessionError::SessionNotFound(id))?
    }

    fn store_calls(
        &self,
        id: SessionId,
        calls: CallSequence,
        summary: UploadSummary,
    ) -> Result<(), SessionError> {
        self.inner
            .store
            .with(&id, |session| {
                if session.state.is_running() {
                    return Err(SessionError::AnalysisInProgress(id));
                }
                session.transition(SessionState::Created);
                session.calls = Some(calls);
                session.upload = Some(summary);
                session.result = None;
                session.failure = None;
                session.schedule = None;
                session.transition(SessionState::Uploaded);
                Ok(())
            })
            .ok_or(SessionError::SessionNotFound(id))?
    }
}

impl<S: SessionStore> ServiceInner<S> {
    /// Move a session whose analysis panicked to Failed
    fn abort_analysis(&self, id: SessionId, payload: Box<dyn Any + Send>) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        let error = SessionError::AnalysisAborted(reason);

        warn!("Analysis for session {} aborted: {}", id, error);
        log_event(
            AuditEventType::AnalysisFailed,
            Some(id),
            serde_json::json!({ "error": error.to_string() }),
        );
        self.store.with(&id, |session| session.fail(error));
    }

    /// Blocking body of one analysis; runs on the blocking thread pool
    fn run_analysis(
        &self,
        id: SessionId,
        calls: CallSequence,
        request: AnalysisRequest,
        cancel: CancellationToken,
        progress: Arc<ProgressCell>,
    ) {
        let started = self.store.with(&id, |session| {
            if cancel.is_cancelled() {
                session.fail(SessionError::Cancelled);
                false
            } else {
                session.transition(SessionState::Analyzing);
                true
            }
        });
        match started {
            Some(true) => {}
            Some(false) => {
                log_event(AuditEventType::AnalysisCancelled, Some(id), serde_json::json!({}));
                return;
            }
            None => {
                warn!("Session {} removed before analysis started", id);
                return;
            }
        }

        let outcome = self.corpus.get().map_err(SessionError::from).and_then(|index| {
            self.scheduler
                .analyze(
                    &index,
                    &calls,
                    &request,
                    &self.config.scoring,
                    &cancel,
                    &|done, total| progress.record(done, total),
                )
                .map_err(SessionError::from)
        });

        match outcome {
            Ok((result, stats)) => {
                for warning in &result.degraded_lanes {
                    log_event(
                        AuditEventType::LaneDegraded,
                        Some(id),
                        serde_json::json!({ "lane": warning.lane, "reason": warning.reason }),
                    );
                }
                let details = serde_json::json!({
                    "total_calls": result.counters.total_calls,
                    "matched": result.counters.matched,
                    "reported": result.findings.len(),
                    "strategy": result.strategy.label(),
                });

                self.store.with(&id, |session| {
                    session.result = Some(Arc::new(result));
                    session.schedule = Some(stats);
                    session.cancel = None;
                    session.transition(SessionState::Completed);
                });
                log_event(AuditEventType::AnalysisCompleted, Some(id), details);
            }
            Err(error) => {
                let event = match error {
                    SessionError::Cancelled => AuditEventType::AnalysisCancelled,
                    _ => AuditEventType::AnalysisFailed,
                };
                warn!("Analysis for session {} failed: {}", id, error);
                log_event(event, Some(id), serde_json::json!({ "error": error.to_string() }));
                self.store.with(&id, |session| session.fail(error));
            }
        }
    }
}
