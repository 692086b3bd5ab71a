// Run state and background job execution.
//
// At most one transformation runs at a time. A trigger while a run is in
// flight is rejected (no queue); the caller is told to retry later.
use crate::checkpoint::{MetadataStore, STATUS_FETCH_FAILED};
use crate::error::ReportError;
use crate::fetch::{FetchWindow, ReleaseSource};
use crate::reports::build_report;
use crate::types::{OrgFilter, Report};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "message", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded(String),
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }
}

/// Serializable view of the run state.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub job_running: bool,
    pub last_run: Option<String>,
    pub last_outcome: Option<RunOutcome>,
}

#[derive(Debug, Default)]
struct RunInner {
    running: bool,
    last_run: Option<DateTime<Utc>>,
    last_outcome: Option<RunOutcome>,
    latest: Option<Arc<Report>>,
}

/// Busy flag, last outcome and the latest published report.
#[derive(Debug, Default)]
pub struct RunState {
    inner: Mutex<RunInner>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the single run slot.
    pub fn try_start(&self) -> Result<(), ReportError> {
        let mut inner = self.lock();
        if inner.running {
            return Err(ReportError::Busy);
        }
        inner.running = true;
        Ok(())
    }

    /// Release the run slot. A report is only published on success; a
    /// failed run leaves the previous report in place.
    pub fn complete(&self, outcome: RunOutcome, report: Option<Report>, at: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.running = false;
        inner.last_run = Some(at);
        if let (true, Some(report)) = (outcome.is_success(), report) {
            inner.latest = Some(Arc::new(report));
        }
        inner.last_outcome = Some(outcome);
    }

    pub fn latest_report(&self) -> Option<Arc<Report>> {
        self.lock().latest.clone()
    }

    pub fn status(&self) -> RunStatus {
        let inner = self.lock();
        RunStatus {
            status: "healthy",
            service: "find-a-tender-data-fetcher",
            job_running: inner.running,
            last_run: inner
                .last_run
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()),
            last_outcome: inner.last_outcome.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub window: FetchWindow,
    pub filter: OrgFilter,
}

pub enum Trigger {
    Started(JoinHandle<RunOutcome>),
    InProgress,
}

/// Runs fetch + transform on a worker thread against shared run state.
pub struct JobRunner<S> {
    source: Arc<S>,
    state: Arc<RunState>,
    store: Option<MetadataStore>,
}

impl<S> JobRunner<S>
where
    S: ReleaseSource + Send + Sync + 'static,
{
    pub fn new(source: S, state: Arc<RunState>, store: Option<MetadataStore>) -> Self {
        Self {
            source: Arc::new(source),
            state,
            store,
        }
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn trigger(&self, request: JobRequest) -> Trigger {
        if self.state.try_start().is_err() {
            warn!("a job is already running, please try again later");
            return Trigger::InProgress;
        }
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let store = self.store.clone();

        Trigger::Started(thread::spawn(move || {
            info!(from = %request.window.from, to = %request.window.to, "starting data fetch and processing job");
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_job(source.as_ref(), &request, Utc::now())
            }))
            .unwrap_or_else(|payload| Err(ReportError::WorkerPanicked(panic_message(payload))));
            let finished = Utc::now();

            let (outcome, report) = match result {
                Ok(report) => {
                    let mut message = format!(
                        "Data successfully processed at {}",
                        finished.format("%Y-%m-%dT%H:%M:%S")
                    );
                    if let Some(store) = &store {
                        if let Err(e) = store.record_success(&request.window, finished) {
                            error!(error = %e, "could not record checkpoint");
                            message.push_str(&format!("; checkpoint not saved: {}", e));
                        }
                    }
                    (RunOutcome::Succeeded(message), Some(report))
                }
                Err(e) => {
                    error!(error = %e, "run failed; no report published and checkpoint not advanced");
                    if let Some(store) = &store {
                        let status = match e {
                            ReportError::WorkerPanicked(_) => "Processing failed",
                            _ => STATUS_FETCH_FAILED,
                        };
                        if let Err(e) = store.record_failure(status, finished) {
                            error!(error = %e, "could not record failed run");
                        }
                    }
                    (RunOutcome::Failed(e.to_string()), None)
                }
            };
            state.complete(outcome.clone(), report, finished);
            outcome
        }))
    }
}

/// Fetch the window and transform it. Fetch errors abort the run.
pub fn run_job<S: ReleaseSource + ?Sized>(
    source: &S,
    request: &JobRequest,
    now: DateTime<Utc>,
) -> Result<Report, ReportError> {
    let releases = source.fetch(&request.window)?;
    info!(count = releases.len(), "found releases to process");
    Ok(build_report(&releases, now, &request.filter))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
