use crate::config::EngineLocations;
use crate::download::{DownloadEngine, DownloadJob, DownloadRequest};
use crate::joblog::{self, JobLog};
use crate::quality::QualityProfile;
use crate::result::{FailureKind, JobResult};
use crate::transcode::{TranscodeJob, TranscodeRequest};
use crate::ytdlp::YtDlpEngine;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;
pub type CompletionCallback = Box<dyn FnOnce(JobResult) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Download,
    Transcode,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Transcode => "transcode",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

pub enum Job {
    Download(DownloadJob),
    Transcode(TranscodeJob),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::Download(_) => JobKind::Download,
            Job::Transcode(_) => JobKind::Transcode,
        }
    }

    fn describe_for_log(&self) -> serde_json::Value {
        match self {
            Job::Download(job) => {
                let req = job.request();
                serde_json::json!({
                    "url": joblog::redact_url_for_log(&req.url),
                    "quality": req.quality.label(),
                    "destination_dir": req.destination_dir.to_string_lossy(),
                })
            }
            Job::Transcode(job) => {
                let req = job.request();
                serde_json::json!({
                    "input_path": req.input_path.to_string_lossy(),
                    "output_path": req.output_path().to_string_lossy(),
                    "video_codec": req.video_codec,
                    "audio_codec": req.audio_codec,
                    "preset": req.preset,
                })
            }
        }
    }
}

impl From<DownloadJob> for Job {
    fn from(job: DownloadJob) -> Self {
        Job::Download(job)
    }
}

impl From<TranscodeJob> for Job {
    fn from(job: TranscodeJob) -> Self {
        Job::Transcode(job)
    }
}

#[derive(Debug)]
struct Slot {
    state: JobState,
    result: Option<JobResult>,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    done: Condvar,
    cancel: AtomicBool,
}

impl Shared {
    fn new(state: JobState) -> Self {
        Self {
            slot: Mutex::new(Slot {
                state,
                result: None,
            }),
            done: Condvar::new(),
            cancel: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A poisoned slot still holds valid state; callbacks never run under it.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, result: JobResult) {
        let mut slot = self.lock();
        slot.state = if result.is_success() {
            JobState::Completed
        } else {
            JobState::Failed
        };
        slot.result = Some(result);
        self.done.notify_all();
    }
}

/// Caller-side view of one submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
    kind: JobKind,
    shared: Arc<Shared>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        self.shared.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Requests cancellation. A running engine process is killed and the job
    /// completes with a `Canceled` failure; finished jobs are unaffected.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    pub fn result(&self) -> Option<JobResult> {
        self.shared.lock().result.clone()
    }

    /// Blocks until the job is terminal. Returns after `on_complete` has run.
    pub fn wait(&self) -> JobResult {
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = &slot.result {
                return result.clone();
            }
            slot = self
                .shared
                .done
                .wait(slot)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobResult> {
        let slot = self.shared.lock();
        let (slot, _) = self
            .shared
            .done
            .wait_timeout_while(slot, timeout, |s| s.result.is_none())
            .unwrap_or_else(|e| e.into_inner());
        slot.result.clone()
    }
}

#[derive(Debug, Default)]
struct BusyFlags {
    download: AtomicBool,
    transcode: AtomicBool,
}

impl BusyFlags {
    fn flag(&self, kind: JobKind) -> &AtomicBool {
        match kind {
            JobKind::Download => &self.download,
            JobKind::Transcode => &self.transcode,
        }
    }

    fn try_acquire(&self, kind: JobKind) -> bool {
        self.flag(kind)
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self, kind: JobKind) {
        self.flag(kind).store(false, Ordering::SeqCst);
    }
}

/// Delivers a job's terminal result exactly once: busy flag first, then the
/// completion callback, then waiters. Dropping an unfinished finisher (worker
/// panic or a thread that never started) reports an internal failure. Waiters
/// are released even if `on_complete` panics.
struct Finisher {
    id: String,
    kind: JobKind,
    shared: Arc<Shared>,
    busy: Option<Arc<BusyFlags>>,
    log: JobLog,
    on_complete: Option<CompletionCallback>,
}

impl Finisher {
    fn finish(&mut self, result: JobResult) {
        let Some(on_complete) = self.on_complete.take() else {
            return;
        };

        match &result {
            JobResult::Success { output_path } => {
                log::info!("{} job {} finished: {}", self.kind, self.id, output_path.display());
                self.log.info(
                    "job_succeeded",
                    serde_json::json!({ "output_path": output_path.to_string_lossy() }),
                );
            }
            JobResult::Failure { kind, message } => {
                log::warn!("{} job {} failed ({}): {message}", self.kind, self.id, kind.as_str());
                self.log.error(
                    "job_failed",
                    serde_json::json!({ "kind": kind.as_str(), "message": message }),
                );
            }
        }

        if let Some(busy) = self.busy.take() {
            busy.release(self.kind);
        }
        let delivered = result.clone();
        if panic::catch_unwind(AssertUnwindSafe(move || on_complete(delivered))).is_err() {
            log::error!("{} job {}: on_complete panicked", self.kind, self.id);
        }
        self.shared.publish(result);
    }
}

impl Drop for Finisher {
    fn drop(&mut self) {
        if self.on_complete.is_some() {
            self.finish(JobResult::failure(
                FailureKind::Internal,
                "job worker stopped before producing a result",
            ));
        }
    }
}

/// Logs progress only when the whole-number percentage changes.
#[derive(Debug, Default)]
struct ProgressThrottle {
    last_whole: Option<i64>,
}

impl ProgressThrottle {
    fn should_log(&mut self, percent: f64) -> bool {
        let whole = percent.floor() as i64;
        if self.last_whole == Some(whole) {
            return false;
        }
        self.last_whole = Some(whole);
        true
    }
}

/// Accepts download and transcode jobs and runs each on its own worker
/// thread. At most one job of each kind runs at a time.
#[derive(Clone)]
pub struct JobRunner {
    locations: Arc<EngineLocations>,
    engine: Arc<dyn DownloadEngine>,
    busy: Arc<BusyFlags>,
}

impl JobRunner {
    pub fn new(locations: EngineLocations) -> Self {
        if let Some(dir) = locations.job_logs_dir.clone() {
            thread::spawn(move || {
                if let Err(e) = joblog::prune_job_logs(&dir) {
                    log::warn!("job log pruning failed: {e}");
                }
            });
        }

        let engine = Arc::new(YtDlpEngine::new(locations.ytdlp.clone()));
        Self {
            locations: Arc::new(locations),
            engine,
            busy: Arc::new(BusyFlags::default()),
        }
    }

    pub fn with_download_engine(mut self, engine: impl DownloadEngine + 'static) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn locations(&self) -> &EngineLocations {
        &self.locations
    }

    pub fn is_busy(&self, kind: JobKind) -> bool {
        self.busy.flag(kind).load(Ordering::SeqCst)
    }

    /// Starts `job` and returns immediately. `on_progress` and `on_complete`
    /// are invoked from a background thread; `on_complete` exactly once.
    pub fn submit<P, C>(&self, job: impl Into<Job>, on_progress: P, on_complete: C) -> JobHandle
    where
        P: FnMut(f64) + Send + 'static,
        C: FnOnce(JobResult) + Send + 'static,
    {
        let job = job.into();
        let kind = job.kind();
        let id = Uuid::new_v4().to_string();
        let log = JobLog::new(self.locations.job_logs_dir.as_deref(), &id, kind.as_str());

        let accepted = self.busy.try_acquire(kind);
        let shared = Arc::new(Shared::new(if accepted {
            JobState::Running
        } else {
            JobState::Idle
        }));
        let handle = JobHandle {
            id: id.clone(),
            kind,
            shared: shared.clone(),
        };
        let mut finisher = Finisher {
            id: id.clone(),
            kind,
            shared,
            busy: accepted.then(|| self.busy.clone()),
            log,
            on_complete: Some(Box::new(on_complete)),
        };

        let short_id: String = id.chars().take(8).collect();
        let spawned = if accepted {
            let locations = self.locations.clone();
            let engine = self.engine.clone();
            let mut on_progress: ProgressCallback = Box::new(on_progress);
            thread::Builder::new()
                .name(format!("mediafetch-{kind}-{short_id}"))
                .spawn(move || {
                    run_job(job, &locations, engine.as_ref(), &mut finisher, &mut on_progress)
                })
        } else {
            log::warn!("rejected {kind} job {id}: another {kind} job is running");
            let message = format!("a {kind} job is already running");
            thread::Builder::new()
                .name(format!("mediafetch-{kind}-{short_id}"))
                .spawn(move || {
                    finisher.finish(JobResult::failure(FailureKind::InvalidRequest, message))
                })
        };

        // On spawn failure the closure is dropped along with its finisher,
        // which reports the failure.
        if let Err(e) = spawned {
            log::error!("failed to start worker for {kind} job {id}: {e}");
        }

        handle
    }

    pub fn submit_download<P, C>(
        &self,
        url: impl Into<String>,
        quality: QualityProfile,
        destination_dir: impl Into<PathBuf>,
        on_progress: P,
        on_complete: C,
    ) -> JobHandle
    where
        P: FnMut(f64) + Send + 'static,
        C: FnOnce(JobResult) + Send + 'static,
    {
        let request = DownloadRequest::new(url, quality, destination_dir);
        self.submit(DownloadJob::new(request), on_progress, on_complete)
    }

    /// Transcodes with the configured codec defaults.
    pub fn submit_transcode<P, C>(
        &self,
        input_path: impl Into<PathBuf>,
        on_progress: P,
        on_complete: C,
    ) -> JobHandle
    where
        P: FnMut(f64) + Send + 'static,
        C: FnOnce(JobResult) + Send + 'static,
    {
        let request = TranscodeRequest::with_defaults(input_path, &self.locations.transcode);
        self.submit(TranscodeJob::new(request), on_progress, on_complete)
    }
}

fn run_job(
    job: Job,
    locations: &EngineLocations,
    engine: &dyn DownloadEngine,
    finisher: &mut Finisher,
    on_progress: &mut ProgressCallback,
) {
    log::info!("{} job {} started", finisher.kind, finisher.id);
    finisher.log.info("job_started", job.describe_for_log());

    let cancel = &finisher.shared.cancel;
    let log = &finisher.log;
    let mut throttle = ProgressThrottle::default();
    let mut relay = |percent: f64| {
        if throttle.should_log(percent) {
            log.info("progress", serde_json::json!({ "percent": percent }));
        }
        on_progress(percent);
    };

    let result = match job {
        Job::Download(job) => job.execute(locations, engine, cancel, &mut relay),
        Job::Transcode(job) => job.execute(locations, cancel, &mut relay),
    };
    finisher.finish(result);
}
