use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::Duration;

use crate::assets::text::{SvgTextRasterizer, TextRasterizer};
use crate::foundation::error::{ErrorCode, VidmarkError, VidmarkResult};
use crate::media::backend::MediaBackend;
use crate::pipeline::compose::{
    ComposeJob, ComposeSummary, PipelineOpts, PipelineOutcome, run_compose,
};
use crate::pipeline::progress::Progress;
use crate::request::model::ComposeRequest;

/// Terminal result of a task. Exactly one is produced per started task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Completed(ComposeSummary),
    Cancelled,
    Failed { code: ErrorCode, message: String },
}

impl TaskOutcome {
    fn from_pipeline(outcome: PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Completed(summary) => Self::Completed(summary),
            PipelineOutcome::Cancelled => Self::Cancelled,
            PipelineOutcome::Failed(e) => Self::Failed {
                code: e.code(),
                message: e.to_string(),
            },
        }
    }

    /// Error code for non-completed outcomes.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Completed(_) => None,
            Self::Cancelled => Some(ErrorCode::Cancelled),
            Self::Failed { code, .. } => Some(*code),
        }
    }
}

/// Caller-facing callback contract for one task.
pub trait TaskCallbacks {
    fn on_progress(&mut self, task_id: &str, fraction: f64, eta_secs: f64);
    fn on_completed(&mut self, task_id: &str, summary: &ComposeSummary);
    fn on_error(&mut self, task_id: &str, code: ErrorCode, message: &str);

    fn on_cancelled(&mut self, task_id: &str) {
        self.on_error(task_id, ErrorCode::Cancelled, "task was cancelled");
    }
}

/// Handle to a started task: a many-shot progress channel and a one-shot outcome channel.
///
/// The progress channel disconnects before the outcome is sent, so every progress value is
/// observable before the terminal one.
pub struct TaskTicket {
    id: String,
    output_path: PathBuf,
    progress: mpsc::Receiver<Progress>,
    outcome: mpsc::Receiver<TaskOutcome>,
}

impl TaskTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where the output file is written on success.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn progress(&self) -> &mpsc::Receiver<Progress> {
        &self.progress
    }

    /// Block until the task terminates, discarding progress.
    pub fn wait(self) -> TaskOutcome {
        recv_outcome(&self.outcome)
    }

    /// Wait at most `timeout` for the terminal outcome.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(worker_lost()),
        }
    }

    /// Forward every progress update and then exactly one terminal callback.
    pub fn drive(self, callbacks: &mut dyn TaskCallbacks) -> TaskOutcome {
        for p in self.progress.iter() {
            callbacks.on_progress(&self.id, p.fraction, p.eta_secs);
        }
        let outcome = recv_outcome(&self.outcome);
        match &outcome {
            TaskOutcome::Completed(summary) => callbacks.on_completed(&self.id, summary),
            TaskOutcome::Cancelled => callbacks.on_cancelled(&self.id),
            TaskOutcome::Failed { code, message } => callbacks.on_error(&self.id, *code, message),
        }
        outcome
    }
}

fn recv_outcome(rx: &mpsc::Receiver<TaskOutcome>) -> TaskOutcome {
    rx.recv().unwrap_or_else(|_| worker_lost())
}

fn worker_lost() -> TaskOutcome {
    TaskOutcome::Failed {
        code: ErrorCode::ComposeFailed,
        message: "task worker exited without reporting an outcome".to_string(),
    }
}

#[derive(Debug, Default)]
struct LiveTask {
    cancelled: AtomicBool,
}

type LiveMap = Mutex<HashMap<String, Arc<LiveTask>>>;

fn lock_live(live: &LiveMap) -> MutexGuard<'_, HashMap<String, Arc<LiveTask>>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a task from the live map when dropped, including on worker panic.
struct LiveGuard {
    live: Arc<LiveMap>,
    id: String,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        lock_live(&self.live).remove(&self.id);
    }
}

/// Starts compose tasks on dedicated worker threads and tracks them until they terminate.
pub struct TaskManager {
    backend: Arc<dyn MediaBackend>,
    rasterizer: Arc<dyn TextRasterizer>,
    opts: PipelineOpts,
    live: Arc<LiveMap>,
}

impl TaskManager {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            rasterizer: Arc::new(SvgTextRasterizer::new()),
            opts: PipelineOpts::default(),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn TextRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_opts(mut self, opts: PipelineOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Schedule `request` under `id` and return immediately.
    ///
    /// Fails only when `id` is empty, already live, or no worker thread can be spawned. All
    /// other failures are reported through the ticket.
    pub fn start(
        &self,
        request: ComposeRequest,
        id: impl Into<String>,
    ) -> VidmarkResult<TaskTicket> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(VidmarkError::validation("task id must be non-empty"));
        }

        let task = Arc::new(LiveTask::default());
        {
            let mut live = lock_live(&self.live);
            if live.contains_key(&id) {
                return Err(VidmarkError::validation(format!(
                    "task '{id}' is already running"
                )));
            }
            live.insert(id.clone(), Arc::clone(&task));
        }
        let guard = LiveGuard {
            live: Arc::clone(&self.live),
            id: id.clone(),
        };

        let output_path = request
            .output_path
            .clone()
            .unwrap_or_else(|| generated_output_path(&id));
        let (progress_tx, progress_rx) = mpsc::channel();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let backend = Arc::clone(&self.backend);
        let rasterizer = Arc::clone(&self.rasterizer);
        let opts = self.opts;
        let worker_out = output_path.clone();
        let worker_id = id.clone();

        std::thread::Builder::new()
            .name(format!("vidmark-task-{id}"))
            .spawn(move || {
                let outcome = run_task(
                    &worker_id,
                    &request,
                    &worker_out,
                    backend.as_ref(),
                    rasterizer.as_ref(),
                    opts,
                    &task.cancelled,
                    progress_tx,
                );
                drop(guard);
                let _ = outcome_tx.send(outcome);
            })
            .map_err(|e| VidmarkError::resource(format!("failed to spawn task worker: {e}")))?;

        tracing::info!(task = %id, output = %output_path.display(), "task started");
        Ok(TaskTicket {
            id,
            output_path,
            progress: progress_rx,
            outcome: outcome_rx,
        })
    }

    /// Request cooperative cancellation. Returns `false` for unknown or terminated ids.
    pub fn cancel(&self, id: &str) -> bool {
        match lock_live(&self.live).get(id) {
            Some(task) => {
                task.cancelled.store(true, Ordering::Release);
                tracing::info!(task = %id, "task cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: &str) -> bool {
        lock_live(&self.live).contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        lock_live(&self.live).len()
    }
}

#[allow(clippy::too_many_arguments)]
fn run_task(
    id: &str,
    request: &ComposeRequest,
    output_path: &Path,
    backend: &dyn MediaBackend,
    rasterizer: &dyn TextRasterizer,
    opts: PipelineOpts,
    cancel: &AtomicBool,
    progress_tx: mpsc::Sender<Progress>,
) -> TaskOutcome {
    let run = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run_compose(
            ComposeJob {
                request,
                output_path,
                backend,
                rasterizer,
                opts,
                cancel,
            },
            &mut |p| {
                let _ = progress_tx.send(p);
            },
        )
    }));
    drop(progress_tx);

    let outcome = match run {
        Ok(outcome) => TaskOutcome::from_pipeline(outcome),
        Err(_) => {
            let _ = std::fs::remove_file(output_path);
            TaskOutcome::Failed {
                code: ErrorCode::ComposeFailed,
                message: "compose worker panicked".to_string(),
            }
        }
    };
    match &outcome {
        TaskOutcome::Completed(s) => {
            tracing::info!(task = %id, frames = s.video_frames, "task completed")
        }
        TaskOutcome::Cancelled => tracing::info!(task = %id, "task cancelled"),
        TaskOutcome::Failed { code, message } => {
            tracing::warn!(task = %id, code = %code, message = %message, "task failed")
        }
    }
    outcome
}

fn generated_output_path(id: &str) -> PathBuf {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!(
        "vidmark_{safe}_{}_{}.mp4",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/task/manager.rs"]
mod tests;
