use super::*;
use crate::media::memory::{MemoryBackend, MemorySource};

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl TaskCallbacks for Recorder {
    fn on_progress(&mut self, task_id: &str, fraction: f64, _eta_secs: f64) {
        self.events.push(format!("progress {task_id} {fraction:.2}"));
    }

    fn on_completed(&mut self, task_id: &str, summary: &ComposeSummary) {
        self.events
            .push(format!("completed {task_id} {}x{}", summary.width, summary.height));
    }

    fn on_error(&mut self, task_id: &str, code: ErrorCode, _message: &str) {
        self.events.push(format!("error {task_id} {code}"));
    }
}

fn manager(source: MemorySource) -> TaskManager {
    TaskManager::new(Arc::new(MemoryBackend::new(source))).with_opts(PipelineOpts {
        backoff: Duration::from_millis(1),
        ..PipelineOpts::default()
    })
}

fn scratch_request(name: &str) -> (ComposeRequest, PathBuf) {
    let dir = std::env::temp_dir().join(format!("vidmark_task_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let mut req = ComposeRequest::new("in.mp4");
    req.output_path = Some(dir.join("out.mp4"));
    (req, dir)
}

#[test]
fn generated_output_path_is_sanitized_mp4_in_temp_dir() {
    let p = generated_output_path("job/1 a");
    assert_eq!(p.parent(), Some(std::env::temp_dir().as_path()));
    let name = p.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("vidmark_job_1_a_"));
    assert!(name.ends_with(".mp4"));
}

#[test]
fn empty_id_is_rejected() {
    let m = manager(MemorySource::video_only(4, 4, 10, 1));
    assert!(m.start(ComposeRequest::new("in.mp4"), "  ").is_err());
    assert_eq!(m.live_count(), 0);
}

#[test]
fn drive_delivers_progress_then_one_terminal_callback() {
    let (req, dir) = scratch_request("drive");
    let m = manager(MemorySource::video_only(4, 4, 10, 4));
    let ticket = m.start(req, "t1").unwrap();
    let mut rec = Recorder::default();
    let outcome = ticket.drive(&mut rec);

    assert!(matches!(outcome, TaskOutcome::Completed(_)));
    assert_eq!(
        rec.events,
        vec![
            "progress t1 0.00",
            "progress t1 0.25",
            "progress t1 0.50",
            "progress t1 0.75",
            "completed t1 4x4",
        ]
    );
    assert!(!m.is_live("t1"));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cancelled_outcome_maps_to_cancelled_error_callback() {
    let mut rec = Recorder::default();
    rec.on_cancelled("t9");
    assert_eq!(rec.events, vec!["error t9 cancelled"]);
    assert_eq!(TaskOutcome::Cancelled.error_code(), Some(ErrorCode::Cancelled));
}

#[test]
fn invalid_request_fails_through_the_ticket() {
    let (mut req, dir) = scratch_request("invalid");
    req.opacity = 2.0;
    let m = manager(MemorySource::video_only(4, 4, 10, 1));
    let outcome = m.start(req, "bad").unwrap().wait();
    assert_eq!(outcome.error_code(), Some(ErrorCode::ComposeFailed));
    std::fs::remove_dir_all(&dir).ok();
}
