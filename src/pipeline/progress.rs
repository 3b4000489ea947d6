/// One progress report for a running job.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Progress {
    /// Completed fraction in `[0, 1]`, non-decreasing over a job.
    pub fraction: f64,
    /// Estimated remaining media seconds, `>= 0`.
    pub eta_secs: f64,
}

/// Turns frame timestamps into monotonic [`Progress`] values.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProgressTracker {
    duration_secs: f64,
    best: f64,
}

impl ProgressTracker {
    pub(crate) fn new(duration_secs: f64) -> Self {
        let duration_secs = if duration_secs.is_finite() {
            duration_secs.max(0.0)
        } else {
            0.0
        };
        Self {
            duration_secs,
            best: 0.0,
        }
    }

    pub(crate) fn observe(&mut self, pts_secs: f64) -> Progress {
        let raw = if self.duration_secs > 0.0 && pts_secs.is_finite() {
            (pts_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.best = self.best.max(raw);
        let eta_secs = if pts_secs.is_finite() {
            (self.duration_secs - pts_secs).max(0.0)
        } else {
            self.duration_secs
        };
        Progress {
            fraction: self.best,
            eta_secs,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/progress.rs"]
mod tests;
