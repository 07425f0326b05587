//! Rate-limited progress reporting.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use podclip_db::JobStore;

/// Minimum interval between progress writes.
const MIN_WRITE_INTERVAL: Duration = Duration::from_millis(250);

/// Delta that forces a write regardless of the interval.
const MIN_WRITE_DELTA: u8 = 5;

/// Reports a job's progress without flooding the store.
///
/// Writes go through when at least 250 ms have passed since the last one or
/// the value moved by 5+ points; 0 and 100 always go through. Values are
/// monotonic; a handler reporting a smaller value than before is ignored.
pub struct ProgressReporter {
    store: JobStore,
    job_id: i64,
    state: Mutex<ReporterState>,
}

struct ReporterState {
    last_written: Option<(Instant, u8)>,
}

impl ProgressReporter {
    pub fn new(store: JobStore, job_id: i64) -> Self {
        Self {
            store,
            job_id,
            state: Mutex::new(ReporterState { last_written: None }),
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Report progress; clamped to [0, 100].
    pub fn report(&self, pct: u8) {
        let pct = pct.min(100);

        let mut state = self.state.lock().unwrap();
        if let Some((written_at, written_pct)) = state.last_written {
            if pct <= written_pct {
                return;
            }
            let forced = pct == 100 || pct - written_pct >= MIN_WRITE_DELTA;
            if !forced && written_at.elapsed() < MIN_WRITE_INTERVAL {
                return;
            }
        }

        // Store failures degrade progress reporting, never the job itself.
        if let Err(e) = self.store.update_progress(self.job_id, pct) {
            warn!(job_id = self.job_id, "Progress write failed: {e}");
            return;
        }
        state.last_written = Some((Instant::now(), pct));
    }

    /// Report a fraction of a phase mapped onto `[base, base + span]`.
    ///
    /// Extraction uses this to map download bytes onto 0-50 and transcode
    /// onto 50-95 without each phase knowing the overall layout.
    pub fn report_phase(&self, base: u8, span: u8, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let pct = base as f64 + span as f64 * fraction;
        self.report(pct.round() as u8);
    }
}
