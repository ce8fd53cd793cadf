//! Process-wide counters for validation runs.
//!
//! The evaluator counts each probed point, the orchestrator each finished
//! run and the remediation trigger each remesh. Binaries call
//! [`Metrics::flush`] once on exit to log the totals.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global counters.
pub static METRICS: Metrics = Metrics::new();

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub points_probed: u64,
    pub runs_completed: u64,
    pub remeshes_triggered: u64,
}

#[derive(Debug)]
pub struct Metrics {
    points_probed: AtomicU64,
    runs_completed: AtomicU64,
    remeshes_triggered: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            points_probed: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            remeshes_triggered: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc_points_probed(&self) {
        bump(&self.points_probed, "points_probed");
    }

    pub(crate) fn inc_runs_completed(&self) {
        bump(&self.runs_completed, "runs_completed");
    }

    pub(crate) fn inc_remeshes(&self) {
        bump(&self.remeshes_triggered, "remeshes_triggered");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            points_probed: self.points_probed.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            remeshes_triggered: self.remeshes_triggered.load(Ordering::Relaxed),
        }
    }

    /// Log the current totals as one `info!` event.
    pub fn flush(&self) {
        let totals = self.snapshot();
        tracing::info!(
            metric = "flush",
            points_probed = totals.points_probed,
            runs_completed = totals.runs_completed,
            remeshes_triggered = totals.remeshes_triggered,
        );
    }

    /// Zero every counter. Counters are process-wide, so callers that assert
    /// on totals must not share the process with other runs.
    pub fn reset(&self) {
        for counter in [
            &self.points_probed,
            &self.runs_completed,
            &self.remeshes_triggered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_each_counter() {
        let m = Metrics::new();
        m.inc_points_probed();
        m.inc_points_probed();
        m.inc_runs_completed();
        m.inc_remeshes();
        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                points_probed: 2,
                runs_completed: 1,
                remeshes_triggered: 1,
            }
        );
    }

    #[test]
    fn test_reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_points_probed();
        m.inc_runs_completed();
        m.inc_remeshes();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
