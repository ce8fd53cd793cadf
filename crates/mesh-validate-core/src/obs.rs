//! Structured lifecycle events for validation runs.
//!
//! - `run_span` tagging everything inside a run with its id
//! - `emit_*` functions for the key events: start, point, breach, remesh,
//!   finish
//!
//! Events are emitted at `info!` level unless noted.

use tracing::{info, warn};

use crate::evaluator::DeviationRecord;

/// Span for one validation run. Attach it with
/// [`tracing::Instrument::instrument`] so it follows the run across awaits.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("mesh_validate.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, max_deviation: f64, remesh_enabled: bool) {
    info!(
        event = "validate.run_started",
        run_id = %run_id,
        max_deviation,
        remesh_enabled,
    );
}

pub fn emit_point_evaluated(index: usize, record: &DeviationRecord) {
    info!(
        event = "validate.point_evaluated",
        index,
        x = record.location.x,
        y = record.location.y,
        predicted_z = record.predicted_z,
        measured_z = record.measured_z,
        deviation = record.deviation,
    );
}

/// Breach detected (warning level).
pub fn emit_breach(record: &DeviationRecord, max_deviation: f64) {
    warn!(
        event = "validate.breach",
        x = record.location.x,
        y = record.location.y,
        deviation = record.deviation,
        max_deviation,
    );
}

pub fn emit_remesh_triggered(save_after_remesh: bool) {
    info!(event = "validate.remesh_triggered", save_after_remesh);
}

/// Breach detected but remeshing is disabled (warning level).
pub fn emit_remesh_skipped(max_deviation: f64) {
    warn!(event = "validate.remesh_skipped", max_deviation);
}

pub fn emit_run_finished(run_id: &str, points: usize, breached: bool, remesh_triggered: bool) {
    info!(
        event = "validate.run_finished",
        run_id = %run_id,
        points,
        breached,
        remesh_triggered,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Point2;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
    }

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let record = DeviationRecord::new(Point2::new(0.0, 0.0), 0.0, 0.1);
        emit_run_started("r", 0.05, true);
        emit_point_evaluated(0, &record);
        emit_breach(&record, 0.05);
        emit_remesh_triggered(false);
        emit_remesh_skipped(0.05);
        emit_run_finished("r", 1, true, false);
    }
}
