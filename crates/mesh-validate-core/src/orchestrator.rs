//! Multi-point validation run.
//!
//! Samples the five canonical locations of the effective mesh area in fixed
//! order, stops early on a breach when a remesh will follow anyway, lifts to
//! travel height, then either remeshes (breach) or recentres (clean).
//!
//! ```text
//! START -> SAMPLING -> TRAVEL_HOME -> { BREACH | CLEAN } -> END
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::command::Responder;
use crate::error::Result;
use crate::evaluator::{DeviationEvaluator, DeviationRecord};
use crate::host::{MoveTarget, Point2, ScriptRunner};
use crate::metrics::METRICS;
use crate::motion::SafeTravel;
use crate::obs;
use crate::params::EffectiveParameters;
use crate::remediation::remesh;

/// The canonical five sample locations for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePlan {
    locations: [Point2; 5],
}

impl SamplePlan {
    /// Min corner, (min x, max y), midpoint, (max x, min y), max corner.
    pub fn from_bounds(min: Point2, max: Point2) -> Self {
        let mid = Point2::midpoint(min, max);
        Self {
            locations: [
                min,
                Point2::new(min.x, max.y),
                mid,
                Point2::new(max.x, min.y),
                max,
            ],
        }
    }

    pub fn for_params(params: &EffectiveParameters) -> Self {
        Self::from_bounds(params.mesh_min, params.mesh_max)
    }

    pub fn locations(&self) -> &[Point2; 5] {
        &self.locations
    }

    pub fn midpoint(&self) -> Point2 {
        self.locations[2]
    }
}

/// Outcome of a multi-point run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRunResult {
    pub run_id: String,
    /// Evaluated points in sampling order. Fewer than five after an early exit.
    pub records: Vec<DeviationRecord>,
    pub breached: bool,
    pub remesh_triggered: bool,
    pub max_deviation: f64,
    /// Signed deviation with the largest magnitude, if any point was probed.
    pub worst_deviation: Option<f64>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one run across the evaluator, travel sequencer and remesh trigger.
pub struct Orchestrator<'a> {
    evaluator: DeviationEvaluator<'a>,
    travel: &'a SafeTravel,
    scripts: &'a dyn ScriptRunner,
    responder: &'a dyn Responder,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        evaluator: DeviationEvaluator<'a>,
        travel: &'a SafeTravel,
        scripts: &'a dyn ScriptRunner,
        responder: &'a dyn Responder,
    ) -> Self {
        Self {
            evaluator,
            travel,
            scripts,
            responder,
        }
    }

    pub async fn run(
        &self,
        run_id: &str,
        params: &EffectiveParameters,
    ) -> Result<ValidationRunResult> {
        self.run_inner(run_id, params)
            .instrument(obs::run_span(run_id))
            .await
    }

    async fn run_inner(
        &self,
        run_id: &str,
        params: &EffectiveParameters,
    ) -> Result<ValidationRunResult> {
        obs::emit_run_started(run_id, params.max_deviation, params.remesh_enabled);

        let plan = SamplePlan::for_params(params);
        let mut records = Vec::with_capacity(plan.locations().len());
        let mut breached = false;

        for (index, location) in plan.locations().iter().enumerate() {
            let record = self.evaluator.evaluate(*location).await?;
            self.responder.respond_info(&format!(
                "VALIDATE MESH {} Deviation = {:.4}mm",
                record.location, record.deviation
            ));
            obs::emit_point_evaluated(index, &record);
            records.push(record);

            if record.exceeds(params.max_deviation) {
                obs::emit_breach(&record, params.max_deviation);
                breached = true;
                if params.remesh_enabled {
                    debug!(skipped = plan.locations().len() - index - 1, "early exit");
                    break;
                }
            }
        }

        self.travel.lift(params.travel_height).await?;

        let remesh_triggered = if breached {
            self.handle_breach(params).await?
        } else {
            self.travel
                .travel_to(MoveTarget::xy(plan.midpoint()))
                .await?;
            self.responder.respond_info(&format!(
                "VALIDATE MESH: All points within {:.4}mm deviation",
                params.max_deviation
            ));
            false
        };

        METRICS.inc_runs_completed();
        obs::emit_run_finished(run_id, records.len(), breached, remesh_triggered);

        let worst_deviation = records
            .iter()
            .map(|r| r.deviation)
            .max_by(|a, b| a.abs().total_cmp(&b.abs()));

        Ok(ValidationRunResult {
            run_id: run_id.to_string(),
            records,
            breached,
            remesh_triggered,
            max_deviation: params.max_deviation,
            worst_deviation,
            finished_at: Utc::now(),
        })
    }

    async fn handle_breach(&self, params: &EffectiveParameters) -> Result<bool> {
        if !params.remesh_enabled {
            obs::emit_remesh_skipped(params.max_deviation);
            self.responder.respond_info(&format!(
                "VALIDATE MESH: Deviation exceeded {:.4}mm, remesh skipped",
                params.max_deviation
            ));
            return Ok(false);
        }

        self.responder.respond_info(&format!(
            "VALIDATE MESH: Deviation exceeded {:.4}mm, remeshing recommended",
            params.max_deviation
        ));
        remesh(self.scripts, params.save_after_remesh).await?;
        Ok(true)
    }
}
