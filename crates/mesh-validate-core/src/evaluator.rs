//! Single-point deviation evaluation.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{ProbeError, ProbeResult, Result};
use crate::host::{BedMesh, Point2, Probe, ProbeSession};
use crate::metrics::METRICS;
use crate::motion::SafeTravel;
use crate::status::{PublishedStatus, ResultPublisher};

/// Predicted versus measured height at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationRecord {
    pub location: Point2,
    /// Height predicted by the active mesh.
    pub predicted_z: f64,
    /// Probed height, already corrected for the probe Z offset.
    pub measured_z: f64,
    /// `measured_z - predicted_z`.
    pub deviation: f64,
}

impl DeviationRecord {
    pub fn new(location: Point2, predicted_z: f64, measured_z: f64) -> Self {
        Self {
            location,
            predicted_z,
            measured_z,
            deviation: measured_z - predicted_z,
        }
    }

    /// Whether `|deviation|` exceeds `max_deviation`.
    pub fn exceeds(&self, max_deviation: f64) -> bool {
        self.deviation.abs() > max_deviation
    }
}

/// Measures one point and publishes the outcome.
pub struct DeviationEvaluator<'a> {
    bed_mesh: &'a dyn BedMesh,
    probe: &'a dyn Probe,
    travel: &'a SafeTravel,
    publisher: &'a ResultPublisher,
    travel_height: f64,
    probe_z_offset: f64,
}

impl<'a> DeviationEvaluator<'a> {
    pub fn new(
        bed_mesh: &'a dyn BedMesh,
        probe: &'a dyn Probe,
        travel: &'a SafeTravel,
        publisher: &'a ResultPublisher,
        travel_height: f64,
        probe_z_offset: f64,
    ) -> Self {
        Self {
            bed_mesh,
            probe,
            travel,
            publisher,
            travel_height,
            probe_z_offset,
        }
    }

    /// Predict, travel, probe once, and compute the signed deviation.
    ///
    /// Probe failures are returned as-is; no retry is attempted.
    #[instrument(skip(self), fields(x = location.x, y = location.y))]
    pub async fn evaluate(&self, location: Point2) -> Result<DeviationRecord> {
        let predicted_z = self.bed_mesh.calc_z(location.x, location.y)?;
        self.publisher.publish(PublishedStatus {
            last_mesh_z: predicted_z,
            ..self.publisher.snapshot()
        });

        self.travel
            .lift_then_move(self.travel_height, location)
            .await?;

        let raw_z = self.probe_once().await?;
        let record = DeviationRecord::new(location, predicted_z, raw_z - self.probe_z_offset);
        self.publisher.publish(PublishedStatus::from(&record));
        METRICS.inc_points_probed();

        debug!(
            predicted_z = record.predicted_z,
            measured_z = record.measured_z,
            deviation = record.deviation,
            "point evaluated"
        );
        Ok(record)
    }

    /// One trigger inside a session that is always ended, even on failure.
    async fn probe_once(&self) -> Result<f64> {
        let mut session = self.probe.start_session().await?;
        let measured = measure(session.as_mut()).await;
        let ended = session.end_session().await;
        let z = measured?;
        ended?;
        Ok(z)
    }
}

async fn measure(session: &mut dyn ProbeSession) -> ProbeResult<f64> {
    session.run_probe().await?;
    let results = session.pull_probed_results().await?;
    results
        .first()
        .map(|position| position[2])
        .ok_or(ProbeError::NoResult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_is_measured_minus_predicted() {
        let record = DeviationRecord::new(Point2::new(50.0, 50.0), 0.02, 0.05);
        assert!((record.deviation - 0.03).abs() < 1e-12);
        assert!(!record.exceeds(0.05));
        assert!(record.exceeds(0.01));
    }

    #[test]
    fn test_negative_deviation_uses_absolute_value() {
        let record = DeviationRecord::new(Point2::new(0.0, 0.0), 0.10, 0.04);
        assert!(record.deviation < 0.0);
        assert!(record.exceeds(0.05));
    }

    #[test]
    fn test_deviation_equal_to_threshold_is_not_a_breach() {
        let above = DeviationRecord::new(Point2::new(0.0, 0.0), 0.0, 0.5);
        let below = DeviationRecord::new(Point2::new(0.0, 0.0), 0.5, 0.0);
        assert!(!above.exceeds(0.5));
        assert!(!below.exceeds(0.5));
        assert!(above.exceeds(0.25));
    }
}
