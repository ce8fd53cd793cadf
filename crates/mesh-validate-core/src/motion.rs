//! Safe-travel motion sequencing.
//!
//! Every measurement is preceded by a lift to travel height and only then a
//! horizontal move. Each move is waited on before returning; probes that need
//! arming get a zero-reference step bracketed by short dwells.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::host::{MoveTarget, Point2, Probe, ProbeVariant, Toolhead};

/// Dwell (seconds) on each side of the zero-arming step.
pub const ARMING_DWELL_SECS: f64 = 0.05;

/// Issues moves on the toolhead and waits for them to finish.
pub struct SafeTravel {
    toolhead: Arc<dyn Toolhead>,
    probe: Arc<dyn Probe>,
    variant: ProbeVariant,
    travel_speed: f64,
    lift_speed: f64,
}

impl SafeTravel {
    pub fn new(
        toolhead: Arc<dyn Toolhead>,
        probe: Arc<dyn Probe>,
        variant: ProbeVariant,
        travel_speed: f64,
        lift_speed: f64,
    ) -> Self {
        Self {
            toolhead,
            probe,
            variant,
            travel_speed,
            lift_speed,
        }
    }

    /// Move to `target`. A move that carries Z uses the probe lift speed,
    /// otherwise the travel speed.
    pub async fn travel_to(&self, target: MoveTarget) -> Result<()> {
        let speed = if target.z.is_some() {
            self.lift_speed
        } else {
            self.travel_speed
        };
        debug!(target = ?target.as_array(), speed, "travel");

        self.toolhead.manual_move(target, speed).await?;
        self.toolhead.wait_moves().await?;

        if self.variant.requires_zero_arming() {
            self.toolhead.dwell(ARMING_DWELL_SECS).await?;
            self.probe.home_zero().await?;
            self.toolhead.dwell(ARMING_DWELL_SECS).await?;
        }
        Ok(())
    }

    /// Lift to `travel_height` without moving X/Y.
    pub async fn lift(&self, travel_height: f64) -> Result<()> {
        self.travel_to(MoveTarget::z(travel_height)).await
    }

    /// Lift to `travel_height`, then move horizontally to `point`.
    pub async fn lift_then_move(&self, travel_height: f64, point: Point2) -> Result<()> {
        self.lift(travel_height).await?;
        self.travel_to(MoveTarget::xy(point)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{HostCall, SimulatedPrinter, SimulationConfig};

    fn travel(printer: &SimulatedPrinter, variant: ProbeVariant) -> SafeTravel {
        SafeTravel::new(printer.toolhead(), printer.probe(), variant, 50.0, 5.0)
    }

    #[tokio::test]
    async fn test_z_move_uses_lift_speed_and_waits() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        travel(&printer, ProbeVariant::Standard)
            .travel_to(MoveTarget::z(3.0))
            .await
            .unwrap();
        assert_eq!(
            printer.calls(),
            vec![
                HostCall::Move {
                    target: MoveTarget::z(3.0),
                    speed: 5.0,
                },
                HostCall::WaitMoves,
            ]
        );
    }

    #[tokio::test]
    async fn test_xy_move_uses_travel_speed() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        let target = MoveTarget::xy(Point2::new(10.0, 20.0));
        travel(&printer, ProbeVariant::Standard)
            .travel_to(target)
            .await
            .unwrap();
        assert_eq!(
            printer.calls()[0],
            HostCall::Move {
                target,
                speed: 50.0,
            }
        );
    }

    #[tokio::test]
    async fn test_zero_armed_probe_is_bracketed_by_dwells() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        travel(&printer, ProbeVariant::ZeroArmed)
            .travel_to(MoveTarget::z(3.0))
            .await
            .unwrap();
        let calls = printer.calls();
        assert_eq!(
            &calls[1..],
            &[
                HostCall::WaitMoves,
                HostCall::Dwell(ARMING_DWELL_SECS),
                HostCall::HomeZero,
                HostCall::Dwell(ARMING_DWELL_SECS),
            ]
        );
    }

    #[tokio::test]
    async fn test_lift_precedes_horizontal_move() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        travel(&printer, ProbeVariant::Standard)
            .lift_then_move(3.0, Point2::new(50.0, 60.0))
            .await
            .unwrap();
        let moves: Vec<MoveTarget> = printer
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Move { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(
            moves,
            vec![MoveTarget::z(3.0), MoveTarget::xy(Point2::new(50.0, 60.0))]
        );
    }
}
