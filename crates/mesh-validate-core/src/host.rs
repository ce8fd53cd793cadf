//! Host collaborator traits.
//!
//! The validator never talks to hardware directly. These traits describe the
//! exact calls it makes on the printer host:
//! - `Toolhead`: absolute moves, wait-for-completion, dwell
//! - `Probe` / `ProbeSession`: offsets, lift speed, one-shot measurements
//! - `BedMesh`: predicted height lookup and mesh bounds
//! - `ScriptRunner`: named host procedures (recalibration, persistence)
//!
//! All traits are async and backend-agnostic. An in-memory implementation is
//! provided by the `sim` module.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MeshResult, MotionResult, ProbeResult, ScriptResult};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// An (x, y) coordinate on the bed, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Componentwise `min + (max - min) / 2`.
    pub fn midpoint(min: Point2, max: Point2) -> Self {
        Self {
            x: min.x + (max.x - min.x) / 2.0,
            y: min.y + (max.y - min.y) / 2.0,
        }
    }
}

impl std::fmt::Display for Point2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}, {:.2}", self.x, self.y)
    }
}

/// Rectangular probing area of the active mesh configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshBounds {
    pub min: Point2,
    pub max: Point2,
}

/// Per-axis optional target for an absolute move. `None` leaves the axis
/// where it is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveTarget {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl MoveTarget {
    /// Vertical-only move.
    pub const fn z(z: f64) -> Self {
        Self {
            x: None,
            y: None,
            z: Some(z),
        }
    }

    /// Horizontal-only move.
    pub const fn xy(point: Point2) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
            z: None,
        }
    }

    pub fn as_array(&self) -> [Option<f64>; 3] {
        [self.x, self.y, self.z]
    }
}

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

/// Motion system of the printer.
#[async_trait]
pub trait Toolhead: Send + Sync {
    /// Queue an absolute move. Omitted axes keep their current position.
    async fn manual_move(&self, target: MoveTarget, speed: f64) -> MotionResult<()>;

    /// Block until every queued move has completed.
    async fn wait_moves(&self) -> MotionResult<()>;

    /// Pause the motion queue for `seconds`.
    async fn dwell(&self, seconds: f64) -> MotionResult<()>;
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Probe offsets relative to the nozzle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProbeOffsets {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Probe parameters the validator depends on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Speed (mm/s) used for vertical moves.
    pub lift_speed: f64,
}

/// A scoped probing interaction. Must be ended exactly once.
#[async_trait]
pub trait ProbeSession: Send {
    /// Perform one trigger-and-read cycle at the current position.
    async fn run_probe(&mut self) -> ProbeResult<()>;

    /// Positions recorded by `run_probe`, in order.
    async fn pull_probed_results(&mut self) -> ProbeResult<Vec<[f64; 3]>>;

    /// Release the probe.
    async fn end_session(self: Box<Self>) -> ProbeResult<()>;
}

/// Measurement hardware.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Configured name of the probe (e.g. `probe`, `probe_air`).
    fn name(&self) -> String;

    fn offsets(&self) -> ProbeOffsets;

    fn params(&self) -> ProbeParams;

    async fn start_session(&self) -> ProbeResult<Box<dyn ProbeSession>>;

    /// Re-establish the zero reference before a trigger. Only probes that
    /// need arming implement this meaningfully.
    async fn home_zero(&self) -> ProbeResult<()> {
        Ok(())
    }
}

/// Probe variants that differ in how a measurement must be prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeVariant {
    Standard,
    /// Requires a zero-reference step after every move.
    ZeroArmed,
}

impl ProbeVariant {
    const ZERO_ARMED_PREFIX: &'static str = "probe_air";

    /// Resolve the variant from the probe's configured name.
    pub fn from_probe_name(name: &str) -> Self {
        if name.starts_with(Self::ZERO_ARMED_PREFIX) {
            ProbeVariant::ZeroArmed
        } else {
            ProbeVariant::Standard
        }
    }

    pub fn requires_zero_arming(&self) -> bool {
        matches!(self, ProbeVariant::ZeroArmed)
    }
}

// ---------------------------------------------------------------------------
// Bed mesh
// ---------------------------------------------------------------------------

/// Height map subsystem.
pub trait BedMesh: Send + Sync {
    /// Predicted surface height at (x, y) from the active mesh.
    fn calc_z(&self, x: f64, y: f64) -> MeshResult<f64>;

    /// Probing area of the current mesh configuration.
    fn bounds(&self) -> MeshBounds;
}

// ---------------------------------------------------------------------------
// Host procedures
// ---------------------------------------------------------------------------

/// Runs named host procedures from within a command.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &str) -> ScriptResult<()>;
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Sibling subsystems looked up once the host has finished initialising.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub toolhead: Option<Arc<dyn Toolhead>>,
    pub probe: Option<Arc<dyn Probe>>,
    pub bed_mesh: Option<Arc<dyn BedMesh>>,
    pub scripts: Option<Arc<dyn ScriptRunner>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("toolhead", &self.toolhead.is_some())
            .field("probe", &self.probe.is_some())
            .field("bed_mesh", &self.bed_mesh.is_some())
            .field("scripts", &self.scripts.is_some())
            .finish()
    }
}
