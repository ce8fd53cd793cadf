//! Mesh Validate Core
//!
//! Checks that a previously computed bed mesh still matches the bed, by
//! probing a handful of representative points and comparing each measured
//! height with the height the mesh predicts. A deviation beyond the
//! configured threshold triggers a remesh.
//!
//! ## Key Components
//!
//! - `EffectiveParameters`: configuration defaults merged with per-command overrides
//! - `SafeTravel`: lift-then-move sequencing with optional probe arming
//! - `DeviationEvaluator`: one predicted-versus-measured comparison
//! - `Orchestrator`: the five-point run with early exit and remesh decision
//! - `BedMeshValidator`: two-phase host binding and command dispatch
//!
//! The printer itself is reached only through the traits in [`host`]; the
//! [`sim`] module provides an in-memory printer.

pub mod command;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod metrics;
pub mod motion;
pub mod obs;
pub mod orchestrator;
pub mod params;
pub mod remediation;
pub mod sim;
pub mod status;
pub mod telemetry;
pub mod validator;

pub use command::{
    CollectingResponder, GcodeCommand, Responder, VALIDATE_BED_MESH, VALIDATE_BED_MESH_AT,
};
pub use config::ValidatorConfig;
pub use error::{MeshError, MotionError, ProbeError, Result, ScriptError, ValidateError};
pub use evaluator::{DeviationEvaluator, DeviationRecord};
pub use host::{
    BedMesh, Collaborators, MeshBounds, MoveTarget, Point2, Probe, ProbeOffsets, ProbeParams,
    ProbeSession, ProbeVariant, ScriptRunner, Toolhead,
};
pub use metrics::{MetricsSnapshot, METRICS};
pub use motion::SafeTravel;
pub use orchestrator::{Orchestrator, SamplePlan, ValidationRunResult};
pub use params::{EffectiveParameters, Overrides};
pub use remediation::{remesh, PERSIST_SCRIPT, RECALIBRATE_SCRIPT};
pub use status::{PublishedStatus, ResultPublisher};
pub use telemetry::init_tracing;
pub use validator::{BedMeshValidator, CommandOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
