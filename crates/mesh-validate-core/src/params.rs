//! Effective parameter resolution.
//!
//! Merges the static [`ValidatorConfig`] with the overrides carried by one
//! command invocation. Every override replaces its default only when it is
//! explicitly present; the resulting [`EffectiveParameters`] are built fresh
//! for every command and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::command::{parse_finite, GcodeCommand};
use crate::config::ValidatorConfig;
use crate::error::{Result, ValidateError};
use crate::host::{MeshBounds, Point2};

pub const PARAM_MAX_DEVIATION: &str = "MAX_DEVIATION";
pub const PARAM_SAVE_CONFIG: &str = "SAVE_CONFIG";
pub const PARAM_REMESH: &str = "REMESH";
pub const PARAM_MESH_MIN: &str = "MESH_MIN";
pub const PARAM_MESH_MAX: &str = "MESH_MAX";

/// Per-invocation overrides. `None` means "not given on the command line".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Overrides {
    pub max_deviation: Option<f64>,
    pub save_after_remesh: Option<bool>,
    pub remesh_enabled: Option<bool>,
    pub mesh_min: Option<Point2>,
    pub mesh_max: Option<Point2>,
}

impl Overrides {
    /// Extract the overrides from a `VALIDATE_BED_MESH` invocation.
    pub fn from_command(cmd: &GcodeCommand) -> Result<Self> {
        Ok(Self {
            max_deviation: cmd.get_float_opt(PARAM_MAX_DEVIATION)?,
            save_after_remesh: cmd.get_bool_opt(PARAM_SAVE_CONFIG)?,
            remesh_enabled: cmd.get_bool_opt(PARAM_REMESH)?,
            mesh_min: cmd
                .get_str_opt(PARAM_MESH_MIN)
                .map(|raw| parse_coordinate_pair(PARAM_MESH_MIN, raw))
                .transpose()?,
            mesh_max: cmd
                .get_str_opt(PARAM_MESH_MAX)
                .map(|raw| parse_coordinate_pair(PARAM_MESH_MAX, raw))
                .transpose()?,
        })
    }
}

/// Parse `"<x>,<y>"`. Exactly two finite numbers are accepted.
pub fn parse_coordinate_pair(name: &str, raw: &str) -> Result<Point2> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        return Err(ValidateError::invalid_parameter(
            name,
            format!("expected <x>,<y>, got '{raw}'"),
        ));
    }
    match (parse_finite(parts[0]), parse_finite(parts[1])) {
        (Some(x), Some(y)) => Ok(Point2::new(x, y)),
        _ => Err(ValidateError::invalid_parameter(
            name,
            format!("'{raw}' is not a pair of numbers"),
        )),
    }
}

/// Immutable parameter set for a single validation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParameters {
    pub travel_height: f64,
    pub travel_speed: f64,
    pub probe_lift_speed: f64,
    pub max_deviation: f64,
    pub remesh_enabled: bool,
    pub mesh_min: Point2,
    pub mesh_max: Point2,
    pub save_after_remesh: bool,
}

impl EffectiveParameters {
    /// Resolve overrides against the configuration defaults.
    ///
    /// `mesh_bounds` are the bounds reported by the bed mesh subsystem and
    /// serve as the default sampling area.
    pub fn resolve(
        config: &ValidatorConfig,
        probe_lift_speed: f64,
        mesh_bounds: MeshBounds,
        overrides: &Overrides,
    ) -> Result<Self> {
        let max_deviation = overrides.max_deviation.unwrap_or(config.deviation);
        if max_deviation.is_nan() || max_deviation <= 0.0 {
            return Err(ValidateError::invalid_parameter(
                PARAM_MAX_DEVIATION,
                format!("must be above 0, got {max_deviation}"),
            ));
        }

        Ok(Self {
            travel_height: config.horizontal_move_z,
            travel_speed: config.speed,
            probe_lift_speed,
            max_deviation,
            remesh_enabled: overrides.remesh_enabled.unwrap_or(config.remesh),
            mesh_min: overrides.mesh_min.unwrap_or(mesh_bounds.min),
            mesh_max: overrides.mesh_max.unwrap_or(mesh_bounds.max),
            save_after_remesh: overrides.save_after_remesh.unwrap_or(false),
        })
    }

    /// Centre of the effective sampling area.
    pub fn midpoint(&self) -> Point2 {
        Point2::midpoint(self.mesh_min, self.mesh_max)
    }
}
