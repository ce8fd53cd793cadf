//! Host-facing entry point.
//!
//! [`BedMeshValidator`] is constructed from static configuration alone and
//! bound to its sibling subsystems later, once the host has finished
//! initialising all of them. Commands are rejected until then.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::command::{GcodeCommand, Responder, VALIDATE_BED_MESH, VALIDATE_BED_MESH_AT};
use crate::config::ValidatorConfig;
use crate::error::{Result, ValidateError};
use crate::evaluator::{DeviationEvaluator, DeviationRecord};
use crate::host::{
    BedMesh, Collaborators, Point2, Probe, ProbeOffsets, ProbeVariant, ScriptRunner, Toolhead,
};
use crate::motion::SafeTravel;
use crate::orchestrator::{Orchestrator, ValidationRunResult};
use crate::params::{EffectiveParameters, Overrides};
use crate::status::{PublishedStatus, ResultPublisher};

/// Commands registered with the host, with their help text.
pub const COMMANDS: &[(&str, &str)] = &[
    (
        VALIDATE_BED_MESH_AT,
        "Get interpolated Z + probe + deviation at XY from bed",
    ),
    (
        VALIDATE_BED_MESH,
        "Probe 5 points on the bed mesh and check deviation",
    ),
];

/// What a dispatched command produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOutcome {
    PointChecked(DeviationRecord),
    MeshValidated(ValidationRunResult),
}

/// Collaborators resolved at bind time.
struct Binding {
    toolhead: Arc<dyn Toolhead>,
    probe: Arc<dyn Probe>,
    bed_mesh: Arc<dyn BedMesh>,
    scripts: Arc<dyn ScriptRunner>,
    variant: ProbeVariant,
    offsets: ProbeOffsets,
    lift_speed: f64,
}

/// Validates the active bed mesh against fresh probe measurements.
pub struct BedMeshValidator {
    config: ValidatorConfig,
    publisher: ResultPublisher,
    binding: Option<Binding>,
}

impl BedMeshValidator {
    /// Phase one: static configuration only.
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            publisher: ResultPublisher::new(),
            binding: None,
        })
    }

    /// Phase two: attach the host subsystems.
    ///
    /// Fails when the bed mesh or the probe is missing; the validator stays
    /// unusable in that case.
    pub fn bind(&mut self, collaborators: Collaborators) -> Result<()> {
        let bed_mesh = collaborators.bed_mesh.ok_or_else(|| {
            ValidateError::StartupConfiguration("bed_mesh not configured".to_string())
        })?;
        let probe = collaborators.probe.ok_or_else(|| {
            ValidateError::StartupConfiguration("a [probe] section is required".to_string())
        })?;
        let toolhead = collaborators.toolhead.ok_or_else(|| {
            ValidateError::StartupConfiguration("toolhead is not available".to_string())
        })?;
        let scripts = collaborators.scripts.ok_or_else(|| {
            ValidateError::StartupConfiguration("command runner is not available".to_string())
        })?;

        let name = probe.name();
        let variant = ProbeVariant::from_probe_name(&name);
        let offsets = probe.offsets();
        let lift_speed = probe.params().lift_speed;
        info!(probe = %name, ?variant, z_offset = offsets.z, lift_speed, "validator bound");

        self.binding = Some(Binding {
            toolhead,
            probe,
            bed_mesh,
            scripts,
            variant,
            offsets,
            lift_speed,
        });
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Registered command names with their help text.
    pub fn commands() -> &'static [(&'static str, &'static str)] {
        COMMANDS
    }

    /// Last predicted, measured and deviation values.
    pub fn status(&self) -> PublishedStatus {
        self.publisher.snapshot()
    }

    /// Shared read handle on the published status.
    pub fn publisher(&self) -> ResultPublisher {
        self.publisher.clone()
    }

    /// Dispatch a parsed command.
    pub async fn handle(
        &self,
        cmd: &GcodeCommand,
        responder: &dyn Responder,
    ) -> Result<CommandOutcome> {
        match cmd.name() {
            VALIDATE_BED_MESH_AT => {
                let x = cmd.get_float("X")?;
                let y = cmd.get_float("Y")?;
                self.validate_at(Point2::new(x, y), responder)
                    .await
                    .map(CommandOutcome::PointChecked)
            }
            VALIDATE_BED_MESH => {
                let overrides = Overrides::from_command(cmd)?;
                self.validate_mesh(&overrides, responder)
                    .await
                    .map(CommandOutcome::MeshValidated)
            }
            other => Err(ValidateError::UnknownCommand(other.to_string())),
        }
    }

    /// Single-point check.
    #[instrument(skip(self, responder), fields(x = location.x, y = location.y))]
    pub async fn validate_at(
        &self,
        location: Point2,
        responder: &dyn Responder,
    ) -> Result<DeviationRecord> {
        let binding = self.binding()?;
        let travel = self.travel(binding, binding.lift_speed);
        let evaluator = self.evaluator(binding, &travel, self.config.horizontal_move_z);

        let record = evaluator.evaluate(location).await?;
        responder.respond_info(&format!(
            "Mesh Z at ({}) = {:.4}mm",
            location, record.predicted_z
        ));
        responder.respond_info(&format!(
            "Measured Z at ({}) = {:.4}mm",
            location, record.measured_z
        ));
        responder.respond_info(&format!("Deviation = {:.4}mm", record.deviation));
        Ok(record)
    }

    /// Five-point validation with the given overrides.
    ///
    /// Parameters are resolved before any motion, so a bad override leaves
    /// the printer untouched.
    pub async fn validate_mesh(
        &self,
        overrides: &Overrides,
        responder: &dyn Responder,
    ) -> Result<ValidationRunResult> {
        let binding = self.binding()?;
        let params = EffectiveParameters::resolve(
            &self.config,
            binding.lift_speed,
            binding.bed_mesh.bounds(),
            overrides,
        )?;

        let travel = self.travel(binding, params.probe_lift_speed);
        let evaluator = self.evaluator(binding, &travel, params.travel_height);
        let orchestrator =
            Orchestrator::new(evaluator, &travel, binding.scripts.as_ref(), responder);

        let run_id = uuid::Uuid::new_v4().to_string();
        orchestrator.run(&run_id, &params).await
    }

    fn binding(&self) -> Result<&Binding> {
        self.binding.as_ref().ok_or(ValidateError::NotBound)
    }

    fn travel(&self, binding: &Binding, lift_speed: f64) -> SafeTravel {
        SafeTravel::new(
            Arc::clone(&binding.toolhead),
            Arc::clone(&binding.probe),
            binding.variant,
            self.config.speed,
            lift_speed,
        )
    }

    fn evaluator<'a>(
        &'a self,
        binding: &'a Binding,
        travel: &'a SafeTravel,
        travel_height: f64,
    ) -> DeviationEvaluator<'a> {
        DeviationEvaluator::new(
            binding.bed_mesh.as_ref(),
            binding.probe.as_ref(),
            travel,
            &self.publisher,
            travel_height,
            binding.offsets.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CollectingResponder;
    use crate::sim::{SimulatedPrinter, SimulationConfig};

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ValidatorConfig {
            speed: -1.0,
            ..ValidatorConfig::default()
        };
        assert!(matches!(
            BedMeshValidator::new(config),
            Err(ValidateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bind_requires_bed_mesh() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        let mut validator = BedMeshValidator::new(ValidatorConfig::default()).unwrap();
        let err = validator
            .bind(Collaborators {
                bed_mesh: None,
                ..printer.collaborators()
            })
            .expect_err("missing mesh");
        assert!(err.to_string().contains("bed_mesh"));
        assert!(!validator.is_bound());
    }

    #[test]
    fn test_bind_requires_probe() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        let mut validator = BedMeshValidator::new(ValidatorConfig::default()).unwrap();
        let err = validator
            .bind(Collaborators {
                probe: None,
                ..printer.collaborators()
            })
            .expect_err("missing probe");
        assert!(matches!(err, ValidateError::StartupConfiguration(_)));
    }

    #[tokio::test]
    async fn test_commands_rejected_before_bind() {
        let validator = BedMeshValidator::new(ValidatorConfig::default()).unwrap();
        let cmd = GcodeCommand::new(VALIDATE_BED_MESH_AT)
            .with_param("X", "1")
            .with_param("Y", "1");
        let err = validator
            .handle(&cmd, &CollectingResponder::new())
            .await
            .expect_err("unbound");
        assert!(matches!(err, ValidateError::NotBound));
        assert_eq!(validator.status(), PublishedStatus::default());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        let mut validator = BedMeshValidator::new(ValidatorConfig::default()).unwrap();
        validator.bind(printer.collaborators()).unwrap();
        let err = validator
            .handle(&GcodeCommand::new("G28"), &CollectingResponder::new())
            .await
            .expect_err("unknown");
        match err {
            ValidateError::UnknownCommand(name) => assert_eq!(name, "G28"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(printer.calls().is_empty());
    }

    #[test]
    fn test_command_registry() {
        let names: Vec<&str> = BedMeshValidator::commands()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(names, vec![VALIDATE_BED_MESH_AT, VALIDATE_BED_MESH]);
    }
}
