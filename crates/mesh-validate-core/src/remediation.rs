//! Remesh trigger: hands recalibration (and optionally persistence) to the
//! host's named procedures.

use crate::error::Result;
use crate::host::ScriptRunner;
use crate::metrics::METRICS;
use crate::obs::emit_remesh_triggered;

/// Host procedure that re-probes the full grid and replaces the active mesh.
pub const RECALIBRATE_SCRIPT: &str = "BED_MESH_CALIBRATE";
/// Host procedure that persists the configuration, including the new mesh.
pub const PERSIST_SCRIPT: &str = "SAVE_CONFIG";

/// Run the recalibration procedure, then persist if asked.
///
/// Errors from either procedure propagate unchanged; nothing is rolled back.
pub async fn remesh(scripts: &dyn ScriptRunner, save_after_remesh: bool) -> Result<()> {
    emit_remesh_triggered(save_after_remesh);
    METRICS.inc_remeshes();
    scripts.run_script(RECALIBRATE_SCRIPT).await?;
    if save_after_remesh {
        scripts.run_script(PERSIST_SCRIPT).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidateError;
    use crate::sim::{HostCall, SimulatedPrinter, SimulationConfig};

    #[tokio::test]
    async fn test_remesh_without_save() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        remesh(printer.scripts().as_ref(), false).await.unwrap();
        assert_eq!(
            printer.calls(),
            vec![HostCall::Script(RECALIBRATE_SCRIPT.to_string())]
        );
    }

    #[tokio::test]
    async fn test_remesh_with_save_runs_both_in_order() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        remesh(printer.scripts().as_ref(), true).await.unwrap();
        assert_eq!(
            printer.calls(),
            vec![
                HostCall::Script(RECALIBRATE_SCRIPT.to_string()),
                HostCall::Script(PERSIST_SCRIPT.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_recalibration_failure_skips_persistence() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        printer.fail_script(RECALIBRATE_SCRIPT, "probe out of range");
        let err = remesh(printer.scripts().as_ref(), true)
            .await
            .expect_err("recalibration fails");
        assert!(matches!(err, ValidateError::Remediation(_)));
        assert!(!printer
            .calls()
            .contains(&HostCall::Script(PERSIST_SCRIPT.to_string())));
    }
}
