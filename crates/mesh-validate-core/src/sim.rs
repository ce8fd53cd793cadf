//! In-memory simulated printer.
//!
//! Implements every host trait without hardware, for tests and dry runs:
//! - the bed is a plane (`actual_bed`), the stored mesh another plane
//! - the probe reads the actual bed under the toolhead plus its Z offset
//! - `BED_MESH_CALIBRATE` copies the actual bed into the stored mesh
//! - every host call is appended to a call log for ordering assertions
//!
//! Raw probe readings, probe failures, empty result sets, session-end
//! failures and script failures can be injected.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{
    MeshError, MeshResult, MotionResult, ProbeError, ProbeResult, ScriptError, ScriptResult,
};
use crate::host::{
    BedMesh, Collaborators, MeshBounds, MoveTarget, Point2, Probe, ProbeOffsets, ProbeParams,
    ProbeSession, ScriptRunner, Toolhead,
};
use crate::remediation::RECALIBRATE_SCRIPT;

/// Planar height model: `offset + slope_x * x + slope_y * y`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfacePlane {
    pub offset: f64,
    pub slope_x: f64,
    pub slope_y: f64,
}

impl SurfacePlane {
    pub const fn flat(offset: f64) -> Self {
        Self {
            offset,
            slope_x: 0.0,
            slope_y: 0.0,
        }
    }

    pub fn z_at(&self, x: f64, y: f64) -> f64 {
        self.offset + self.slope_x * x + self.slope_y * y
    }
}

/// Description of the simulated printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub mesh_min: Point2,
    pub mesh_max: Point2,
    /// Surface the stored mesh predicts.
    pub stored_mesh: SurfacePlane,
    /// Surface the probe actually finds.
    pub actual_bed: SurfacePlane,
    pub mesh_loaded: bool,
    pub probe_name: String,
    pub probe_offsets: ProbeOffsets,
    pub lift_speed: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mesh_min: Point2::new(0.0, 0.0),
            mesh_max: Point2::new(200.0, 200.0),
            stored_mesh: SurfacePlane::default(),
            actual_bed: SurfacePlane::default(),
            mesh_loaded: true,
            probe_name: "probe".to_string(),
            probe_offsets: ProbeOffsets::default(),
            lift_speed: 5.0,
        }
    }
}

/// One call made on the simulated host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Move { target: MoveTarget, speed: f64 },
    WaitMoves,
    Dwell(f64),
    HomeZero,
    ProbeSessionStart,
    ProbeRun,
    ProbeSessionEnd,
    Script(String),
}

#[derive(Debug)]
struct SimState {
    position: [f64; 3],
    stored_mesh: Option<SurfacePlane>,
    calls: Vec<HostCall>,
    raw_readings: VecDeque<f64>,
    probe_failures: VecDeque<ProbeError>,
    empty_pulls: usize,
    end_session_failures: VecDeque<ProbeError>,
    script_failures: HashMap<String, String>,
    open_sessions: usize,
}

#[derive(Debug)]
struct Shared {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: HostCall) {
        self.lock().calls.push(call);
    }
}

/// Cheaply cloneable handle to one simulated printer.
#[derive(Debug, Clone)]
pub struct SimulatedPrinter {
    shared: Arc<Shared>,
}

impl SimulatedPrinter {
    pub fn new(config: SimulationConfig) -> Self {
        let stored_mesh = config.mesh_loaded.then_some(config.stored_mesh);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    position: [0.0, 0.0, 0.0],
                    stored_mesh,
                    calls: Vec::new(),
                    raw_readings: VecDeque::new(),
                    probe_failures: VecDeque::new(),
                    empty_pulls: 0,
                    end_session_failures: VecDeque::new(),
                    script_failures: HashMap::new(),
                    open_sessions: 0,
                }),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.shared.config
    }

    pub fn toolhead(&self) -> Arc<dyn Toolhead> {
        Arc::new(self.clone())
    }

    pub fn probe(&self) -> Arc<dyn Probe> {
        Arc::new(self.clone())
    }

    pub fn bed_mesh(&self) -> Arc<dyn BedMesh> {
        Arc::new(self.clone())
    }

    pub fn scripts(&self) -> Arc<dyn ScriptRunner> {
        Arc::new(self.clone())
    }

    /// All four collaborators, ready for binding.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            toolhead: Some(self.toolhead()),
            probe: Some(self.probe()),
            bed_mesh: Some(self.bed_mesh()),
            scripts: Some(self.scripts()),
        }
    }

    /// Every host call so far, in order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.shared.lock().calls.clone()
    }

    /// Only the moves, in order.
    pub fn moves(&self) -> Vec<MoveTarget> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Move { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.shared.lock().calls.clear();
    }

    pub fn position(&self) -> [f64; 3] {
        self.shared.lock().position
    }

    /// Surface currently predicted by the stored mesh, if one is loaded.
    pub fn stored_mesh(&self) -> Option<SurfacePlane> {
        self.shared.lock().stored_mesh
    }

    /// Probe sessions started but not yet ended.
    pub fn open_sessions(&self) -> usize {
        self.shared.lock().open_sessions
    }

    /// Raw Z values returned by upcoming probes, ahead of the bed model.
    pub fn queue_raw_readings(&self, readings: impl IntoIterator<Item = f64>) {
        self.shared.lock().raw_readings.extend(readings);
    }

    /// Make the next `run_probe` fail with `error`.
    pub fn fail_next_probe(&self, error: ProbeError) {
        self.shared.lock().probe_failures.push_back(error);
    }

    /// Make the next `pull_probed_results` return nothing.
    pub fn drop_next_results(&self) {
        self.shared.lock().empty_pulls += 1;
    }

    /// Make the next `end_session` fail with `error`. The session still
    /// counts as closed.
    pub fn fail_next_end_session(&self, error: ProbeError) {
        self.shared.lock().end_session_failures.push_back(error);
    }

    /// Make every run of `script` fail with `reason`.
    pub fn fail_script(&self, script: &str, reason: &str) {
        self.shared
            .lock()
            .script_failures
            .insert(script.to_string(), reason.to_string());
    }

    pub fn unload_mesh(&self) {
        self.shared.lock().stored_mesh = None;
    }
}

#[async_trait]
impl Toolhead for SimulatedPrinter {
    async fn manual_move(&self, target: MoveTarget, speed: f64) -> MotionResult<()> {
        let mut state = self.shared.lock();
        for (axis, value) in target.as_array().iter().enumerate() {
            if let Some(v) = value {
                state.position[axis] = *v;
            }
        }
        state.calls.push(HostCall::Move { target, speed });
        Ok(())
    }

    async fn wait_moves(&self) -> MotionResult<()> {
        self.shared.record(HostCall::WaitMoves);
        Ok(())
    }

    async fn dwell(&self, seconds: f64) -> MotionResult<()> {
        self.shared.record(HostCall::Dwell(seconds));
        Ok(())
    }
}

#[async_trait]
impl Probe for SimulatedPrinter {
    fn name(&self) -> String {
        self.shared.config.probe_name.clone()
    }

    fn offsets(&self) -> ProbeOffsets {
        self.shared.config.probe_offsets
    }

    fn params(&self) -> ProbeParams {
        ProbeParams {
            lift_speed: self.shared.config.lift_speed,
        }
    }

    async fn start_session(&self) -> ProbeResult<Box<dyn ProbeSession>> {
        let mut state = self.shared.lock();
        state.open_sessions += 1;
        state.calls.push(HostCall::ProbeSessionStart);
        Ok(Box::new(SimProbeSession {
            shared: Arc::clone(&self.shared),
            results: Vec::new(),
        }))
    }

    async fn home_zero(&self) -> ProbeResult<()> {
        self.shared.record(HostCall::HomeZero);
        Ok(())
    }
}

struct SimProbeSession {
    shared: Arc<Shared>,
    results: Vec<[f64; 3]>,
}

#[async_trait]
impl ProbeSession for SimProbeSession {
    async fn run_probe(&mut self) -> ProbeResult<()> {
        let mut state = self.shared.lock();
        state.calls.push(HostCall::ProbeRun);
        if let Some(error) = state.probe_failures.pop_front() {
            return Err(error);
        }
        let [x, y, _] = state.position;
        let raw_z = match state.raw_readings.pop_front() {
            Some(z) => z,
            None => self.shared.config.actual_bed.z_at(x, y) + self.shared.config.probe_offsets.z,
        };
        state.position[2] = raw_z;
        self.results.push([x, y, raw_z]);
        Ok(())
    }

    async fn pull_probed_results(&mut self) -> ProbeResult<Vec<[f64; 3]>> {
        let results = std::mem::take(&mut self.results);
        let mut state = self.shared.lock();
        if state.empty_pulls > 0 {
            state.empty_pulls -= 1;
            return Ok(Vec::new());
        }
        Ok(results)
    }

    async fn end_session(self: Box<Self>) -> ProbeResult<()> {
        let mut state = self.shared.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        state.calls.push(HostCall::ProbeSessionEnd);
        match state.end_session_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl BedMesh for SimulatedPrinter {
    fn calc_z(&self, x: f64, y: f64) -> MeshResult<f64> {
        self.shared
            .lock()
            .stored_mesh
            .map(|plane| plane.z_at(x, y))
            .ok_or(MeshError::NotLoaded)
    }

    fn bounds(&self) -> MeshBounds {
        MeshBounds {
            min: self.shared.config.mesh_min,
            max: self.shared.config.mesh_max,
        }
    }
}

#[async_trait]
impl ScriptRunner for SimulatedPrinter {
    async fn run_script(&self, script: &str) -> ScriptResult<()> {
        let mut state = self.shared.lock();
        state.calls.push(HostCall::Script(script.to_string()));
        if let Some(reason) = state.script_failures.get(script) {
            return Err(ScriptError {
                script: script.to_string(),
                reason: reason.clone(),
            });
        }
        if script == RECALIBRATE_SCRIPT {
            state.stored_mesh = Some(self.shared.config.actual_bed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_height() {
        let plane = SurfacePlane {
            offset: 0.1,
            slope_x: 0.001,
            slope_y: -0.002,
        };
        assert!((plane.z_at(100.0, 50.0) - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_probe_reads_actual_bed_plus_offset() {
        let printer = SimulatedPrinter::new(SimulationConfig {
            actual_bed: SurfacePlane::flat(0.2),
            probe_offsets: ProbeOffsets {
                x: 0.0,
                y: 0.0,
                z: 1.5,
            },
            ..SimulationConfig::default()
        });
        let mut session = printer.start_session().await.unwrap();
        session.run_probe().await.unwrap();
        let results = session.pull_probed_results().await.unwrap();
        session.end_session().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0][2] - 1.7).abs() < 1e-12);
        assert_eq!(printer.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_queued_readings_take_precedence() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        printer.queue_raw_readings([0.42]);
        let mut session = printer.start_session().await.unwrap();
        session.run_probe().await.unwrap();
        assert_eq!(session.pull_probed_results().await.unwrap()[0][2], 0.42);
    }

    #[tokio::test]
    async fn test_injected_session_faults() {
        let printer = SimulatedPrinter::new(SimulationConfig::default());
        printer.drop_next_results();
        printer.fail_next_end_session(ProbeError::Other("serial closed".to_string()));

        let mut session = printer.start_session().await.unwrap();
        session.run_probe().await.unwrap();
        assert!(session.pull_probed_results().await.unwrap().is_empty());
        assert_eq!(
            session.end_session().await,
            Err(ProbeError::Other("serial closed".to_string()))
        );
        assert_eq!(printer.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_recalibration_replaces_stored_mesh() {
        let printer = SimulatedPrinter::new(SimulationConfig {
            actual_bed: SurfacePlane::flat(0.3),
            ..SimulationConfig::default()
        });
        assert_eq!(printer.calc_z(10.0, 10.0).unwrap(), 0.0);
        printer.run_script(RECALIBRATE_SCRIPT).await.unwrap();
        assert_eq!(printer.calc_z(10.0, 10.0).unwrap(), 0.3);
    }

    #[test]
    fn test_unloaded_mesh_reports_error() {
        let printer = SimulatedPrinter::new(SimulationConfig {
            mesh_loaded: false,
            ..SimulationConfig::default()
        });
        assert_eq!(printer.calc_z(0.0, 0.0), Err(MeshError::NotLoaded));
    }
}
