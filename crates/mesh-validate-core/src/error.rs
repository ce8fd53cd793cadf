//! Error taxonomy for bed mesh validation.
//!
//! Collaborator errors (`MotionError`, `ProbeError`, `MeshError`,
//! `ScriptError`) are raised by the host subsystems and wrapped transparently
//! by [`ValidateError`] so they reach the command invoker unmodified.

/// Errors raised by the motion system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotionError {
    #[error("move rejected: {0}")]
    MoveRejected(String),

    #[error("motion system shut down: {0}")]
    Shutdown(String),
}

/// Errors raised by a probe or one of its sessions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe triggered prior to movement")]
    TriggeredBeforeMove,

    #[error("no trigger after full movement")]
    NoTrigger,

    #[error("probe session returned no results")]
    NoResult,

    #[error("probe communication timeout: {0}")]
    Timeout(String),

    #[error("probe error: {0}")]
    Other(String),
}

/// Errors raised by the bed mesh subsystem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("no bed mesh is loaded")]
    NotLoaded,
}

/// Errors raised while running a named host procedure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{script} failed: {reason}")]
pub struct ScriptError {
    pub script: String,
    pub reason: String,
}

/// Errors surfaced to the command invoker.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("startup configuration error: {0}")]
    StartupConfiguration(String),

    #[error("validator is not bound to the printer yet")]
    NotBound,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Remediation(#[from] ScriptError),
}

impl ValidateError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ValidateError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type Result<T> = std::result::Result<T, ValidateError>;

pub type MotionResult<T> = std::result::Result<T, MotionError>;
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
pub type MeshResult<T> = std::result::Result<T, MeshError>;
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
