//! Last-evaluated point, published for status queries between commands.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::evaluator::DeviationRecord;

/// Snapshot returned by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PublishedStatus {
    pub last_mesh_z: f64,
    pub last_probed_z: f64,
    pub last_deviation: f64,
}

impl From<&DeviationRecord> for PublishedStatus {
    fn from(record: &DeviationRecord) -> Self {
        Self {
            last_mesh_z: record.predicted_z,
            last_probed_z: record.measured_z,
            last_deviation: record.deviation,
        }
    }
}

/// Shared handle to the published status.
///
/// Cloning shares the underlying cell. Only the evaluator writes through
/// [`ResultPublisher::publish`]; everyone else reads.
#[derive(Debug, Clone, Default)]
pub struct ResultPublisher {
    inner: Arc<Mutex<PublishedStatus>>,
}

impl ResultPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PublishedStatus {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn publish(&self, status: PublishedStatus) {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }
}
