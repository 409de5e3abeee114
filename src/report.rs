//! Task outcome reporting and persistence.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SequencerError;
use crate::step::{StepFailure, StepState};
use crate::world::WorldSnapshot;

const REPORTS_TREE: &str = "task_reports";

/// Outcome of a single queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    #[serde(default)]
    pub label: Option<String>,
    pub state: StepState,
    #[serde(default)]
    pub failure: Option<StepFailure>,
    #[serde(default)]
    pub trajectory_id: Option<String>,
    /// World-model mutations of this step that were rejected, in order.
    #[serde(default)]
    pub mutation_errors: Vec<String>,
}

/// Ordered outcomes of a whole task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: String,
    pub started_at: u64,
    pub finished_at: u64,
    pub steps: Vec<StepReport>,
    pub final_world: WorldSnapshot,
}

impl TaskReport {
    /// `(step index, terminal state)` pairs in execution order.
    pub fn outcomes(&self) -> Vec<(usize, StepState)> {
        self.steps.iter().map(|s| (s.index, s.state)).collect()
    }

    pub fn states(&self) -> Vec<StepState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    pub fn all_done(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Done)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.state != StepState::Done)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Persists finished task reports in an embedded sled database.
#[derive(Debug, Clone)]
pub struct ReportStore {
    db: sled::Db,
}

impl ReportStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SequencerError> {
        Ok(Self::from_db(sled::open(path)?))
    }

    /// Opens the store at [`DEFAULT_REPORT_DB_PATH`](crate::DEFAULT_REPORT_DB_PATH).
    pub fn open_default() -> Result<Self, SequencerError> {
        Self::open(crate::DEFAULT_REPORT_DB_PATH)
    }

    /// Wraps an already-open database handle.
    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    pub fn record(&self, report: &TaskReport) -> Result<(), SequencerError> {
        let tree = self.db.open_tree(REPORTS_TREE)?;
        let id = self.db.generate_id()?;

        // Zero-padded so lexicographic key order is chronological.
        let key = format!("{:020}_{id}", report.finished_at);
        let value = serde_json::to_vec(report)?;

        tree.insert(key.as_bytes(), value)?;
        tree.flush()?;
        debug!(task = %report.task, key = %key, "recorded task report");
        Ok(())
    }

    /// Reports finished at or after `start_ts` (unix seconds), oldest first.
    pub fn reports_since(&self, start_ts: u64) -> Vec<TaskReport> {
        let Ok(tree) = self.db.open_tree(REPORTS_TREE) else {
            return Vec::new();
        };

        let start = format!("{start_ts:020}");
        tree.range(start.as_bytes()..)
            .filter_map(|res| res.ok())
            .filter_map(|(k, v)| match serde_json::from_slice::<TaskReport>(&v) {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(key = %String::from_utf8_lossy(&k), error = %err, "skipping unreadable report");
                    None
                }
            })
            .collect()
    }
}
