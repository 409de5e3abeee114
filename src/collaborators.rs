//! Contracts for the services the sequencer delegates to.
//!
//! Planning, execution and visualization are opaque to the sequencer: it only hands over
//! requests and reacts to outcomes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, PresenterError};
use crate::geometry::Pose;
use crate::queue::ScalingLimits;
use crate::world::WorldSnapshot;

/// Last-known joint configuration of the arm.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    pub joint_names: Vec<String>,
    pub joint_positions: Vec<f64>,
}

impl RobotState {
    pub fn new(joint_names: Vec<String>, joint_positions: Vec<f64>) -> Self {
        Self {
            joint_names,
            joint_positions,
        }
    }
}

/// Opaque reference to a planned motion.
///
/// The sequencer never looks inside; planners store whatever they need in the payload and
/// executors/presenters downcast it back.
#[derive(Clone)]
pub struct TrajectoryHandle {
    id: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl TrajectoryHandle {
    pub fn new<T: Any + Send + Sync>(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for TrajectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrajectoryHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Everything a planner needs for one goal.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub target: Pose,
    pub scaling: ScalingLimits,
    pub robot_state: RobotState,
    pub world: Arc<WorldSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PlanResult {
    pub success: bool,
    /// Only meaningful when `success` is true.
    pub trajectory: Option<TrajectoryHandle>,
}

impl PlanResult {
    pub fn planned(trajectory: TrajectoryHandle) -> Self {
        Self {
            success: true,
            trajectory: Some(trajectory),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            trajectory: None,
        }
    }

    /// The trajectory, if the planner both succeeded and produced one.
    pub fn into_trajectory(self) -> Option<TrajectoryHandle> {
        if self.success {
            self.trajectory
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    Aborted,
}

/// What the executor did, plus where the robot ended up (possibly mid-trajectory).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub robot_state: RobotState,
}

/// Motion planner.
///
/// Ordinary infeasibility (unreachable pose, collision) is reported as
/// [`PlanResult::failed`]; `Err` is reserved for the service itself being unusable.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResult, CollaboratorError>;
}

/// Trajectory executor.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        trajectory: &TrajectoryHandle,
    ) -> Result<ExecutionReport, CollaboratorError>;
}

/// Visualization and operator interaction. Every call is best-effort.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn show_trajectory(&self, trajectory: &TrajectoryHandle) -> Result<(), PresenterError>;

    async fn clear(&self) -> Result<(), PresenterError>;

    /// Suspends until an operator signals continue.
    async fn wait_for_continue(&self, prompt: &str) -> Result<(), PresenterError>;

    /// Commits pending visualization side effects.
    async fn flush(&self) -> Result<(), PresenterError>;
}

/// Presenter that does nothing; useful for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

#[async_trait]
impl Presenter for NullPresenter {
    async fn show_trajectory(&self, _trajectory: &TrajectoryHandle) -> Result<(), PresenterError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), PresenterError> {
        Ok(())
    }

    async fn wait_for_continue(&self, _prompt: &str) -> Result<(), PresenterError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), PresenterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_payload_round_trips_by_type() {
        let handle = TrajectoryHandle::new("traj-1", vec![0.0_f64, 0.5, 1.0]);
        assert_eq!(handle.id(), "traj-1");
        assert_eq!(handle.payload::<Vec<f64>>().map(Vec::len), Some(3));
        assert!(handle.payload::<String>().is_none());
    }

    #[test]
    fn failed_plan_never_yields_trajectory() {
        let result = PlanResult {
            success: false,
            trajectory: Some(TrajectoryHandle::new("stale", ())),
        };
        assert!(result.into_trajectory().is_none());
    }
}
