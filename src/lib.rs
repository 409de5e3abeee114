//! Task sequencer and world-model coordinator for a robotic arm.
//!
//! This crate defines:
//! - [`WorldModel`]: the registry of named obstacles and of objects attached to the robot.
//! - [`GoalQueue`] and [`Step`]: an ordered list of pose goals, each with optional world-model
//!   mutations applied before the motion or after it completes.
//! - [`StepExecutor`]: the plan -> present -> execute protocol for one step.
//! - [`TaskSequencer`]: the driver that consumes the queue and produces a [`TaskReport`].
//!
//! Motion planning, trajectory execution and visualization are delegated to implementations of
//! [`Planner`], [`Executor`] and [`Presenter`].

pub mod collaborators;
pub mod config;
pub mod demo;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod queue;
pub mod report;
pub mod sequencer;
pub mod step;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::{
    ExecutionOutcome, ExecutionReport, Executor, NullPresenter, PlanRequest, PlanResult, Planner,
    Presenter, RobotState, TrajectoryHandle,
};
pub use config::{SequencerConfig, TaskDefinition};
pub use error::{
    CollaboratorError, ConfigError, GeometryError, PresenterError, QueueError, SequencerError,
    WorldError,
};
pub use gate::{IpcContinueGate, LoggingPresenter};
pub use geometry::Pose;
pub use queue::{Exhausted, GoalQueue, QueuedStep, ScalingLimits, Step};
pub use report::{ReportStore, StepReport, TaskReport};
pub use sequencer::{run_task, TaskSequencer};
pub use step::{StepExecutor, StepFailure, StepRun, StepState};
pub use world::{
    Attachment, Mutation, Obstacle, PlannerObstacle, Shape, ShapeKind, WorldModel, WorldSnapshot,
};

/// Default on-disk location for persisted task reports (sled).
pub const DEFAULT_REPORT_DB_PATH: &str = "arm_sequencer_reports";

/// Default IPC channel name (local socket / pipe) for the operator continue gate.
///
/// On Unix this is a filesystem-backed socket in `/tmp` so an operator tool in another process
/// can find it.
#[cfg(unix)]
pub const DEFAULT_CONTINUE_IPC_NAME: &str = "/tmp/arm_sequencer_continue";

/// Default IPC channel name (non-Unix platforms).
#[cfg(not(unix))]
pub const DEFAULT_CONTINUE_IPC_NAME: &str = "arm_sequencer_continue";
