//! Per-step protocol: plan, present, execute.
//!
//! ```text
//! Idle -> Planning -> Planned -> Executing -> Done
//!                  \-> PlanFailed         \-> ExecFailed
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{
    ExecutionOutcome, Executor, PlanRequest, Planner, Presenter, RobotState,
};
use crate::error::{CollaboratorError, PresenterError};
use crate::queue::QueuedStep;
use crate::world::WorldSnapshot;

const DEFAULT_PRESENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Idle,
    Planning,
    Planned,
    PlanFailed,
    Executing,
    Done,
    ExecFailed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Idle => "idle",
            StepState::Planning => "planning",
            StepState::Planned => "planned",
            StepState::PlanFailed => "plan_failed",
            StepState::Executing => "executing",
            StepState::Done => "done",
            StepState::ExecFailed => "exec_failed",
        }
    }

    fn allowed_transitions(&self) -> &'static [StepState] {
        match self {
            StepState::Idle => &[StepState::Planning],
            StepState::Planning => &[StepState::Planned, StepState::PlanFailed],
            StepState::Planned => &[StepState::Executing],
            StepState::Executing => &[StepState::Done, StepState::ExecFailed],
            StepState::PlanFailed | StepState::Done | StepState::ExecFailed => &[],
        }
    }

    pub fn validate_transition(from: StepState, to: StepState) -> Result<(), InvalidTransition> {
        if from.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(InvalidTransition { from, to })
        }
    }

    pub fn can_transition(from: StepState, to: StepState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid step transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: StepState,
    pub to: StepState,
}

/// Why a step ended in a failure state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StepFailure {
    /// Planner reported no feasible trajectory.
    Infeasible,
    /// Executor stopped before the trajectory finished.
    Aborted,
    Timeout { service: String, timeout_ms: u64 },
}

/// Result of driving one step to a terminal state.
#[derive(Debug, Clone)]
pub struct StepRun {
    pub state: StepState,
    pub failure: Option<StepFailure>,
    pub trajectory_id: Option<String>,
    /// Robot state reported by the executor, including after a partial execution.
    pub robot_state: Option<RobotState>,
}

struct Transitions {
    index: usize,
    state: StepState,
}

impl Transitions {
    fn advance(&mut self, to: StepState) {
        debug_assert!(
            StepState::can_transition(self.state, to),
            "invalid step transition {} -> {}",
            self.state,
            to
        );
        debug!(step_index = self.index, from = %self.state, to = %to, "step transition");
        self.state = to;
    }

    fn finish(self, failure: Option<StepFailure>) -> StepRun {
        StepRun {
            state: self.state,
            failure,
            trajectory_id: None,
            robot_state: None,
        }
    }
}

/// Drives one queued step through the delegated planner, presenter and executor.
#[derive(Clone)]
pub struct StepExecutor {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    presenter: Arc<dyn Presenter>,
    plan_timeout: Option<Duration>,
    exec_timeout: Option<Duration>,
    present_timeout: Duration,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("plan_timeout", &self.plan_timeout)
            .field("exec_timeout", &self.exec_timeout)
            .field("present_timeout", &self.present_timeout)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            planner,
            executor,
            presenter,
            plan_timeout: None,
            exec_timeout: None,
            present_timeout: DEFAULT_PRESENT_TIMEOUT,
        }
    }

    pub fn with_plan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.plan_timeout = timeout;
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Bounds each display call; a presenter slower than this is abandoned for that call.
    pub fn with_present_timeout(mut self, timeout: Duration) -> Self {
        self.present_timeout = timeout;
        self
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Runs the step to a terminal state.
    ///
    /// Plan and execution failures (including timeouts) end up in the returned [`StepRun`];
    /// `Err` means a collaborator is unavailable and the task cannot continue.
    #[instrument(skip_all, fields(step_index = queued.index, label = queued.step.label.as_deref()))]
    pub async fn run(
        &self,
        queued: &QueuedStep,
        robot_state: &RobotState,
        world: Arc<WorldSnapshot>,
    ) -> Result<StepRun, CollaboratorError> {
        let step = &queued.step;
        let mut machine = Transitions {
            index: queued.index,
            state: StepState::Idle,
        };

        machine.advance(StepState::Planning);
        let request = PlanRequest {
            target: step.target,
            scaling: step.scaling,
            robot_state: robot_state.clone(),
            world,
        };
        let planned = bounded("planner", self.plan_timeout, self.planner.plan(&request)).await;

        let trajectory = match planned {
            Ok(result) => match result.into_trajectory() {
                Some(trajectory) => trajectory,
                None => {
                    info!(step_index = queued.index, "planning failed");
                    machine.advance(StepState::PlanFailed);
                    return Ok(machine.finish(Some(StepFailure::Infeasible)));
                }
            },
            Err(CollaboratorError::Timeout {
                service,
                timeout_ms,
            }) => {
                warn!(step_index = queued.index, timeout_ms, "planner timed out");
                machine.advance(StepState::PlanFailed);
                return Ok(machine.finish(Some(StepFailure::Timeout {
                    service: service.to_string(),
                    timeout_ms,
                })));
            }
            Err(err) => return Err(err),
        };

        machine.advance(StepState::Planned);
        self.present("show_trajectory", self.presenter.show_trajectory(&trajectory))
            .await;
        self.present("flush", self.presenter.flush()).await;

        machine.advance(StepState::Executing);
        let executed = bounded(
            "executor",
            self.exec_timeout,
            self.executor.execute(&trajectory),
        )
        .await;

        let mut run = match executed {
            Ok(report) => {
                let (next, failure) = match report.outcome {
                    ExecutionOutcome::Completed => (StepState::Done, None),
                    ExecutionOutcome::Aborted => {
                        warn!(step_index = queued.index, "execution aborted");
                        (StepState::ExecFailed, Some(StepFailure::Aborted))
                    }
                };
                machine.advance(next);
                let mut run = machine.finish(failure);
                run.robot_state = Some(report.robot_state);
                run
            }
            Err(CollaboratorError::Timeout {
                service,
                timeout_ms,
            }) => {
                warn!(step_index = queued.index, timeout_ms, "executor timed out");
                machine.advance(StepState::ExecFailed);
                machine.finish(Some(StepFailure::Timeout {
                    service: service.to_string(),
                    timeout_ms,
                }))
            }
            Err(err) => return Err(err),
        };

        run.trajectory_id = Some(trajectory.id().to_string());
        Ok(run)
    }

    /// Best-effort display call: errors and overruns are logged and the step moves on.
    pub(crate) async fn present<F>(&self, call: &str, fut: F)
    where
        F: Future<Output = Result<(), PresenterError>>,
    {
        match tokio::time::timeout(self.present_timeout, fut).await {
            Ok(result) => log_presenter(call, result),
            Err(_) => warn!(
                call,
                timeout_ms = u64::try_from(self.present_timeout.as_millis()).unwrap_or(u64::MAX),
                "presenter call timed out; continuing"
            ),
        }
    }
}

/// Awaits `fut`, turning an elapsed `limit` into [`CollaboratorError::Timeout`].
async fn bounded<T, F>(
    service: &'static str,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| {
                Err(CollaboratorError::Timeout {
                    service,
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            }),
        None => fut.await,
    }
}

pub(crate) fn log_presenter(call: &str, result: Result<(), PresenterError>) {
    if let Err(err) = result {
        warn!(call, error = %err, "presenter call failed; continuing");
    }
}
