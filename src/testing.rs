//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{
    ExecutionOutcome, ExecutionReport, Executor, PlanRequest, PlanResult, Planner, Presenter,
    RobotState, TrajectoryHandle,
};
use crate::error::{CollaboratorError, PresenterError};

#[derive(Debug, Clone)]
pub enum PlanScript {
    Succeed,
    Fail,
    Unavailable,
    Stall(Duration),
}

/// Planner that replays scripted answers; once the script runs out it always succeeds.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<PlanScript>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn always_succeeds() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: impl IntoIterator<Item = PlanScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResult, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(PlanScript::Succeed);

        match next {
            PlanScript::Succeed => Ok(PlanResult::planned(TrajectoryHandle::new(
                format!("traj-{call}"),
                request.target,
            ))),
            PlanScript::Fail => Ok(PlanResult::failed()),
            PlanScript::Unavailable => Err(CollaboratorError::unavailable(
                "planner",
                "move_group not reachable",
            )),
            PlanScript::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(PlanResult::planned(TrajectoryHandle::new(
                    format!("traj-{call}"),
                    request.target,
                )))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExecScript {
    Outcome(ExecutionOutcome),
    Unavailable,
    Stall(Duration),
}

/// Executor that replays scripted calls; once the script runs out it always completes.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ExecScript>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn always_completes() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = ExecutionOutcome>) -> Arc<Self> {
        Self::from_script(outcomes.into_iter().map(ExecScript::Outcome))
    }

    pub fn from_script(script: impl IntoIterator<Item = ExecScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        trajectory: &TrajectoryHandle,
    ) -> Result<ExecutionReport, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(ExecScript::Outcome(ExecutionOutcome::Completed));

        let outcome = match next {
            ExecScript::Outcome(outcome) => outcome,
            ExecScript::Unavailable => {
                return Err(CollaboratorError::unavailable(
                    "executor",
                    "controller not reachable",
                ))
            }
            ExecScript::Stall(delay) => {
                tokio::time::sleep(delay).await;
                ExecutionOutcome::Completed
            }
        };

        // An aborted run stops half way; a completed one ends at the call number.
        let progress = match outcome {
            ExecutionOutcome::Completed => (call + 1) as f64,
            ExecutionOutcome::Aborted => call as f64 + 0.5,
        };
        Ok(ExecutionReport {
            outcome,
            robot_state: RobotState::new(vec![trajectory.id().to_string()], vec![progress]),
        })
    }
}

/// Presenter that records every call, optionally failing all of them or stalling the display
/// calls.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<String>>,
    fail: bool,
    stall: Option<Duration>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Show, clear and flush sleep for `delay` before recording; the gate answers at once.
    pub fn stalling(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) -> Result<(), PresenterError> {
        self.calls.lock().expect("calls lock").push(call);
        if self.fail {
            Err(PresenterError::Other("display offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn display(&self, call: String) -> Result<(), PresenterError> {
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        self.record(call)
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn show_trajectory(&self, trajectory: &TrajectoryHandle) -> Result<(), PresenterError> {
        self.display(format!("show:{}", trajectory.id())).await
    }

    async fn clear(&self) -> Result<(), PresenterError> {
        self.display("clear".to_string()).await
    }

    async fn wait_for_continue(&self, prompt: &str) -> Result<(), PresenterError> {
        self.record(format!("wait:{prompt}"))
    }

    async fn flush(&self) -> Result<(), PresenterError> {
        self.display("flush".to_string()).await
    }
}
