//! Top-level task driver.
//!
//! The sequencer owns the goal queue and the world model. For every queued step it waits on the
//! operator gate, applies the step's pre-mutations, runs the step, applies post-mutations only if
//! the step reached `Done` with every pre-mutation accepted, then clears the visualization. Step
//! failures are recorded and the next step proceeds; only an unavailable collaborator stops the
//! task.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::collaborators::{Executor, Planner, Presenter, RobotState};
use crate::config::{SequencerConfig, TaskDefinition};
use crate::error::{Result, SequencerError};
use crate::queue::{Exhausted, GoalQueue, QueuedStep, Step};
use crate::report::{unix_now, ReportStore, StepReport, TaskReport};
use crate::step::{log_presenter, StepExecutor, StepState};
use crate::world::{Mutation, WorldModel};

pub struct TaskSequencer {
    name: String,
    config: SequencerConfig,
    queue: GoalQueue,
    world: WorldModel,
    steps: StepExecutor,
    robot_state: watch::Sender<RobotState>,
    store: Option<ReportStore>,
}

impl std::fmt::Debug for TaskSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSequencer")
            .field("name", &self.name)
            .field("remaining_steps", &self.queue.remaining())
            .field("obstacles", &self.world.obstacles().len())
            .field("report_store", &self.store.is_some())
            .finish()
    }
}

impl TaskSequencer {
    pub fn new(
        name: impl Into<String>,
        queue: GoalQueue,
        world: WorldModel,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let (robot_state, _) = watch::channel(RobotState::default());
        Self {
            name: name.into(),
            config: SequencerConfig::default(),
            queue,
            world,
            steps: StepExecutor::new(planner, executor, presenter),
            robot_state,
            store: None,
        }
    }

    /// Builds a sequencer from a declarative task, opening the report store if one is configured.
    pub fn from_definition(
        definition: TaskDefinition,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self> {
        let name = definition.name.clone();
        let (config, world, queue) = definition.into_parts()?;
        let store = config
            .report_db_path
            .as_ref()
            .map(ReportStore::open)
            .transpose()?;

        let mut sequencer = Self::new(name, queue, world, planner, executor, presenter)
            .with_config(config);
        sequencer.store = store;
        Ok(sequencer)
    }

    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.steps = self
            .steps
            .with_plan_timeout(config.plan_timeout())
            .with_exec_timeout(config.exec_timeout())
            .with_present_timeout(config.present_timeout());
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: ReportStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_robot_state(self, state: RobotState) -> Self {
        self.robot_state.send_replace(state);
        self
    }

    /// Live view of the robot's last-known state, readable while the sequencer is suspended.
    pub fn subscribe_robot_state(&self) -> watch::Receiver<RobotState> {
        self.robot_state.subscribe()
    }

    pub fn robot_state(&self) -> RobotState {
        self.robot_state.borrow().clone()
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    pub fn report_store(&self) -> Option<&ReportStore> {
        self.store.as_ref()
    }

    /// Appends a step to the tail of the queue.
    pub fn enqueue(&mut self, step: Step) -> usize {
        self.queue.push(step)
    }

    /// Consumes the queue and returns the ordered step outcomes.
    #[instrument(skip(self), fields(task = %self.name))]
    pub async fn run(&mut self) -> Result<TaskReport> {
        let started_at = unix_now();
        let mut steps = Vec::with_capacity(self.queue.remaining());
        info!(
            queued = self.queue.remaining(),
            planning_frame = %self.config.planning_frame,
            end_effector_link = self.config.end_effector_link.as_deref(),
            "starting task"
        );

        loop {
            let queued = match self.queue.next() {
                Ok(queued) => queued,
                Err(Exhausted) => break,
            };
            match self.run_step(queued).await {
                Ok(report) => steps.push(report),
                Err(err) => {
                    error!(error = %err, "aborting task");
                    return Err(err);
                }
            }
        }

        let report = TaskReport {
            task: self.name.clone(),
            started_at,
            finished_at: unix_now(),
            steps,
            final_world: self.world.snapshot(),
        };
        info!(
            steps = report.steps.len(),
            failed = report.failed_steps().count(),
            "task finished"
        );

        if let Some(store) = &self.store {
            store.record(&report)?;
        }
        Ok(report)
    }

    async fn run_step(&mut self, queued: QueuedStep) -> Result<StepReport> {
        let index = queued.index;
        let presenter = Arc::clone(self.steps.presenter());

        if self.config.gate_each_step {
            if let Some(prompt) = &queued.step.prompt {
                let text = if prompt.trim().is_empty() {
                    self.config.continue_prompt.as_str()
                } else {
                    prompt.as_str()
                };
                debug!(step_index = index, "waiting for operator");
                log_presenter("wait_for_continue", presenter.wait_for_continue(text).await);
            }
        }

        let mut mutation_errors = Vec::new();
        self.apply_mutations(index, "pre", &queued.step.pre, &mut mutation_errors);
        let pre_rejected = !mutation_errors.is_empty();

        let world = Arc::new(self.world.snapshot());
        let robot_state = self.robot_state();
        let run = self
            .steps
            .run(&queued, &robot_state, world)
            .await
            .map_err(SequencerError::CollaboratorUnavailable)?;

        if let Some(state) = run.robot_state.clone() {
            self.robot_state.send_replace(state);
        }

        if run.state == StepState::Done && !pre_rejected {
            self.apply_mutations(index, "post", &queued.step.post, &mut mutation_errors);
        } else if !queued.step.post.is_empty() {
            if run.state == StepState::Done {
                info!(
                    step_index = index,
                    skipped = queued.step.post.len(),
                    "earlier mutation rejected; post-mutations not applied"
                );
            } else {
                info!(
                    step_index = index,
                    state = %run.state,
                    skipped = queued.step.post.len(),
                    "step did not complete; post-mutations not applied"
                );
            }
        }

        self.steps.present("clear", presenter.clear()).await;
        self.steps.present("flush", presenter.flush()).await;

        info!(step_index = index, state = %run.state, "step finished");
        Ok(StepReport {
            index,
            label: queued.step.label,
            state: run.state,
            failure: run.failure,
            trajectory_id: run.trajectory_id,
            mutation_errors,
        })
    }

    fn apply_mutations(
        &mut self,
        index: usize,
        phase: &str,
        mutations: &[Mutation],
        errors: &mut Vec<String>,
    ) {
        if let Err(err) = self.world.apply_all(mutations) {
            warn!(step_index = index, phase, error = %err, "world mutation rejected; remaining mutations skipped");
            errors.push(err.to_string());
        }
    }
}

/// Runs a declarative task end to end.
pub async fn run_task(
    definition: TaskDefinition,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    presenter: Arc<dyn Presenter>,
) -> Result<TaskReport> {
    TaskSequencer::from_definition(definition, planner, executor, presenter)?
        .run()
        .await
}
