//! Task definitions and sequencer settings.
//!
//! A task is described as JSON: settings, the obstacles present from the start, and the ordered
//! step list. Invalid poses and scaling limits are rejected while parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::queue::{GoalQueue, Step};
use crate::world::{Obstacle, WorldModel, DEFAULT_PLANNING_FRAME};
use crate::DEFAULT_CONTINUE_IPC_NAME;

const DEFAULT_CONTINUE_PROMPT: &str = "Press 'next' to continue the demo";
const DEFAULT_PRESENT_TIMEOUT_MS: u64 = 2_000;

fn default_planning_frame() -> String {
    DEFAULT_PLANNING_FRAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_prompt() -> String {
    DEFAULT_CONTINUE_PROMPT.to_string()
}

fn default_present_timeout_ms() -> u64 {
    DEFAULT_PRESENT_TIMEOUT_MS
}

fn default_ipc_name() -> String {
    DEFAULT_CONTINUE_IPC_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Frame obstacles without an explicit frame are expressed in.
    #[serde(default = "default_planning_frame")]
    pub planning_frame: String,
    #[serde(default)]
    pub end_effector_link: Option<String>,
    #[serde(default)]
    pub plan_timeout_ms: Option<u64>,
    #[serde(default)]
    pub exec_timeout_ms: Option<u64>,
    /// Upper bound on each display call (show, clear, flush). The operator gate is not bounded.
    #[serde(default = "default_present_timeout_ms")]
    pub present_timeout_ms: u64,
    /// Wait for the operator before each step that carries a prompt.
    #[serde(default = "default_true")]
    pub gate_each_step: bool,
    /// Fallback prompt text for steps that request a gate without text.
    #[serde(default = "default_prompt")]
    pub continue_prompt: String,
    /// Where finished reports are persisted; `None` disables persistence.
    #[serde(default)]
    pub report_db_path: Option<PathBuf>,
    #[serde(default = "default_ipc_name")]
    pub continue_ipc_name: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            planning_frame: default_planning_frame(),
            end_effector_link: None,
            plan_timeout_ms: None,
            exec_timeout_ms: None,
            present_timeout_ms: default_present_timeout_ms(),
            gate_each_step: true,
            continue_prompt: default_prompt(),
            report_db_path: None,
            continue_ipc_name: default_ipc_name(),
        }
    }
}

impl SequencerConfig {
    pub fn plan_timeout(&self) -> Option<Duration> {
        self.plan_timeout_ms.map(Duration::from_millis)
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_ms.map(Duration::from_millis)
    }

    pub fn present_timeout(&self) -> Duration {
        Duration::from_millis(self.present_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.planning_frame.trim().is_empty() {
            return Err(ConfigError::Invalid("planning_frame is empty".to_string()));
        }
        if self.plan_timeout_ms == Some(0)
            || self.exec_timeout_ms == Some(0)
            || self.present_timeout_ms == 0
        {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A complete, declarative task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default)]
    pub config: SequencerConfig,
    #[serde(default)]
    pub initial_obstacles: Vec<Obstacle>,
    pub steps: Vec<Step>,
}

impl TaskDefinition {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let definition: TaskDefinition = serde_json::from_str(json)?;
        definition.config.validate()?;
        Ok(definition)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Splits the definition into its runtime pieces, seeding the world with the initial
    /// obstacles.
    pub fn into_parts(self) -> Result<(SequencerConfig, WorldModel, GoalQueue), ConfigError> {
        self.config.validate()?;
        let mut world = WorldModel::new(self.config.planning_frame.clone());
        for obstacle in self.initial_obstacles {
            world
                .add_obstacle(obstacle)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok((self.config, world, GoalQueue::from_steps(self.steps)))
    }
}
