//! Ordered goal queue.
//!
//! A [`GoalQueue`] is filled before execution starts and consumed strictly front to back. It can
//! be extended at the tail but never reordered or rewound.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::geometry::Pose;
use crate::world::Mutation;

/// Velocity and acceleration fractions of the robot's limits, each in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalingRepr", into = "ScalingRepr")]
pub struct ScalingLimits {
    velocity: f64,
    acceleration: f64,
}

impl ScalingLimits {
    pub fn new(velocity: f64, acceleration: f64) -> Result<Self, QueueError> {
        check_fraction("velocity", velocity)?;
        check_fraction("acceleration", acceleration)?;
        Ok(Self {
            velocity,
            acceleration,
        })
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }
}

impl Default for ScalingLimits {
    fn default() -> Self {
        Self {
            velocity: 1.0,
            acceleration: 1.0,
        }
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), QueueError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(QueueError::InvalidScaling { name, value })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ScalingRepr {
    velocity: f64,
    acceleration: f64,
}

impl TryFrom<ScalingRepr> for ScalingLimits {
    type Error = QueueError;

    fn try_from(repr: ScalingRepr) -> Result<Self, Self::Error> {
        ScalingLimits::new(repr.velocity, repr.acceleration)
    }
}

impl From<ScalingLimits> for ScalingRepr {
    fn from(limits: ScalingLimits) -> Self {
        ScalingRepr {
            velocity: limits.velocity,
            acceleration: limits.acceleration,
        }
    }
}

/// One queued unit of work: a pose goal plus the world-model changes around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub label: Option<String>,
    pub target: Pose,
    #[serde(default)]
    pub scaling: ScalingLimits,
    /// Applied before planning.
    #[serde(default)]
    pub pre: Vec<Mutation>,
    /// Applied only once the step reaches `Done`.
    #[serde(default)]
    pub post: Vec<Mutation>,
    /// Operator prompt shown before the step; `None` runs the step without waiting.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl Step {
    pub fn new(target: Pose) -> Self {
        Self {
            label: None,
            target,
            scaling: ScalingLimits::default(),
            pre: Vec::new(),
            post: Vec::new(),
            prompt: None,
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingLimits) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_pre(mut self, mutation: Mutation) -> Self {
        self.pre.push(mutation);
        self
    }

    pub fn with_post(mut self, mutation: Mutation) -> Self {
        self.post.push(mutation);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// A step together with its position in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedStep {
    pub index: usize,
    pub step: Step,
}

/// Returned by [`GoalQueue::next`] once every step has been consumed. Not an error: it is the
/// normal end of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

#[derive(Debug, Default)]
pub struct GoalQueue {
    pending: VecDeque<Step>,
    consumed: usize,
}

impl GoalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            pending: steps.into_iter().collect(),
            consumed: 0,
        }
    }

    /// Appends a step at the tail. Returns the index it will be reported under.
    pub fn push(&mut self, step: Step) -> usize {
        self.pending.push_back(step);
        self.consumed + self.pending.len() - 1
    }

    /// Hands out the next unconsumed step; once empty, every call returns [`Exhausted`].
    pub fn next(&mut self) -> Result<QueuedStep, Exhausted> {
        let step = self.pending.pop_front().ok_or(Exhausted)?;
        let index = self.consumed;
        self.consumed += 1;
        Ok(QueuedStep { index, step })
    }

    /// Total number of steps ever queued.
    pub fn len(&self) -> usize {
        self.consumed + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}
