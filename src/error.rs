//! Error types for every layer of the sequencer.

use thiserror::Error;

/// Invalid pose input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("orientation is not a unit quaternion (norm {norm})")]
    NonUnitQuaternion { norm: f64 },

    #[error("pose contains a non-finite component")]
    NonFinite,
}

/// Rejected world-model mutation.
///
/// All variants are recoverable: the caller decides whether a failed mutation matters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("obstacle already exists: {0}")]
    DuplicateId(String),

    #[error("unknown obstacle: {0}")]
    UnknownObstacle(String),

    #[error("obstacle already attached: {0}")]
    AlreadyAttached(String),

    #[error("obstacle is not attached: {0}")]
    NotAttached(String),

    #[error("invalid geometry for obstacle {id}: {reason}")]
    InvalidGeometry { id: String, reason: String },
}

impl WorldError {
    pub fn invalid_geometry(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("scaling factor {name}={value} is outside (0, 1]")]
    InvalidScaling { name: &'static str, value: f64 },
}

/// Failure talking to a planner or executor.
///
/// `Unavailable` means no progress is possible and aborts the task; `Timeout` only ends the
/// current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout {
        service: &'static str,
        timeout_ms: u64,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }
}

/// Presenter failures are logged and dropped, never surfaced as task failures.
#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("presenter io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("presenter error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read task definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse task definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid task definition: {0}")]
    Invalid(String),
}

impl From<GeometryError> for ConfigError {
    fn from(err: GeometryError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<QueueError> for ConfigError {
    fn from(err: QueueError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Fatal errors: the whole task stops.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("collaborator unavailable, aborting task: {0}")]
    CollaboratorUnavailable(CollaboratorError),

    #[error("report store error: {0}")]
    Store(#[from] sled::Error),

    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = SequencerError> = std::result::Result<T, E>;
