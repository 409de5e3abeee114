//! Pose primitives shared by goals and obstacles.
//!
//! Internally uses [`nalgebra`] types; the serialized form mirrors the usual robotics message
//! layout (`position: {x, y, z}`, `orientation: {x, y, z, w}`) so task definitions stay readable.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Position plus unit-quaternion orientation, relative to some reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseRepr", into = "PoseRepr")]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Builds a pose, rejecting orientations that are not unit quaternions.
    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> Result<Self, GeometryError> {
        let [x, y, z] = position;
        let [qx, qy, qz, qw] = orientation;
        if !position.iter().chain(orientation.iter()).all(|v| v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }

        let q = Quaternion::new(qw, qx, qy, qz);
        let norm = q.norm();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(GeometryError::NonUnitQuaternion { norm });
        }

        Ok(Self {
            position: Vector3::new(x, y, z),
            orientation: UnitQuaternion::from_quaternion(q),
        })
    }

    /// Pose at `position` with identity orientation.
    pub fn from_position(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn identity() -> Self {
        Self::from_position(0.0, 0.0, 0.0)
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }

    /// Orientation as `[x, y, z, w]`.
    pub fn orientation_xyzw(&self) -> [f64; 4] {
        let q = self.orientation.quaternion();
        [q.i, q.j, q.k, q.w]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PositionRepr {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct OrientationRepr {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
    #[serde(default)]
    w: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PoseRepr {
    position: PositionRepr,
    // Missing orientation means identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orientation: Option<OrientationRepr>,
}

impl TryFrom<PoseRepr> for Pose {
    type Error = GeometryError;

    fn try_from(repr: PoseRepr) -> Result<Self, Self::Error> {
        let p = repr.position;
        let o = repr.orientation.unwrap_or(OrientationRepr {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        });
        Pose::new([p.x, p.y, p.z], [o.x, o.y, o.z, o.w])
    }
}

impl From<Pose> for PoseRepr {
    fn from(pose: Pose) -> Self {
        let [x, y, z, w] = pose.orientation_xyzw();
        PoseRepr {
            position: PositionRepr {
                x: pose.x(),
                y: pose.y(),
                z: pose.z(),
            },
            orientation: Some(OrientationRepr { x, y, z, w }),
        }
    }
}
