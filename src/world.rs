//! Obstacle and attachment registry.
//!
//! [`WorldModel`] is the only owner of obstacle state. Collaborators never see it directly; they
//! receive a [`WorldSnapshot`] (an owned copy) so a planner or presenter running off-thread cannot
//! observe a half-applied mutation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::WorldError;
use crate::geometry::Pose;

/// Frame used when a world model is built without an explicit planning frame.
pub const DEFAULT_PLANNING_FRAME: &str = "world";

/// Solid primitive with kind-specific dimensions (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Box { x: f64, y: f64, z: f64 },
    Cylinder { height: f64, radius: f64 },
    Sphere { radius: f64 },
    Cone { height: f64, radius: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Box,
    Cylinder,
    Sphere,
    Cone,
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Box { .. } => ShapeKind::Box,
            Shape::Cylinder { .. } => ShapeKind::Cylinder,
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Cone { .. } => ShapeKind::Cone,
        }
    }

    /// Dimension list in solid-primitive order: box `[x, y, z]`, cylinder and cone
    /// `[height, radius]`, sphere `[radius]`.
    pub fn dimensions(&self) -> Vec<f64> {
        match *self {
            Shape::Box { x, y, z } => vec![x, y, z],
            Shape::Cylinder { height, radius } | Shape::Cone { height, radius } => {
                vec![height, radius]
            }
            Shape::Sphere { radius } => vec![radius],
        }
    }

    fn validate(&self, id: &str) -> Result<(), WorldError> {
        if self.dimensions().iter().all(|d| d.is_finite() && *d > 0.0) {
            Ok(())
        } else {
            Err(WorldError::invalid_geometry(
                id,
                format!("{:?} dimensions must be positive and finite", self.kind()),
            ))
        }
    }
}

/// A named rigid body the planner must avoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: String,
    pub shape: Shape,
    pub pose: Pose,
    /// Reference frame of `pose`. `None` means the world model's planning frame.
    #[serde(default)]
    pub frame_id: Option<String>,
}

impl Obstacle {
    pub fn new(id: impl Into<String>, shape: Shape, pose: Pose) -> Self {
        Self {
            id: id.into(),
            shape,
            pose,
            frame_id: None,
        }
    }

    pub fn in_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }
}

/// Binding of an obstacle to a robot link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub object_id: String,
    pub link: String,
    /// Links allowed to touch the attached object without counting as a collision.
    pub touch_links: BTreeSet<String>,
}

/// A declarative change to the world model, applied by the sequencer around a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddObstacle(Obstacle),
    ReplaceObstacle(Obstacle),
    RemoveObstacle {
        id: String,
    },
    Attach {
        id: String,
        link: String,
        #[serde(default)]
        touch_links: Vec<String>,
    },
    Detach {
        id: String,
    },
}

impl Mutation {
    pub fn add(obstacle: Obstacle) -> Self {
        Self::AddObstacle(obstacle)
    }

    pub fn attach<I, S>(id: impl Into<String>, link: impl Into<String>, touch_links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Attach {
            id: id.into(),
            link: link.into(),
            touch_links: touch_links.into_iter().map(Into::into).collect(),
        }
    }

    pub fn detach(id: impl Into<String>) -> Self {
        Self::Detach { id: id.into() }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Mutation::AddObstacle(o) | Mutation::ReplaceObstacle(o) => &o.id,
            Mutation::RemoveObstacle { id }
            | Mutation::Attach { id, .. }
            | Mutation::Detach { id } => id,
        }
    }
}

/// Obstacle in the flat form a planner consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerObstacle {
    pub id: String,
    pub kind: ShapeKind,
    pub dimensions: Vec<f64>,
    pub pose: Pose,
    pub frame_id: String,
    pub attached_link: Option<String>,
    pub touch_links: Vec<String>,
}

/// Immutable copy of the world model at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub planning_frame: String,
    pub obstacles: Vec<Obstacle>,
    pub attachments: Vec<Attachment>,
}

impl WorldSnapshot {
    pub fn obstacle(&self, id: &str) -> Option<&Obstacle> {
        self.obstacles.iter().find(|o| o.id == id)
    }

    pub fn attachment(&self, id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.object_id == id)
    }

    /// Translates every obstacle (attached or not) into the planner's representation.
    pub fn planner_obstacles(&self) -> Vec<PlannerObstacle> {
        self.obstacles
            .iter()
            .map(|o| {
                let attachment = self.attachment(&o.id);
                PlannerObstacle {
                    id: o.id.clone(),
                    kind: o.shape.kind(),
                    dimensions: o.shape.dimensions(),
                    pose: o.pose,
                    frame_id: o
                        .frame_id
                        .clone()
                        .unwrap_or_else(|| self.planning_frame.clone()),
                    attached_link: attachment.map(|a| a.link.clone()),
                    touch_links: attachment
                        .map(|a| a.touch_links.iter().cloned().collect())
                        .unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Registry of named obstacles and their attachments to the robot.
#[derive(Debug, Clone)]
pub struct WorldModel {
    planning_frame: String,
    obstacles: BTreeMap<String, Obstacle>,
    attachments: BTreeMap<String, Attachment>,
}

impl Default for WorldModel {
    fn default() -> Self {
        Self::new(DEFAULT_PLANNING_FRAME)
    }
}

impl WorldModel {
    pub fn new(planning_frame: impl Into<String>) -> Self {
        Self {
            planning_frame: planning_frame.into(),
            obstacles: BTreeMap::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn planning_frame(&self) -> &str {
        &self.planning_frame
    }

    pub fn contains(&self, id: &str) -> bool {
        self.obstacles.contains_key(id)
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attachments.contains_key(id)
    }

    /// Inserts a new obstacle. Fails with [`WorldError::DuplicateId`] if the id is taken.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> Result<(), WorldError> {
        if self.obstacles.contains_key(&obstacle.id) {
            return Err(WorldError::DuplicateId(obstacle.id));
        }
        obstacle.shape.validate(&obstacle.id)?;

        info!(obstacle_id = %obstacle.id, kind = ?obstacle.shape.kind(), "adding obstacle to world");
        self.obstacles.insert(obstacle.id.clone(), obstacle);
        Ok(())
    }

    /// Fully replaces an existing, unattached obstacle.
    pub fn replace_obstacle(&mut self, obstacle: Obstacle) -> Result<(), WorldError> {
        if !self.obstacles.contains_key(&obstacle.id) {
            return Err(WorldError::UnknownObstacle(obstacle.id));
        }
        if self.attachments.contains_key(&obstacle.id) {
            return Err(WorldError::AlreadyAttached(obstacle.id));
        }
        obstacle.shape.validate(&obstacle.id)?;

        debug!(obstacle_id = %obstacle.id, "replacing obstacle");
        self.obstacles.insert(obstacle.id.clone(), obstacle);
        Ok(())
    }

    /// Removes an obstacle, dropping its attachment if it had one.
    pub fn remove_obstacle(&mut self, id: &str) -> Result<Obstacle, WorldError> {
        let removed = self
            .obstacles
            .remove(id)
            .ok_or_else(|| WorldError::UnknownObstacle(id.to_string()))?;
        if self.attachments.remove(id).is_some() {
            debug!(obstacle_id = %id, "removed obstacle was attached; attachment dropped");
        }

        info!(obstacle_id = %id, "removed obstacle from world");
        Ok(removed)
    }

    /// Attaches an existing obstacle to `link`; its frame becomes that link.
    ///
    /// The pose numbers are kept unchanged and are read as an offset from `link` from now on.
    pub fn attach<I, S>(&mut self, id: &str, link: &str, touch_links: I) -> Result<(), WorldError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let obstacle = self
            .obstacles
            .get_mut(id)
            .ok_or_else(|| WorldError::UnknownObstacle(id.to_string()))?;
        if self.attachments.contains_key(id) {
            return Err(WorldError::AlreadyAttached(id.to_string()));
        }

        obstacle.frame_id = Some(link.to_string());
        let attachment = Attachment {
            object_id: id.to_string(),
            link: link.to_string(),
            touch_links: touch_links.into_iter().map(Into::into).collect(),
        };

        info!(obstacle_id = %id, link, touch_links = ?attachment.touch_links, "attaching object to robot");
        self.attachments.insert(id.to_string(), attachment);
        Ok(())
    }

    /// Detaches an obstacle and reparents it to the planning frame.
    ///
    /// Only the frame changes: the pose numbers are kept as they were, so an offset that was
    /// relative to the link is now read in the planning frame. Replace the obstacle afterwards if
    /// it must stay where the link left it.
    pub fn detach(&mut self, id: &str) -> Result<Attachment, WorldError> {
        let attachment = self
            .attachments
            .remove(id)
            .ok_or_else(|| WorldError::NotAttached(id.to_string()))?;
        if let Some(obstacle) = self.obstacles.get_mut(id) {
            obstacle.frame_id = Some(self.planning_frame.clone());
        }

        info!(obstacle_id = %id, link = %attachment.link, "detached object from robot");
        Ok(attachment)
    }

    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), WorldError> {
        match mutation {
            Mutation::AddObstacle(obstacle) => self.add_obstacle(obstacle.clone()),
            Mutation::ReplaceObstacle(obstacle) => self.replace_obstacle(obstacle.clone()),
            Mutation::RemoveObstacle { id } => self.remove_obstacle(id).map(|_| ()),
            Mutation::Attach {
                id,
                link,
                touch_links,
            } => self.attach(id, link, touch_links.iter().cloned()),
            Mutation::Detach { id } => self.detach(id).map(|_| ()),
        }
    }

    /// Applies mutations in order, stopping at the first failure.
    ///
    /// Mutations applied before the failing one stay applied.
    pub fn apply_all<'a, I>(&mut self, mutations: I) -> Result<usize, WorldError>
    where
        I: IntoIterator<Item = &'a Mutation>,
    {
        let mut applied = 0;
        for mutation in mutations {
            self.apply(mutation)?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn obstacles(&self) -> Vec<Obstacle> {
        self.obstacles.values().cloned().collect()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments.values().cloned().collect()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            planning_frame: self.planning_frame.clone(),
            obstacles: self.obstacles(),
            attachments: self.attachments(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cylinder(id: &str) -> Obstacle {
        Obstacle::new(
            id,
            Shape::Cylinder {
                height: 0.2,
                radius: 0.04,
            },
            Pose::from_position(0.0, 0.0, 0.2),
        )
        .in_frame("panda_link8")
    }

    #[test]
    fn duplicate_add_fails() {
        let mut world = WorldModel::default();
        world.add_obstacle(cylinder("cyl1")).expect("first add");
        assert_eq!(
            world.add_obstacle(cylinder("cyl1")),
            Err(WorldError::DuplicateId("cyl1".to_string()))
        );
        assert_eq!(world.obstacles().len(), 1);
    }

    #[test]
    fn attach_requires_existing_obstacle() {
        let mut world = WorldModel::default();
        assert_eq!(
            world.attach("cyl1", "panda_hand", ["f1", "f2"]),
            Err(WorldError::UnknownObstacle("cyl1".to_string()))
        );

        world.add_obstacle(cylinder("cyl1")).expect("add");
        world
            .attach("cyl1", "panda_hand", ["f1", "f2"])
            .expect("attach after add");

        let attachments = world.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].link, "panda_hand");
        assert!(attachments[0].touch_links.contains("f2"));
        assert_eq!(
            world.snapshot().obstacle("cyl1").and_then(|o| o.frame_id.clone()),
            Some("panda_hand".to_string())
        );
    }

    #[test]
    fn double_attach_fails_and_detach_allows_reattach() {
        let mut world = WorldModel::new("panda_link0");
        world.add_obstacle(cylinder("cyl1")).expect("add");
        world.attach("cyl1", "panda_hand", ["f1"]).expect("attach");
        assert_eq!(
            world.attach("cyl1", "panda_hand", ["f1"]),
            Err(WorldError::AlreadyAttached("cyl1".to_string()))
        );

        let detached = world.detach("cyl1").expect("detach");
        assert_eq!(detached.link, "panda_hand");
        assert_eq!(
            world.snapshot().obstacle("cyl1").and_then(|o| o.frame_id.clone()),
            Some("panda_link0".to_string())
        );
        world.attach("cyl1", "panda_hand", ["f1"]).expect("re-attach");
    }

    #[test]
    fn detach_resets_frame_but_keeps_pose_numbers() {
        let mut world = WorldModel::new("panda_link0");
        let original = cylinder("cyl1");
        world.add_obstacle(original.clone()).expect("add");
        world.attach("cyl1", "panda_hand", ["f1"]).expect("attach");
        world.detach("cyl1").expect("detach");

        let snapshot = world.snapshot();
        let detached = snapshot.obstacle("cyl1").expect("still in world");
        assert_eq!(detached.pose, original.pose);
        assert_eq!(detached.frame_id.as_deref(), Some("panda_link0"));
    }

    #[test]
    fn detach_without_attachment_fails() {
        let mut world = WorldModel::default();
        world.add_obstacle(cylinder("cyl1")).expect("add");
        assert_eq!(
            world.detach("cyl1"),
            Err(WorldError::NotAttached("cyl1".to_string()))
        );
    }

    #[test]
    fn snapshots_are_stable_without_mutation() {
        let mut world = WorldModel::default();
        world.add_obstacle(cylinder("cyl1")).expect("add");
        assert_eq!(world.obstacles(), world.obstacles());
        assert_eq!(world.snapshot(), world.snapshot());
    }

    #[test]
    fn remove_drops_attachment() {
        let mut world = WorldModel::default();
        world.add_obstacle(cylinder("cyl1")).expect("add");
        world.attach("cyl1", "panda_hand", Vec::<String>::new()).expect("attach");
        world.remove_obstacle("cyl1").expect("remove");
        assert!(!world.contains("cyl1"));
        assert!(!world.is_attached("cyl1"));
        assert!(matches!(
            world.remove_obstacle("cyl1"),
            Err(WorldError::UnknownObstacle(_))
        ));
    }

    #[test]
    fn replace_rejects_attached_obstacle() {
        let mut world = WorldModel::default();
        world.add_obstacle(cylinder("cyl1")).expect("add");
        world.replace_obstacle(cylinder("cyl1")).expect("replace unattached");
        world.attach("cyl1", "panda_hand", ["f1"]).expect("attach");
        assert_eq!(
            world.replace_obstacle(cylinder("cyl1")),
            Err(WorldError::AlreadyAttached("cyl1".to_string()))
        );
    }

    #[test]
    fn zero_sized_shape_is_rejected() {
        let mut world = WorldModel::default();
        let flat = Obstacle::new(
            "flat",
            Shape::Box {
                x: 0.1,
                y: 0.0,
                z: 0.5,
            },
            Pose::identity(),
        );
        assert!(matches!(
            world.add_obstacle(flat),
            Err(WorldError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn apply_all_stops_at_first_failure() {
        let mut world = WorldModel::default();
        let mutations = vec![
            Mutation::add(cylinder("a")),
            Mutation::attach("missing", "panda_hand", ["f1"]),
            Mutation::add(cylinder("b")),
        ];
        assert!(matches!(
            world.apply_all(&mutations),
            Err(WorldError::UnknownObstacle(_))
        ));
        assert!(world.contains("a"));
        assert!(!world.contains("b"));
    }

    #[test]
    fn planner_export_resolves_frames_and_attachments() {
        let mut world = WorldModel::new("panda_link0");
        world
            .add_obstacle(Obstacle::new(
                "box1",
                Shape::Box {
                    x: 0.1,
                    y: 1.5,
                    z: 0.5,
                },
                Pose::from_position(0.48, 0.0, 0.25),
            ))
            .expect("add box");
        world.add_obstacle(cylinder("cyl1")).expect("add cylinder");
        world
            .attach("cyl1", "panda_hand", ["panda_leftfinger", "panda_rightfinger"])
            .expect("attach");

        let exported = world.snapshot().planner_obstacles();
        let box1 = exported.iter().find(|o| o.id == "box1").expect("box1");
        assert_eq!(box1.kind, ShapeKind::Box);
        assert_eq!(box1.dimensions, vec![0.1, 1.5, 0.5]);
        assert_eq!(box1.frame_id, "panda_link0");
        assert_eq!(box1.attached_link, None);

        let cyl = exported.iter().find(|o| o.id == "cyl1").expect("cyl1");
        assert_eq!(cyl.dimensions, vec![0.2, 0.04]);
        assert_eq!(cyl.frame_id, "panda_hand");
        assert_eq!(cyl.attached_link.as_deref(), Some("panda_hand"));
        assert_eq!(cyl.touch_links, vec!["panda_leftfinger", "panda_rightfinger"]);
    }

    #[test]
    fn mutation_json_uses_op_tag() {
        let m: Mutation = serde_json::from_str(
            r#"{"op":"attach","id":"cyl1","link":"panda_hand","touch_links":["f1"]}"#,
        )
        .expect("parse");
        assert_eq!(m, Mutation::attach("cyl1", "panda_hand", ["f1"]));
        assert_eq!(m.target_id(), "cyl1");
    }
}
