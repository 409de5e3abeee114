//! The classic pose-goal walkthrough for a Panda arm, as a declarative task.
//!
//! Shuttles the flipped gripper between two poses three times: first in free space, then with a
//! wall-like box between the poses, then carrying a cylinder attached to the hand.

use crate::config::{SequencerConfig, TaskDefinition};
use crate::geometry::Pose;
use crate::queue::{ScalingLimits, Step};
use crate::world::{Mutation, Obstacle, Shape};

pub const PLANNING_FRAME: &str = "panda_link0";
pub const END_EFFECTOR_LINK: &str = "panda_link8";
pub const HAND_LINK: &str = "panda_hand";
pub const TOUCH_LINKS: [&str; 2] = ["panda_rightfinger", "panda_leftfinger"];

const PROMPT: &str = "Press 'next' in the visual tools window to continue the demo";

// Gripper pointing down: 180 degrees about x.
const FLIPPED: [f64; 4] = [-1.0, 0.0, 0.0, 0.0];

fn goal(x: f64) -> Pose {
    Pose {
        orientation: nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            FLIPPED[3], FLIPPED[0], FLIPPED[1], FLIPPED[2],
        )),
        ..Pose::from_position(x, 0.0, 0.59)
    }
}

fn far() -> Pose {
    goal(0.7)
}

fn near() -> Pose {
    goal(0.28)
}

pub fn box1() -> Obstacle {
    Obstacle::new(
        "box1",
        Shape::Box {
            x: 0.1,
            y: 1.5,
            z: 0.5,
        },
        Pose::from_position(0.48, 0.0, 0.25),
    )
    .in_frame(PLANNING_FRAME)
}

/// Cylinder placed so that it sits in the gripper.
pub fn cylinder1() -> Obstacle {
    Obstacle::new(
        "cylinder1",
        Shape::Cylinder {
            height: 0.20,
            radius: 0.04,
        },
        Pose::from_position(0.0, 0.0, 0.2),
    )
    .in_frame(END_EFFECTOR_LINK)
}

pub fn pick_and_place() -> TaskDefinition {
    // Same limits for every goal.
    let slow = ScalingLimits::new(0.15, 0.15).unwrap_or_default();
    let step = |label: &str, target: Pose| {
        Step::new(target)
            .labelled(label)
            .with_scaling(slow)
            .with_prompt(PROMPT)
    };

    TaskDefinition {
        name: "pick_and_place_demo".to_string(),
        config: SequencerConfig {
            planning_frame: PLANNING_FRAME.to_string(),
            end_effector_link: Some(END_EFFECTOR_LINK.to_string()),
            ..SequencerConfig::default()
        },
        initial_obstacles: Vec::new(),
        steps: vec![
            step("reach far", far()),
            step("reach near", near()),
            step("reach far around box", far()).with_pre(Mutation::add(box1())),
            step("reach near around box", near()),
            step("reach far holding cylinder", far())
                .with_pre(Mutation::add(cylinder1()))
                .with_pre(Mutation::attach("cylinder1", HAND_LINK, TOUCH_LINKS)),
            step("reach near holding cylinder", near()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::collaborators::ExecutionOutcome;
    use crate::sequencer::TaskSequencer;
    use crate::step::StepState;
    use crate::testing::{PlanScript, RecordingPresenter, ScriptedExecutor, ScriptedPlanner};

    #[test]
    fn definition_survives_json() {
        let json = pick_and_place().to_json().expect("serialize");
        let parsed = TaskDefinition::from_json(&json).expect("parse");
        assert_eq!(parsed.steps.len(), 6);
        assert_eq!(parsed.steps[4].pre.len(), 2);
        assert_eq!(parsed.config.planning_frame, PLANNING_FRAME);
    }

    #[tokio::test]
    async fn full_walkthrough_ends_with_box_and_attached_cylinder() {
        let presenter = RecordingPresenter::new();
        let planner = ScriptedPlanner::always_succeeds();
        let mut seq = TaskSequencer::from_definition(
            pick_and_place(),
            planner.clone(),
            ScriptedExecutor::always_completes(),
            presenter.clone(),
        )
        .expect("sequencer");

        let report = seq.run().await.expect("task runs");
        assert!(report.all_done());
        assert_eq!(report.steps.len(), 6);

        let world = seq.world();
        assert!(world.contains("box1"));
        let attachments = world.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].link, HAND_LINK);
        assert_eq!(attachments[0].touch_links.len(), 2);

        // The last two goals are planned with the cylinder riding on the hand.
        let requests = planner.requests();
        assert!(requests[3].world.attachment("cylinder1").is_none());
        assert!(requests[4].world.attachment("cylinder1").is_some());
        assert!(requests.iter().all(|r| r.scaling.velocity() == 0.15));

        let waits = presenter
            .calls()
            .iter()
            .filter(|c| c.starts_with("wait:"))
            .count();
        assert_eq!(waits, 6);
    }

    #[tokio::test]
    async fn blocked_approach_does_not_stop_later_steps() {
        let mut seq = TaskSequencer::from_definition(
            pick_and_place(),
            ScriptedPlanner::scripted([
                PlanScript::Succeed,
                PlanScript::Succeed,
                PlanScript::Fail,
            ]),
            ScriptedExecutor::scripted([ExecutionOutcome::Completed; 2]),
            Arc::new(crate::collaborators::NullPresenter),
        )
        .expect("sequencer");

        let report = seq.run().await.expect("task runs");
        assert_eq!(report.steps[2].state, StepState::PlanFailed);
        // The box is a pre-mutation, so it is in place even though the approach failed.
        assert!(seq.world().contains("box1"));
        assert!(report.steps[3..].iter().all(|s| s.state == StepState::Done));
    }
}
