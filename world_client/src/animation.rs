//! Character animation state machine.
//!
//! Maps what an avatar is doing to a joint pose. The same machine drives the
//! local avatar and every remote one. State selection is a pure function;
//! `Animator` only carries the walk-cycle phase and the previous pose so idle
//! limbs can ease back to neutral.
//!
//! Priority: Sitting > Emoting > Walking > Idle.

use std::f32::consts::PI;

use world_shared::{
    avatar::{ActionKind, ActionPulse, Emote, EmoteKind},
    clock::Millis,
    config::AnimationConfig,
    math::lerp,
};

/// Everything the state machine looks at for one avatar in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationInput {
    /// Horizontal speed factor; anything above zero counts as walking.
    pub speed: f32,
    /// Height above the ground.
    pub height: f32,
    pub sitting: bool,
    pub emote: Option<Emote>,
    pub pulse: Option<ActionPulse>,
    /// Monotonic seconds, drives periodic motion.
    pub time_s: f32,
    /// Wall clock, used to age emotes and pulses.
    pub now_ms: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Sitting,
    Emoting(EmoteKind),
    Walking,
    Idle,
}

/// Rotation of one limb, in radians about its local x (swing) and z (raise) axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Joint {
    pub x: f32,
    pub z: f32,
}

impl Joint {
    fn eased_to_neutral(self, t: f32) -> Joint {
        Joint {
            x: lerp(self.x, 0.0, t),
            z: lerp(self.z, 0.0, t),
        }
    }
}

/// Pose parameters handed to the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    /// Vertical offset of the model inside its transform.
    pub body_height: f32,
    pub body_yaw: f32,
    pub head_yaw: f32,
    pub left_arm: Joint,
    pub right_arm: Joint,
    pub left_leg: Joint,
    pub right_leg: Joint,
}

/// Picks the animation state for an avatar.
pub fn classify(input: &AnimationInput, cfg: &AnimationConfig) -> AnimationState {
    if input.sitting {
        return AnimationState::Sitting;
    }
    let grounded = input.height <= cfg.grounded_epsilon;
    if grounded {
        if let Some(emote) = input.emote {
            if emote.is_active(input.now_ms, cfg.emote_duration_ms) {
                return AnimationState::Emoting(emote.kind);
            }
        }
        if input.speed > 0.0 {
            return AnimationState::Walking;
        }
    }
    AnimationState::Idle
}

fn idle_head_sway(time_s: f32) -> f32 {
    (time_s * 0.5).sin() * 0.1
}

fn emote_pose(kind: EmoteKind, t: f32) -> Pose {
    match kind {
        EmoteKind::Dance => Pose {
            body_yaw: (t * 10.0).sin() * 0.5,
            body_height: (t * 15.0).sin().abs() * 0.3,
            left_arm: Joint {
                x: 0.0,
                z: (t * 10.0).sin() * 2.0,
            },
            right_arm: Joint {
                x: 0.0,
                z: -(t * 10.0).sin() * 2.0,
            },
            ..Pose::default()
        },
        EmoteKind::Wave => Pose {
            right_arm: Joint {
                x: (t * 15.0).sin() * 0.5,
                z: 2.5,
            },
            head_yaw: 0.2,
            ..Pose::default()
        },
        EmoteKind::Heart => Pose {
            left_arm: Joint { x: 0.0, z: 2.5 },
            right_arm: Joint { x: 0.0, z: -2.5 },
            body_height: (t * 2.0).sin().abs() * 0.1,
            ..Pose::default()
        },
    }
}

/// Per-avatar animation memory.
#[derive(Debug, Clone, Default)]
pub struct Animator {
    walk_phase: f32,
    pose: Pose,
    state: Option<AnimationState>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn walk_phase(&self) -> f32 {
        self.walk_phase
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn state(&self) -> Option<AnimationState> {
        self.state
    }

    /// Advances one frame and returns the new pose.
    pub fn update(&mut self, input: &AnimationInput, cfg: &AnimationConfig) -> (AnimationState, Pose) {
        let state = classify(input, cfg);
        let t = input.time_s;
        let grounded = input.height <= cfg.grounded_epsilon;

        let mut pose = match state {
            AnimationState::Sitting => Pose {
                body_height: 0.3,
                head_yaw: idle_head_sway(t),
                left_leg: Joint { x: -PI / 2.0, z: 0.0 },
                right_leg: Joint { x: -PI / 2.0, z: 0.0 },
                ..Pose::default()
            },
            AnimationState::Emoting(kind) => emote_pose(kind, t),
            AnimationState::Walking => {
                self.walk_phase += cfg.walk_phase_step;
                let p = self.walk_phase;
                Pose {
                    body_height: (p * 2.0).sin().abs() * 0.1,
                    left_leg: Joint {
                        x: p.sin() * 0.5,
                        z: 0.0,
                    },
                    right_leg: Joint {
                        x: (p + PI).sin() * 0.5,
                        z: 0.0,
                    },
                    left_arm: Joint {
                        x: (p + PI).sin() * 0.5,
                        z: 0.0,
                    },
                    right_arm: Joint {
                        x: p.sin() * 0.5,
                        z: 0.0,
                    },
                    ..Pose::default()
                }
            }
            AnimationState::Idle => {
                let prev = self.pose;
                let e = cfg.idle_easing;
                Pose {
                    body_height: if grounded {
                        lerp(prev.body_height, 0.0, e)
                    } else {
                        prev.body_height
                    },
                    body_yaw: 0.0,
                    head_yaw: idle_head_sway(t),
                    left_arm: prev.left_arm.eased_to_neutral(e),
                    right_arm: prev.right_arm.eased_to_neutral(e),
                    left_leg: prev.left_leg.eased_to_neutral(e),
                    right_leg: prev.right_leg.eased_to_neutral(e),
                }
            }
        };

        if matches!(state, AnimationState::Walking | AnimationState::Idle) {
            if let Some(pulse) = input.pulse {
                if pulse.is_active(input.now_ms, cfg.pulse_duration_ms) {
                    match pulse.kind {
                        ActionKind::Punch => pose.right_arm = Joint { x: -PI / 2.0, z: 0.0 },
                    }
                }
            }
        }

        self.pose = pose;
        self.state = Some(state);
        (state, pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AnimationConfig {
        AnimationConfig::default()
    }

    fn wave_at(ms: Millis) -> Option<Emote> {
        Some(Emote {
            kind: EmoteKind::Wave,
            issued_at_ms: ms,
        })
    }

    #[test]
    fn wave_is_active_for_exactly_three_seconds() {
        let t0 = 1_700_000_000_000;
        let mut input = AnimationInput {
            emote: wave_at(t0),
            ..Default::default()
        };
        for now in [t0, t0 + 1, t0 + 1_500, t0 + 2_999] {
            input.now_ms = now;
            assert_eq!(classify(&input, &cfg()), AnimationState::Emoting(EmoteKind::Wave));
        }
        for now in [t0 + 3_000, t0 + 10_000] {
            input.now_ms = now;
            assert_eq!(classify(&input, &cfg()), AnimationState::Idle);
        }
    }

    #[test]
    fn priority_is_sit_emote_walk_idle() {
        let base = AnimationInput {
            speed: 1.0,
            emote: wave_at(0),
            sitting: true,
            now_ms: 10,
            ..Default::default()
        };
        assert_eq!(classify(&base, &cfg()), AnimationState::Sitting);
        let standing = AnimationInput {
            sitting: false,
            ..base
        };
        assert_eq!(classify(&standing, &cfg()), AnimationState::Emoting(EmoteKind::Wave));
        let no_emote = AnimationInput {
            emote: None,
            ..standing
        };
        assert_eq!(classify(&no_emote, &cfg()), AnimationState::Walking);
        let still = AnimationInput {
            speed: 0.0,
            ..no_emote
        };
        assert_eq!(classify(&still, &cfg()), AnimationState::Idle);
    }

    #[test]
    fn airborne_suppresses_emote_and_walk() {
        let input = AnimationInput {
            speed: 1.0,
            height: 0.5,
            emote: wave_at(0),
            ..Default::default()
        };
        assert_eq!(classify(&input, &cfg()), AnimationState::Idle);
    }

    #[test]
    fn walk_phase_advances_only_while_walking() {
        let mut anim = Animator::new();
        let walk = AnimationInput {
            speed: 1.0,
            ..Default::default()
        };
        anim.update(&walk, &cfg());
        anim.update(&walk, &cfg());
        let phase = anim.walk_phase();
        assert!((phase - 2.0 * cfg().walk_phase_step).abs() < 1e-6);
        anim.update(&AnimationInput::default(), &cfg());
        assert_eq!(anim.walk_phase(), phase);
    }

    #[test]
    fn idle_limbs_ease_back_to_neutral() {
        let mut anim = Animator::new();
        let walk = AnimationInput {
            speed: 1.0,
            ..Default::default()
        };
        for _ in 0..8 {
            anim.update(&walk, &cfg());
        }
        let start = anim.pose().left_leg.x.abs();
        assert!(start > 0.0);
        for _ in 0..60 {
            anim.update(&AnimationInput::default(), &cfg());
        }
        assert!(anim.pose().left_leg.x.abs() < start * 0.01);
    }

    #[test]
    fn sitting_bends_legs_and_hides_punch() {
        let mut anim = Animator::new();
        let input = AnimationInput {
            sitting: true,
            pulse: Some(ActionPulse {
                kind: ActionKind::Punch,
                issued_at_ms: 0,
            }),
            now_ms: 100,
            ..Default::default()
        };
        let (state, pose) = anim.update(&input, &cfg());
        assert_eq!(state, AnimationState::Sitting);
        assert_eq!(pose.left_leg.x, -PI / 2.0);
        assert_eq!(pose.right_arm, Joint::default());
    }

    #[test]
    fn punch_overlays_idle_for_its_duration() {
        let mut anim = Animator::new();
        let mut input = AnimationInput {
            pulse: Some(ActionPulse {
                kind: ActionKind::Punch,
                issued_at_ms: 1_000,
            }),
            now_ms: 1_100,
            ..Default::default()
        };
        assert_eq!(anim.update(&input, &cfg()).1.right_arm.x, -PI / 2.0);
        input.now_ms = 1_000 + cfg().pulse_duration_ms;
        assert_ne!(anim.update(&input, &cfg()).1.right_arm.x, -PI / 2.0);
    }
}
