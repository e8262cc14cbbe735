//! Local motion simulator.
//!
//! Advances the local avatar one frame at a time. The simulator is the only
//! writer of the local raw motion state; everybody else sees `MotionFrame`
//! or the published `AvatarState` projection.
//!
//! Turn smoothing is a fixed fraction per frame, not per second, so turning
//! is slightly faster at higher frame rates.

use std::f32::consts::PI;

use tracing::debug;
use world_shared::{
    config::MotionConfig,
    math::{shortest_arc, wrap_angle, Vec3},
};

use crate::input::MotionInput;

/// Raw motion state. Never leaves the client.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalMotionState {
    pub vertical_velocity: f32,
    pub airborne: bool,
    pub sitting: bool,
}

/// Explicit relocation. Applied at most once per id; ids must increase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportRequest {
    pub target: Vec3,
    pub id: u64,
}

/// Result of one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionFrame {
    pub position: Vec3,
    pub facing: f32,
    /// Speed factor this frame: 0 at rest, 1 walking, the sprint multiplier sprinting.
    pub speed: f32,
    pub moving: bool,
    pub sprinting: bool,
    pub airborne: bool,
    pub sitting: bool,
    /// Touched the ground during this step.
    pub landed: bool,
}

/// Projects `p` back onto the circle of `radius` if it lies outside.
pub fn clamp_to_boundary(p: Vec3, radius: f32) -> Vec3 {
    let dist = p.horizontal_len();
    if dist <= radius || dist == 0.0 {
        return p;
    }
    let scale = radius / dist;
    Vec3::new(p.x * scale, p.y, p.z * scale)
}

/// Facing angle that moves along `direction` relative to the camera.
pub fn target_facing(camera_yaw: f32, dx: f32, dy: f32) -> f32 {
    wrap_angle(camera_yaw + (-dx).atan2(dy) + PI)
}

pub struct MotionSimulator {
    cfg: MotionConfig,
    position: Vec3,
    facing: f32,
    state: LocalMotionState,
    last_teleport: Option<u64>,
}

impl MotionSimulator {
    pub fn new(cfg: MotionConfig, spawn: Vec3, facing: f32) -> Self {
        Self {
            cfg,
            position: clamp_to_boundary(spawn, cfg.walkable_radius()),
            facing: wrap_angle(facing),
            state: LocalMotionState::default(),
            last_teleport: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn facing(&self) -> f32 {
        self.facing
    }

    pub fn state(&self) -> LocalMotionState {
        self.state
    }

    pub fn is_grounded(&self) -> bool {
        !self.state.airborne
    }

    pub fn set_sitting(&mut self, sitting: bool) {
        self.state.sitting = sitting;
    }

    /// Applies a teleport unless its id was already seen. Returns whether it applied.
    pub fn teleport(&mut self, req: TeleportRequest) -> bool {
        if self.last_teleport.is_some_and(|last| req.id <= last) {
            return false;
        }
        self.last_teleport = Some(req.id);
        self.position = req.target;
        self.state.vertical_velocity = 0.0;
        self.state.airborne = false;
        debug!(id = req.id, x = req.target.x, y = req.target.y, z = req.target.z, "Teleported");
        true
    }

    /// Advances one frame. `dt` is in seconds and clamped to `max_dt`.
    pub fn step(&mut self, input: &MotionInput, dt: f32) -> MotionFrame {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.cfg.max_dt)
        } else {
            0.0
        };
        let mut landed = false;

        if self.state.airborne {
            self.state.vertical_velocity += self.cfg.gravity * dt;
            self.position.y += self.state.vertical_velocity * dt;
            if self.position.y <= 0.0 {
                self.position.y = 0.0;
                self.state.airborne = false;
                self.state.vertical_velocity = 0.0;
                landed = true;
            }
        }

        let mut speed = 0.0;
        if !self.state.sitting {
            let dir = input.direction;
            if !dir.is_zero() {
                speed = if input.sprint {
                    self.cfg.sprint_multiplier
                } else {
                    1.0
                };
                let target = target_facing(input.camera_yaw, dir.x, dir.y);
                self.facing = wrap_angle(
                    self.facing + shortest_arc(self.facing, target) * self.cfg.turn_smoothing,
                );
                let step = self.cfg.base_speed * dt * speed;
                self.position.x += self.facing.sin() * step;
                self.position.z += self.facing.cos() * step;
            }

            self.position = clamp_to_boundary(self.position, self.cfg.walkable_radius());

            if input.jump && !self.state.airborne {
                self.state.airborne = true;
                self.state.vertical_velocity = self.cfg.jump_velocity;
            }
        }

        MotionFrame {
            position: self.position,
            facing: self.facing,
            speed,
            moving: speed > 0.0,
            sprinting: speed > 0.0 && input.sprint,
            airborne: self.state.airborne,
            sitting: self.state.sitting,
            landed,
        }
    }
}
