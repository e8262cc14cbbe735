//! Configuration system.
//!
//! Loads world configuration from JSON strings/files. Every field has a
//! default, so a config file only needs to name what it overrides.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{avatar::CharacterSkin, error::WorldError, minigame::WritePolicy, room::RoomCode};

/// Root configuration shared by client/relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Relay listen/connect address, e.g. `127.0.0.1:40100`.
    pub relay_addr: String,
    /// User-chosen room code (client only). Normalized on use.
    pub room_code: String,
    /// Chat display name (client only). Defaults to the skin's name.
    pub display_name: Option<String>,
    /// Character skin (client only).
    pub skin: CharacterSkin,
    /// Frame loop rate (client only).
    pub frame_hz: u32,
    pub sync: SyncConfig,
    pub motion: MotionConfig,
    pub animation: AnimationConfig,
    pub relay: RelayConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:40100".to_string(),
            room_code: String::new(),
            display_name: None,
            skin: CharacterSkin::default(),
            frame_hz: 60,
            sync: SyncConfig::default(),
            motion: MotionConfig::default(),
            animation: AnimationConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Normalized room code.
    pub fn room(&self) -> Result<RoomCode, WorldError> {
        RoomCode::parse(&self.room_code)
    }

    /// Chat author name.
    pub fn author_name(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.skin.display_name().to_string(),
        }
    }
}

/// Network synchronization knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on self-publish rate.
    pub publish_hz: u32,
    /// Peers whose liveness is older than this are evicted.
    pub staleness_secs: u32,
    /// Recent chat messages kept and delivered.
    pub chat_history: usize,
    /// Hide messages created before joining.
    pub filter_pre_join_chat: bool,
    /// Slack applied to the join-time chat filter.
    pub chat_join_grace_ms: i64,
    /// How shared mini-game documents are written.
    pub write_policy: WritePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_hz: 10,
            staleness_secs: 60,
            chat_history: 50,
            filter_pre_join_chat: true,
            chat_join_grace_ms: 2_000,
            write_policy: WritePolicy::LastWriterWins,
        }
    }
}

impl SyncConfig {
    /// Minimum spacing between publishes.
    pub fn publish_interval_ms(&self) -> i64 {
        1_000 / i64::from(self.publish_hz.max(1))
    }

    pub fn staleness_ms(&self) -> i64 {
        i64::from(self.staleness_secs) * 1_000
    }
}

/// Local motion parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Walking speed in units/s.
    pub base_speed: f32,
    pub sprint_multiplier: f32,
    /// Vertical acceleration in units/s^2 (negative is down).
    pub gravity: f32,
    /// Initial upward velocity of a jump in units/s.
    pub jump_velocity: f32,
    pub world_radius: f32,
    pub boundary_margin: f32,
    /// Per-frame fraction of the remaining turn applied.
    pub turn_smoothing: f32,
    /// Frame time clamp in seconds.
    pub max_dt: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            base_speed: 6.0,
            sprint_multiplier: 1.8,
            gravity: -15.0,
            jump_velocity: 8.0,
            world_radius: 80.0,
            boundary_margin: 1.0,
            turn_smoothing: 0.15,
            max_dt: 0.1,
        }
    }
}

impl MotionConfig {
    /// Radius the avatar is clamped to.
    pub fn walkable_radius(&self) -> f32 {
        (self.world_radius - self.boundary_margin).max(0.0)
    }
}

/// Animation and remote smoothing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub emote_duration_ms: i64,
    pub pulse_duration_ms: i64,
    /// Heights at or below this count as grounded.
    pub grounded_epsilon: f32,
    /// Walk-cycle phase advance per walking frame.
    pub walk_phase_step: f32,
    /// Per-frame easing back to neutral while idle.
    pub idle_easing: f32,
    /// Per-frame position smoothing for remote avatars.
    pub remote_position_smoothing: f32,
    /// Per-frame rotation smoothing for remote avatars.
    pub remote_rotation_smoothing: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            emote_duration_ms: 3_000,
            pulse_duration_ms: 400,
            grounded_epsilon: 0.1,
            walk_phase_step: 0.2,
            idle_easing: 0.1,
            remote_position_smoothing: 0.1,
            remote_rotation_smoothing: 0.1,
        }
    }
}

/// Relay server parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Peer snapshot broadcast rate.
    pub tick_hz: u32,
    pub max_room_participants: usize,
    /// Handshake timeout for joining clients.
    pub handshake_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tick_hz: 10,
            max_room_participants: 16,
            handshake_timeout_ms: 5_000,
        }
    }
}
