//! Avatar state as published by each participant.
//!
//! `AvatarState` is the network projection of a participant's avatar. It is
//! owned by the publishing participant and read-only for everyone else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    clock::Millis,
    math::{wrap_angle, Vec3},
};

/// Identifies a participant within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Generates a random anonymous id.
    pub fn random() -> Self {
        ParticipantId(format!("{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}

/// Character skin selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CharacterSkin {
    #[default]
    Azure,
    Coral,
}

impl CharacterSkin {
    pub const ALL: [CharacterSkin; 2] = [CharacterSkin::Azure, CharacterSkin::Coral];

    /// Display name used as chat author when none is configured.
    pub fn display_name(self) -> &'static str {
        match self {
            CharacterSkin::Azure => "Azure",
            CharacterSkin::Coral => "Coral",
        }
    }

    /// Body color as 0xRRGGBB.
    pub fn color(self) -> u32 {
        match self {
            CharacterSkin::Azure => 0x4dabf7,
            CharacterSkin::Coral => 0xff8787,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Some(CharacterSkin::Azure),
            "coral" => Some(CharacterSkin::Coral),
            _ => None,
        }
    }
}

/// Named emotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmoteKind {
    Wave,
    Dance,
    Heart,
}

impl EmoteKind {
    pub const ALL: [EmoteKind; 3] = [EmoteKind::Wave, EmoteKind::Dance, EmoteKind::Heart];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wave" => Some(EmoteKind::Wave),
            "dance" => Some(EmoteKind::Dance),
            "heart" => Some(EmoteKind::Heart),
            _ => None,
        }
    }
}

/// An emote issued at a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emote {
    pub kind: EmoteKind,
    pub issued_at_ms: Millis,
}

impl Emote {
    /// Active for `[issued_at, issued_at + duration)`.
    pub fn is_active(&self, now_ms: Millis, duration_ms: Millis) -> bool {
        let age = now_ms - self.issued_at_ms;
        (0..duration_ms).contains(&age)
    }
}

/// Momentary action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Punch,
}

/// A momentary action signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionPulse {
    pub kind: ActionKind,
    pub issued_at_ms: Millis,
}

impl ActionPulse {
    pub fn is_active(&self, now_ms: Millis, duration_ms: Millis) -> bool {
        let age = now_ms - self.issued_at_ms;
        (0..duration_ms).contains(&age)
    }
}

/// Published avatar state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarState {
    pub position: Vec3,
    /// Facing angle in radians, normalized to `(-PI, PI]`.
    pub rot: f32,
    pub moving: bool,
    #[serde(default)]
    pub sprinting: bool,
    #[serde(default)]
    pub sitting: bool,
    pub skin: CharacterSkin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emote: Option<Emote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<ActionPulse>,
    /// Wall-clock time of the publish that carried this state.
    #[serde(default)]
    pub liveness_ms: Millis,
}

impl AvatarState {
    pub fn new(skin: CharacterSkin, position: Vec3, rot: f32) -> Self {
        Self {
            position,
            rot: wrap_angle(rot),
            moving: false,
            sprinting: false,
            sitting: false,
            skin,
            emote: None,
            pulse: None,
            liveness_ms: 0,
        }
    }

    /// Age of the liveness stamp relative to `now_ms`.
    pub fn age_ms(&self, now_ms: Millis) -> Millis {
        now_ms - self.liveness_ms
    }

    /// Compares everything except the liveness stamp.
    pub fn same_pose_as(&self, other: &AvatarState) -> bool {
        self.position == other.position
            && self.rot == other.rot
            && self.moving == other.moving
            && self.sprinting == other.sprinting
            && self.sitting == other.sitting
            && self.skin == other.skin
            && self.emote == other.emote
            && self.pulse == other.pulse
    }
}
