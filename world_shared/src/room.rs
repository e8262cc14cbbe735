//! Rooms.
//!
//! A room is an isolated namespace; every channel operation is scoped to one.
//! `RoomState` is the backend-side record of a room and lives only as long
//! as somebody is in it.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    avatar::{AvatarState, ParticipantId},
    chat::{ChatLog, ChatMessage},
    clock::Millis,
    error::WorldError,
    minigame::{PatchOutcome, SharedPatch, SharedState},
};

/// Maximum room code length after normalization.
pub const MAX_ROOM_CODE_LEN: usize = 32;

/// A case-normalized room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Trims and upper-cases a user-typed code.
    pub fn parse(raw: &str) -> Result<Self, WorldError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            return Err(WorldError::configuration("room code is empty"));
        }
        if code.chars().count() > MAX_ROOM_CODE_LEN {
            return Err(WorldError::configuration(format!(
                "room code longer than {MAX_ROOM_CODE_LEN} characters"
            )));
        }
        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(WorldError::configuration(format!(
                "room code contains invalid character {bad:?}"
            )));
        }
        Ok(RoomCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = WorldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoomCode::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Backend-side room contents.
#[derive(Debug, Clone)]
pub struct RoomState {
    presence: BTreeMap<ParticipantId, AvatarState>,
    chat: ChatLog,
    shared: SharedState,
}

impl RoomState {
    pub fn new(chat_history: usize) -> Self {
        RoomState {
            presence: BTreeMap::new(),
            chat: ChatLog::new(chat_history),
            shared: SharedState::default(),
        }
    }

    /// Stores a presence entry, stamping it with the backend clock.
    pub fn publish(&mut self, id: &ParticipantId, mut state: AvatarState, now_ms: Millis) {
        state.liveness_ms = now_ms;
        self.presence.insert(id.clone(), state);
    }

    /// Removes a presence entry. Returns whether one existed.
    pub fn retract(&mut self, id: &ParticipantId) -> bool {
        self.presence.remove(id).is_some()
    }

    /// Drops entries whose liveness is older than `window_ms`.
    pub fn evict_stale(&mut self, now_ms: Millis, window_ms: Millis) -> Vec<ParticipantId> {
        let stale: Vec<ParticipantId> = self
            .presence
            .iter()
            .filter(|(_, s)| s.age_ms(now_ms) > window_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.presence.remove(id);
        }
        stale
    }

    /// Everybody except `viewer`.
    pub fn peers_for(&self, viewer: &ParticipantId) -> BTreeMap<ParticipantId, AvatarState> {
        self.presence
            .iter()
            .filter(|(id, _)| *id != viewer)
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    pub fn presence_len(&self) -> usize {
        self.presence.len()
    }

    pub fn append_chat(&mut self, author: &str, text: &str, now_ms: Millis) -> Option<ChatMessage> {
        self.chat.append(author, text, now_ms)
    }

    pub fn chat(&self) -> Vec<ChatMessage> {
        self.chat.recent()
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn write_shared(&mut self, patch: SharedPatch) -> PatchOutcome {
        self.shared.apply(patch)
    }
}
