//! World channel abstraction.
//!
//! The core depends only on these traits. A channel is scoped to one room and
//! one participant; its operations never block: publishes and writes are
//! queued, and everything inbound arrives through the subscriber's inbox.

use async_trait::async_trait;

use crate::{
    avatar::{AvatarState, ParticipantId},
    error::WorldResult,
    inbox::InboxSender,
    minigame::{SharedPatch, SharedState},
    room::RoomCode,
};

/// Transport-level operations on one room.
pub trait WorldChannel: Send {
    fn room(&self) -> &RoomCode;

    fn participant(&self) -> &ParticipantId;

    /// Fire-and-forget presence update. The state carries its liveness stamp.
    fn publish_self(&mut self, state: &AvatarState) -> WorldResult<()>;

    /// Removes this participant's presence entry so peers evict it promptly.
    fn retract_self(&mut self) -> WorldResult<()>;

    /// Registers for full peer snapshots, the recent chat log and shared
    /// documents. Current values are delivered right away.
    fn subscribe(&mut self, inbox: InboxSender) -> WorldResult<()>;

    fn unsubscribe(&mut self);

    /// Appends to the room's ordered chat log.
    fn send_chat(&mut self, author: &str, text: &str) -> WorldResult<()>;

    /// Last shared documents this channel has seen.
    fn read_shared_state(&self) -> SharedState;

    /// Overwrites the documents named in the patch.
    fn write_shared_state(&mut self, patch: SharedPatch) -> WorldResult<()>;
}

/// Establishes channels. Failing here is a configuration error.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        room: &RoomCode,
        participant: &ParticipantId,
    ) -> WorldResult<Box<dyn WorldChannel>>;
}
