//! Inbox for channel events.
//!
//! Network tasks push events as they arrive; the frame loop drains them at
//! one fixed point per frame, so simulation state has a single writer.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::{
    avatar::{AvatarState, ParticipantId},
    chat::ChatMessage,
    clock::Millis,
    minigame::{SharedState, WriteConflict},
};

/// A full replacement view of every other participant in the room.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeerSnapshot {
    pub peers: BTreeMap<ParticipantId, AvatarState>,
    /// Local receipt time.
    pub received_at_ms: Millis,
}

impl PeerSnapshot {
    pub fn empty(received_at_ms: Millis) -> Self {
        PeerSnapshot {
            peers: BTreeMap::new(),
            received_at_ms,
        }
    }
}

/// Something a channel delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Peers(PeerSnapshot),
    /// Most recent messages, oldest first.
    Chat(Vec<ChatMessage>),
    Shared(SharedState),
    WriteConflict(WriteConflict),
    /// Subscription broke; peers should be treated as empty.
    LinkLost { reason: String },
}

/// Producer half, held by channel tasks.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl InboxSender {
    /// Pushes an event. Returns false once the inbox is gone.
    pub fn push(&self, event: ChannelEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the frame loop.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Inbox {
    /// Drains everything queued so far, in arrival order.
    pub fn drain(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Creates a connected inbox pair.
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}
