//! In-process channel backend.
//!
//! `LoopbackHub` plays the document-store role inside one process: every
//! write is applied immediately and pushed to all subscribers of the room as
//! a full snapshot. Used for offline play and tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    avatar::{AvatarState, ParticipantId},
    channel::{ChannelConnector, WorldChannel},
    chat::DEFAULT_CHAT_HISTORY,
    clock::{Clock, SystemClock},
    error::{WorldError, WorldResult},
    inbox::{ChannelEvent, InboxSender, PeerSnapshot},
    minigame::{SharedPatch, SharedState},
    room::{RoomCode, RoomState},
};

struct LoopbackRoom {
    state: RoomState,
    members: HashMap<ParticipantId, usize>,
    subscribers: HashMap<ParticipantId, InboxSender>,
}

impl LoopbackRoom {
    fn new(chat_history: usize) -> Self {
        LoopbackRoom {
            state: RoomState::new(chat_history),
            members: HashMap::new(),
            subscribers: HashMap::new(),
        }
    }

    fn push_peers(&mut self, now_ms: i64) {
        let state = &self.state;
        self.subscribers.retain(|id, inbox| {
            inbox.push(ChannelEvent::Peers(PeerSnapshot {
                peers: state.peers_for(id),
                received_at_ms: now_ms,
            }))
        });
    }

    fn push_all(&mut self, event: ChannelEvent) {
        self.subscribers.retain(|_, inbox| inbox.push(event.clone()));
    }
}

#[derive(Default)]
struct HubInner {
    rooms: HashMap<RoomCode, LoopbackRoom>,
}

/// Shared in-process backend. Clones refer to the same hub.
#[derive(Clone)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
    clock: Arc<dyn Clock>,
    chat_history: usize,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_CHAT_HISTORY)
    }
}

impl LoopbackHub {
    pub fn new(clock: Arc<dyn Clock>, chat_history: usize) -> Self {
        LoopbackHub {
            inner: Arc::new(Mutex::new(HubInner::default())),
            clock,
            chat_history,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    /// Opens a channel without going through the async connector.
    pub fn open(&self, room: &RoomCode, participant: &ParticipantId) -> LoopbackChannel {
        let mut inner = self.lock();
        let chat_history = self.chat_history;
        let entry = inner
            .rooms
            .entry(room.clone())
            .or_insert_with(|| LoopbackRoom::new(chat_history));
        *entry.members.entry(participant.clone()).or_insert(0) += 1;
        info!(room = %room, participant = %participant, "Loopback channel opened");
        LoopbackChannel {
            hub: self.clone(),
            room: room.clone(),
            participant: participant.clone(),
            closed: false,
        }
    }

    fn with_room<R>(&self, room: &RoomCode, f: impl FnOnce(&mut LoopbackRoom, i64) -> R) -> WorldResult<R> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let entry = inner
            .rooms
            .get_mut(room)
            .ok_or_else(|| WorldError::transport(format!("room {room} is gone")))?;
        Ok(f(entry, now))
    }

    fn close(&self, room: &RoomCode, participant: &ParticipantId) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let Some(entry) = inner.rooms.get_mut(room) else {
            return;
        };
        let remaining = match entry.members.get_mut(participant) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            entry.members.remove(participant);
            entry.subscribers.remove(participant);
            if entry.state.retract(participant) {
                entry.push_peers(now);
            }
        }
        if entry.members.is_empty() {
            inner.rooms.remove(room);
            info!(room = %room, "Loopback room vacated");
        }
    }
}

#[async_trait]
impl ChannelConnector for LoopbackHub {
    async fn connect(
        &self,
        room: &RoomCode,
        participant: &ParticipantId,
    ) -> WorldResult<Box<dyn WorldChannel>> {
        Ok(Box::new(self.open(room, participant)))
    }
}

/// One participant's handle on a loopback room.
pub struct LoopbackChannel {
    hub: LoopbackHub,
    room: RoomCode,
    participant: ParticipantId,
    closed: bool,
}

impl WorldChannel for LoopbackChannel {
    fn room(&self) -> &RoomCode {
        &self.room
    }

    fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    fn publish_self(&mut self, state: &AvatarState) -> WorldResult<()> {
        let id = self.participant.clone();
        self.hub.with_room(&self.room, |room, now| {
            room.state.publish(&id, state.clone(), now);
            room.push_peers(now);
        })
    }

    fn retract_self(&mut self) -> WorldResult<()> {
        let id = self.participant.clone();
        self.hub.with_room(&self.room, |room, now| {
            if room.state.retract(&id) {
                room.push_peers(now);
            }
        })
    }

    fn subscribe(&mut self, inbox: InboxSender) -> WorldResult<()> {
        let id = self.participant.clone();
        self.hub.with_room(&self.room, |room, now| {
            inbox.push(ChannelEvent::Peers(PeerSnapshot {
                peers: room.state.peers_for(&id),
                received_at_ms: now,
            }));
            inbox.push(ChannelEvent::Chat(room.state.chat()));
            inbox.push(ChannelEvent::Shared(room.state.shared().clone()));
            room.subscribers.insert(id, inbox);
        })
    }

    fn unsubscribe(&mut self) {
        let id = self.participant.clone();
        let _ = self.hub.with_room(&self.room, |room, _| {
            room.subscribers.remove(&id);
        });
    }

    fn send_chat(&mut self, author: &str, text: &str) -> WorldResult<()> {
        self.hub.with_room(&self.room, |room, now| {
            if room.state.append_chat(author, text, now).is_some() {
                let log = room.state.chat();
                room.push_all(ChannelEvent::Chat(log));
            }
        })
    }

    fn read_shared_state(&self) -> SharedState {
        self.hub
            .with_room(&self.room, |room, _| room.state.shared().clone())
            .unwrap_or_default()
    }

    fn write_shared_state(&mut self, patch: SharedPatch) -> WorldResult<()> {
        let id = self.participant.clone();
        self.hub.with_room(&self.room, |room, _| {
            let outcome = room.state.write_shared(patch);
            for conflict in &outcome.conflicts {
                debug!(participant = %id, ?conflict, "Shared write rejected");
                if let Some(inbox) = room.subscribers.get(&id) {
                    inbox.push(ChannelEvent::WriteConflict(*conflict));
                }
            }
            if outcome.changed() {
                let shared = room.state.shared().clone();
                room.push_all(ChannelEvent::Shared(shared));
            }
        })
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.close(&self.room, &self.participant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        avatar::CharacterSkin,
        clock::ManualClock,
        inbox::inbox,
        math::Vec3,
        minigame::{CounterState, WritePolicy},
    };

    fn hub(clock: &ManualClock) -> LoopbackHub {
        LoopbackHub::new(Arc::new(clock.clone()), 50)
    }

    fn latest_peers(events: Vec<ChannelEvent>) -> Option<PeerSnapshot> {
        events.into_iter().rev().find_map(|e| match e {
            ChannelEvent::Peers(p) => Some(p),
            _ => None,
        })
    }

    #[test]
    fn publish_round_trips_through_subscription() {
        let clock = ManualClock::new(5_000);
        let hub = hub(&clock);
        let room = RoomCode::parse("park").unwrap();
        let me = ParticipantId::from("me");
        let you = ParticipantId::from("you");

        let mut mine = hub.open(&room, &me);
        let mut yours = hub.open(&room, &you);
        let (tx, mut rx) = inbox();
        yours.subscribe(tx).unwrap();

        let published = AvatarState::new(CharacterSkin::Azure, Vec3::new(1.0, 0.0, 2.0), 0.5);
        mine.publish_self(&published).unwrap();

        let snap = latest_peers(rx.drain()).unwrap();
        let seen = &snap.peers[&me];
        assert!(seen.same_pose_as(&published));
        assert_eq!(seen.position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(seen.rot, 0.5);
        assert_eq!(seen.liveness_ms, 5_000);
        assert!(!snap.peers.contains_key(&you));
    }

    #[test]
    fn rooms_are_isolated() {
        let clock = ManualClock::new(0);
        let hub = hub(&clock);
        let a = RoomCode::parse("a").unwrap();
        let b = RoomCode::parse("b").unwrap();
        let mut in_a = hub.open(&a, &"p1".into());
        let mut in_b = hub.open(&b, &"p2".into());
        let (tx, mut rx) = inbox();
        in_b.subscribe(tx).unwrap();
        rx.drain();
        in_a.publish_self(&AvatarState::new(CharacterSkin::Coral, Vec3::ZERO, 0.0))
            .unwrap();
        in_a.send_chat("Coral", "hello").unwrap();
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn retract_and_drop_evict_presence() {
        let clock = ManualClock::new(0);
        let hub = hub(&clock);
        let room = RoomCode::parse("r").unwrap();
        let mut watcher = hub.open(&room, &"w".into());
        let (tx, mut rx) = inbox();
        watcher.subscribe(tx).unwrap();

        let mut leaver = hub.open(&room, &"l".into());
        leaver
            .publish_self(&AvatarState::new(CharacterSkin::Azure, Vec3::ZERO, 0.0))
            .unwrap();
        assert_eq!(latest_peers(rx.drain()).unwrap().peers.len(), 1);

        drop(leaver);
        assert!(latest_peers(rx.drain()).unwrap().peers.is_empty());
    }

    #[test]
    fn vacated_room_resets_counter() {
        let clock = ManualClock::new(0);
        let hub = hub(&clock);
        let room = RoomCode::parse("kitchen").unwrap();
        let mut ch = hub.open(&room, &"cook".into());
        ch.write_shared_state(SharedPatch {
            counter: Some(WritePolicy::LastWriterWins.write(CounterState { value: 3 }, 0)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ch.read_shared_state().counter.value.value, 3);
        drop(ch);
        assert_eq!(hub.room_count(), 0);

        let ch = hub.open(&room, &"cook".into());
        assert_eq!(ch.read_shared_state().counter.value.value, 0);
    }

    #[test]
    fn conflicting_write_is_reported_to_writer() {
        let clock = ManualClock::new(0);
        let hub = hub(&clock);
        let room = RoomCode::parse("r").unwrap();
        let mut ch = hub.open(&room, &"p".into());
        let (tx, mut rx) = inbox();
        ch.subscribe(tx).unwrap();
        rx.drain();

        let policy = WritePolicy::CompareAndSwap;
        for _ in 0..2 {
            ch.write_shared_state(SharedPatch {
                counter: Some(policy.write(CounterState { value: 1 }, 0)),
                ..Default::default()
            })
            .unwrap();
        }
        let events = rx.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, ChannelEvent::WriteConflict(c) if c.current_revision == 1)));
    }
}
