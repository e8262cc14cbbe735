//! Relay-backed world channel.
//!
//! One TCP stream per participant. Joining is the only awaited step; after
//! that a writer task drains an outbound queue and a reader task pushes
//! everything the relay sends into the subscriber's inbox. Channel methods
//! never block the frame loop.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use world_shared::{
    avatar::{AvatarState, ParticipantId},
    channel::{ChannelConnector, WorldChannel},
    chat::ChatMessage,
    clock::{Clock, Millis},
    error::{WorldError, WorldResult},
    inbox::{ChannelEvent, InboxSender, PeerSnapshot},
    minigame::{SharedPatch, SharedState},
    net::{ConnReader, ConnWriter, NetMsg, ReliableConn, PROTOCOL_VERSION},
    room::RoomCode,
};

/// Messages queued for the writer task before sends start failing.
const OUTBOUND_QUEUE: usize = 64;

/// Connects to a relay at a fixed address.
pub struct RelayConnector {
    addr: String,
    handshake_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RelayConnector {
    pub fn new(addr: impl Into<String>, handshake_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            addr: addr.into(),
            handshake_timeout,
            clock,
        }
    }
}

#[async_trait]
impl ChannelConnector for RelayConnector {
    async fn connect(
        &self,
        room: &RoomCode,
        participant: &ParticipantId,
    ) -> WorldResult<Box<dyn WorldChannel>> {
        let channel = RelayChannel::connect(
            &self.addr,
            room,
            participant,
            self.handshake_timeout,
            self.clock.clone(),
        )
        .await?;
        Ok(Box::new(channel))
    }
}

/// What the reader task has seen, shared with the channel handle.
#[derive(Default)]
struct RelayCache {
    inbox: Option<InboxSender>,
    shared: SharedState,
    chat: Vec<ChatMessage>,
    lost: Option<String>,
}

impl RelayCache {
    fn push(&mut self, event: ChannelEvent) {
        if let Some(inbox) = &self.inbox {
            if !inbox.push(event) {
                self.inbox = None;
            }
        }
    }
}

fn lock(cache: &Mutex<RelayCache>) -> MutexGuard<'_, RelayCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RelayChannel {
    room: RoomCode,
    participant: ParticipantId,
    outbound: mpsc::Sender<NetMsg>,
    cache: Arc<Mutex<RelayCache>>,
    reader: JoinHandle<()>,
}

impl RelayChannel {
    /// Connects and performs the join handshake. Any failure here is a
    /// configuration error.
    pub async fn connect(
        addr: &str,
        room: &RoomCode,
        participant: &ParticipantId,
        handshake_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> WorldResult<Self> {
        info!(relay = %addr, room = %room, participant = %participant, "Joining room");

        let handshake = async {
            let mut conn = ReliableConn::connect(addr).await?;
            conn.send(&NetMsg::Hello {
                protocol: PROTOCOL_VERSION,
                room: room.clone(),
                participant: participant.clone(),
            })
            .await?;
            match conn.recv().await.context("await welcome")? {
                NetMsg::Welcome { server_time_ms } => Ok::<_, anyhow::Error>((conn, server_time_ms)),
                NetMsg::Reject { reason } => anyhow::bail!("relay rejected join: {reason}"),
                other => anyhow::bail!("expected Welcome, got {other:?}"),
            }
        };

        let (conn, server_time_ms) = tokio::time::timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| WorldError::configuration(format!("relay {addr} did not answer")))?
            .map_err(|e| WorldError::configuration(format!("{e:#}")))?;

        let skew = clock.now_ms() - server_time_ms;
        debug!(skew_ms = skew, "Relay clock offset");

        let (reader, writer) = conn.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let cache = Arc::new(Mutex::new(RelayCache::default()));

        tokio::spawn(write_loop(writer, rx));
        let reader = tokio::spawn(read_loop(reader, cache.clone(), clock, skew));

        info!(room = %room, "Joined room");
        Ok(Self {
            room: room.clone(),
            participant: participant.clone(),
            outbound: tx,
            cache,
            reader,
        })
    }

    /// Whether the link to the relay is gone.
    pub fn is_lost(&self) -> bool {
        lock(&self.cache).lost.is_some()
    }

    fn send(&self, msg: NetMsg) -> WorldResult<()> {
        if let Some(reason) = &lock(&self.cache).lost {
            return Err(WorldError::transport(format!("link lost: {reason}")));
        }
        enqueue(&self.outbound, msg)
    }
}

/// Queues without waiting. A full queue means the relay stopped reading.
fn enqueue(outbound: &mpsc::Sender<NetMsg>, msg: NetMsg) -> WorldResult<()> {
    outbound.try_send(msg).map_err(|e| match e {
        TrySendError::Full(_) => WorldError::transport("relay send queue full"),
        TrySendError::Closed(_) => WorldError::transport("relay writer closed"),
    })
}

/// Shifts relay liveness stamps onto the local clock so ages compare against
/// local receipt times.
fn to_local_time(
    mut peers: BTreeMap<ParticipantId, AvatarState>,
    skew_ms: Millis,
) -> BTreeMap<ParticipantId, AvatarState> {
    for state in peers.values_mut() {
        state.liveness_ms += skew_ms;
    }
    peers
}

async fn write_loop(mut writer: ConnWriter, mut rx: mpsc::Receiver<NetMsg>) {
    while let Some(msg) = rx.recv().await {
        let leaving = matches!(msg, NetMsg::Leave);
        if let Err(e) = writer.send(&msg).await {
            warn!(error = %e, "Relay write failed");
            break;
        }
        if leaving {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: ConnReader,
    cache: Arc<Mutex<RelayCache>>,
    clock: Arc<dyn Clock>,
    skew_ms: Millis,
) {
    let reason = loop {
        let msg = match reader.recv().await {
            Ok(msg) => msg,
            Err(e) => break format!("{e:#}"),
        };
        let mut c = lock(&cache);
        match msg {
            NetMsg::Peers { peers } => c.push(ChannelEvent::Peers(PeerSnapshot {
                peers: to_local_time(peers, skew_ms),
                received_at_ms: clock.now_ms(),
            })),
            NetMsg::ChatLog(log) => {
                c.chat = log.clone();
                c.push(ChannelEvent::Chat(log));
            }
            NetMsg::Shared(shared) => {
                c.shared = shared.clone();
                c.push(ChannelEvent::Shared(shared));
            }
            NetMsg::WriteConflict(conflict) => c.push(ChannelEvent::WriteConflict(conflict)),
            NetMsg::Disconnect { reason } => break reason,
            other => debug!(?other, "Unexpected relay message"),
        }
    };
    warn!(reason = %reason, "Relay link lost");
    let mut c = lock(&cache);
    c.lost = Some(reason.clone());
    c.push(ChannelEvent::LinkLost { reason });
}

impl WorldChannel for RelayChannel {
    fn room(&self) -> &RoomCode {
        &self.room
    }

    fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    fn publish_self(&mut self, state: &AvatarState) -> WorldResult<()> {
        self.send(NetMsg::Publish(state.clone()))
    }

    fn retract_self(&mut self) -> WorldResult<()> {
        self.send(NetMsg::Retract)
    }

    fn subscribe(&mut self, inbox: InboxSender) -> WorldResult<()> {
        let mut c = lock(&self.cache);
        if let Some(reason) = &c.lost {
            return Err(WorldError::transport(format!("link lost: {reason}")));
        }
        inbox.push(ChannelEvent::Chat(c.chat.clone()));
        inbox.push(ChannelEvent::Shared(c.shared.clone()));
        c.inbox = Some(inbox);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        lock(&self.cache).inbox = None;
    }

    fn send_chat(&mut self, author: &str, text: &str) -> WorldResult<()> {
        self.send(NetMsg::Chat {
            author: author.to_string(),
            text: text.to_string(),
        })
    }

    fn read_shared_state(&self) -> SharedState {
        lock(&self.cache).shared.clone()
    }

    fn write_shared_state(&mut self, patch: SharedPatch) -> WorldResult<()> {
        self.send(NetMsg::WriteShared(patch))
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        let _ = self.outbound.try_send(NetMsg::Leave);
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use world_shared::{avatar::CharacterSkin, math::Vec3};

    #[test]
    fn relay_stamps_are_moved_onto_the_local_clock() {
        let id = ParticipantId::from("peer");
        let mut state = AvatarState::new(CharacterSkin::Coral, Vec3::ZERO, 0.0);
        state.liveness_ms = 1_000_000;
        let peers = BTreeMap::from([(id.clone(), state)]);

        // Local clock runs 61 s ahead of the relay.
        let local = to_local_time(peers, 61_000);
        assert_eq!(local[&id].liveness_ms, 1_061_000);
        assert_eq!(local[&id].age_ms(1_061_050), 50);
    }

    #[test]
    fn full_queue_fails_the_send_instead_of_growing() {
        let (tx, mut rx) = mpsc::channel(2);
        enqueue(&tx, NetMsg::Retract).unwrap();
        enqueue(&tx, NetMsg::Retract).unwrap();

        let err = enqueue(&tx, NetMsg::Leave).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("queue full"));

        rx.try_recv().unwrap();
        enqueue(&tx, NetMsg::Leave).unwrap();
        drop(rx);
        assert!(enqueue(&tx, NetMsg::Leave).unwrap_err().to_string().contains("closed"));
    }
}
