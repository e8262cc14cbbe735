//! Relay server implementation.
//!
//! A room-scoped presence relay with a tick-based main loop. It supports:
//! - Join handshake with room codes and participant ids
//! - Presence snapshots broadcast to every member each tick
//! - Ordered, bounded chat log per room
//! - Shared mini-game documents with revision-checked writes
//! - Staleness eviction and room teardown when the last member leaves
//! - Console commands (status, rooms, quit)
//!
//! Connection tasks only move frames between sockets and queues. All room
//! state is owned by the server and mutated in `step`, so there is no
//! locking on the hot path.

use std::{
    collections::{BTreeMap, HashMap},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};
use world_shared::{
    avatar::ParticipantId,
    chat::normalize_text,
    clock::{Clock, SystemClock},
    config::WorldConfig,
    net::{ConnReader, ConnWriter, NetMsg, ReliableConn, ReliableListener, PROTOCOL_VERSION},
    room::{RoomCode, RoomState},
};

/// Messages buffered per connection. A member that falls this far behind is
/// dropped.
const OUTBOUND_QUEUE: usize = 256;

/// Server-assigned id for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl ConnId {
    pub fn new_unique() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// What connection tasks report to the main loop.
#[derive(Debug)]
enum RelayEvent {
    Joined {
        conn: ConnId,
        room: RoomCode,
        participant: ParticipantId,
        peer: SocketAddr,
        outbound: mpsc::Sender<NetMsg>,
    },
    Message {
        conn: ConnId,
        msg: NetMsg,
    },
    Closed {
        conn: ConnId,
    },
}

/// A connection that completed the handshake.
struct Member {
    room: RoomCode,
    participant: ParticipantId,
    peer: SocketAddr,
    outbound: mpsc::Sender<NetMsg>,
}

impl Member {
    /// Queues without waiting. False once the member is unreachable.
    fn send(&self, msg: NetMsg) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(room = %self.room, participant = %self.participant, peer = %self.peer, "Outbound queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

struct RelayRoom {
    state: RoomState,
    members: BTreeMap<ParticipantId, ConnId>,
}

/// Presence relay.
pub struct RelayServer {
    pub cfg: WorldConfig,
    clock: Arc<dyn Clock>,
    local_addr: SocketAddr,

    events_rx: mpsc::UnboundedReceiver<RelayEvent>,
    accept_task: JoinHandle<()>,

    conns: HashMap<ConnId, Member>,
    rooms: BTreeMap<RoomCode, RelayRoom>,

    tick: u64,
    shutdown: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl RelayServer {
    /// Binds the listener at `cfg.relay_addr` and starts accepting.
    pub async fn new(cfg: WorldConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.relay_addr.parse().context("parse relay_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handshake_timeout = Duration::from_millis(cfg.relay.handshake_timeout_ms);
        let accept_task = tokio::spawn(accept_loop(listener, events_tx, handshake_timeout));

        Ok(Self {
            cfg,
            clock,
            local_addr,
            events_rx,
            accept_task,
            conns: HashMap::new(),
            rooms: BTreeMap::new(),
            tick: 0,
            shutdown: false,
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self) -> usize {
        self.conns.len()
    }

    /// Runs until `quit`.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let dt = self.tick_interval();
        let mut next = Instant::now();
        while !self.shutdown {
            next += dt;
            self.step();
            tokio::time::sleep_until(next).await;
        }
        info!("Relay shutting down");
        Ok(())
    }

    /// Runs the relay for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.tick_interval();
        let mut next = Instant::now();
        for _ in 0..ticks {
            next += dt;
            self.step();
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.cfg.relay.tick_hz.max(1) as f32)
    }

    /// Executes one tick: console, connection events, staleness, snapshots.
    pub fn step(&mut self) {
        self.process_console_commands();

        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }

        let now = self.clock.now_ms();
        let window = self.cfg.sync.staleness_ms();
        let mut dead = Vec::new();
        for (code, room) in &mut self.rooms {
            for id in room.state.evict_stale(now, window) {
                debug!(room = %code, participant = %id, "Presence went stale");
            }
            for (participant, conn) in &room.members {
                let Some(member) = self.conns.get(conn) else {
                    continue;
                };
                let peers = room.state.peers_for(participant);
                if !member.send(NetMsg::Peers { peers }) {
                    dead.push(*conn);
                }
            }
        }
        for conn in dead {
            self.remove_member(conn, "unreachable");
        }
        self.tick += 1;
    }

    fn process_console_commands(&mut self) {
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Vec::new();
        };

        match cmd {
            "status" => vec![
                format!("Listening on {}", self.local_addr),
                format!("Tick: {}", self.tick),
                format!("Rooms: {}", self.rooms.len()),
                format!("Connections: {}", self.conns.len()),
            ],
            "rooms" => {
                if self.rooms.is_empty() {
                    return vec!["No rooms".to_string()];
                }
                let mut out = Vec::new();
                for (code, room) in &self.rooms {
                    let shared = room.state.shared();
                    out.push(format!(
                        "{code}: members={} present={} chat={} counter={}",
                        room.members.len(),
                        room.state.presence_len(),
                        room.state.chat().len(),
                        shared.counter.value.value
                    ));
                    for (participant, conn) in &room.members {
                        if let Some(m) = self.conns.get(conn) {
                            out.push(format!("  {participant} {:?} {}", conn, m.peer));
                        }
                    }
                }
                out
            }
            "quit" | "exit" => {
                self.shutdown = true;
                vec!["Shutting down".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Joined {
                conn,
                room,
                participant,
                peer,
                outbound,
            } => self.on_joined(conn, room, participant, peer, outbound),
            RelayEvent::Message { conn, msg } => self.on_message(conn, msg),
            RelayEvent::Closed { conn } => self.remove_member(conn, "connection closed"),
        }
    }

    fn on_joined(
        &mut self,
        conn: ConnId,
        code: RoomCode,
        participant: ParticipantId,
        peer: SocketAddr,
        outbound: mpsc::Sender<NetMsg>,
    ) {
        let capacity = self.cfg.relay.max_room_participants;
        let chat_history = self.cfg.sync.chat_history;
        let room = self
            .rooms
            .entry(code.clone())
            .or_insert_with(|| RelayRoom {
                state: RoomState::new(chat_history),
                members: BTreeMap::new(),
            });

        let replaced = room.members.get(&participant).copied();
        if replaced.is_none() && room.members.len() >= capacity {
            warn!(room = %code, participant = %participant, "Room full, rejecting");
            let _ = outbound.try_send(NetMsg::Reject {
                reason: format!("room {code} is full"),
            });
            if room.members.is_empty() {
                self.rooms.remove(&code);
            }
            return;
        }

        if let Some(old) = replaced {
            if let Some(m) = self.conns.remove(&old) {
                info!(room = %code, participant = %participant, "Participant rejoined, dropping old connection");
                m.send(NetMsg::Disconnect {
                    reason: "replaced by a newer connection".to_string(),
                });
            }
        }
        room.members.insert(participant.clone(), conn);

        let member = Member {
            room: code.clone(),
            participant: participant.clone(),
            peer,
            outbound,
        };
        member.send(NetMsg::Welcome {
            server_time_ms: self.clock.now_ms(),
        });
        member.send(NetMsg::Shared(room.state.shared().clone()));
        member.send(NetMsg::ChatLog(room.state.chat()));
        member.send(NetMsg::Peers {
            peers: room.state.peers_for(&participant),
        });
        self.conns.insert(conn, member);

        info!(room = %code, participant = %participant, %peer, members = room.members.len(), "Participant joined");
    }

    fn on_message(&mut self, conn: ConnId, msg: NetMsg) {
        let Some(member) = self.conns.get(&conn) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&member.room) else {
            return;
        };
        let now = self.clock.now_ms();
        let mut dead = Vec::new();

        match msg {
            NetMsg::Publish(state) => room.state.publish(&member.participant, state, now),
            NetMsg::Retract => {
                room.state.retract(&member.participant);
            }
            NetMsg::Chat { author, text } => {
                let Some(text) = normalize_text(&text) else {
                    return;
                };
                if room.state.append_chat(&author, &text, now).is_some() {
                    let log = room.state.chat();
                    broadcast(&self.conns, room, || NetMsg::ChatLog(log.clone()), &mut dead);
                }
            }
            NetMsg::WriteShared(patch) => {
                let outcome = room.state.write_shared(patch);
                for conflict in &outcome.conflicts {
                    debug!(room = %member.room, participant = %member.participant, ?conflict, "Write conflict");
                    if !member.send(NetMsg::WriteConflict(*conflict)) {
                        dead.push(conn);
                        break;
                    }
                }
                if outcome.changed() {
                    let shared = room.state.shared().clone();
                    broadcast(&self.conns, room, || NetMsg::Shared(shared.clone()), &mut dead);
                }
            }
            NetMsg::Leave => self.remove_member(conn, "left"),
            other => debug!(?conn, ?other, "Unexpected message from client"),
        }
        for conn in dead {
            self.remove_member(conn, "unreachable");
        }
    }

    fn remove_member(&mut self, conn: ConnId, why: &str) {
        let Some(member) = self.conns.remove(&conn) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&member.room) else {
            return;
        };
        if room.members.get(&member.participant) == Some(&conn) {
            room.members.remove(&member.participant);
            room.state.retract(&member.participant);
        }
        info!(room = %member.room, participant = %member.participant, reason = why, "Participant left");
        if room.members.is_empty() {
            self.rooms.remove(&member.room);
            info!(room = %member.room, "Room vacated");
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

fn broadcast(
    conns: &HashMap<ConnId, Member>,
    room: &RelayRoom,
    msg: impl Fn() -> NetMsg,
    dead: &mut Vec<ConnId>,
) {
    for conn in room.members.values() {
        if let Some(m) = conns.get(conn) {
            if !m.send(msg()) {
                dead.push(*conn);
            }
        }
    }
}

async fn accept_loop(
    listener: ReliableListener,
    events: mpsc::UnboundedSender<RelayEvent>,
    handshake_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((conn, peer)) => {
                debug!(%peer, "Accepted connection");
                tokio::spawn(serve_connection(conn, peer, events.clone(), handshake_timeout));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        if events.is_closed() {
            break;
        }
    }
}

async fn serve_connection(
    mut conn: ReliableConn,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<RelayEvent>,
    handshake_timeout: Duration,
) {
    let (room, participant) = match tokio::time::timeout(handshake_timeout, conn.recv()).await {
        Ok(Ok(NetMsg::Hello {
            protocol,
            room,
            participant,
        })) if protocol == PROTOCOL_VERSION => (room, participant),
        Ok(Ok(NetMsg::Hello { protocol, .. })) => {
            warn!(%peer, protocol, "Unsupported protocol version");
            reject(&mut conn, format!("protocol {protocol} not supported")).await;
            return;
        }
        Ok(Ok(other)) => {
            warn!(%peer, ?other, "Expected Hello");
            reject(&mut conn, "expected Hello".to_string()).await;
            return;
        }
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "Bad handshake");
            reject(&mut conn, format!("bad handshake: {e:#}")).await;
            return;
        }
        Err(_) => {
            warn!(%peer, "Handshake timed out");
            return;
        }
    };

    let id = ConnId::new_unique();
    let (mut reader, writer) = conn.into_split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    tokio::spawn(write_loop(writer, rx));

    let joined = RelayEvent::Joined {
        conn: id,
        room,
        participant,
        peer,
        outbound: tx,
    };
    if events.send(joined).is_err() {
        return;
    }

    read_loop(id, &mut reader, &events).await;
    let _ = events.send(RelayEvent::Closed { conn: id });
}

async fn reject(conn: &mut ReliableConn, reason: String) {
    let _ = conn.send(&NetMsg::Reject { reason }).await;
}

async fn read_loop(id: ConnId, reader: &mut ConnReader, events: &mpsc::UnboundedSender<RelayEvent>) {
    loop {
        tokio::select! {
            r = reader.recv() => match r {
                Ok(msg) => {
                    let leaving = matches!(msg, NetMsg::Leave);
                    if events.send(RelayEvent::Message { conn: id, msg }).is_err() || leaving {
                        return;
                    }
                }
                Err(e) => {
                    debug!(conn = ?id, error = %e, "Connection read ended");
                    return;
                }
            },
            _ = events.closed() => return,
        }
    }
}

async fn write_loop(mut writer: ConnWriter, mut rx: mpsc::Receiver<NetMsg>) {
    while let Some(msg) = rx.recv().await {
        let last = matches!(msg, NetMsg::Reject { .. } | NetMsg::Disconnect { .. });
        if let Err(e) = writer.send(&msg).await {
            debug!(error = %e, "Connection write failed");
            break;
        }
        if last {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(RelayServer, WorldConfig)> {
    let mut cfg = WorldConfig {
        relay_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ..WorldConfig::default()
    };
    cfg.relay.tick_hz = tick_hz;

    let server = RelayServer::new(cfg.clone(), Arc::new(SystemClock)).await?;
    cfg.relay_addr = server.local_addr().to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use world_shared::{
        avatar::{AvatarState, CharacterSkin},
        clock::ManualClock,
        math::Vec3,
        minigame::{CounterState, SharedPatch, WritePolicy},
    };

    struct Fake {
        conn: ConnId,
        rx: mpsc::Receiver<NetMsg>,
    }

    impl Fake {
        fn drain(&mut self) -> Vec<NetMsg> {
            let mut out = Vec::new();
            while let Ok(m) = self.rx.try_recv() {
                out.push(m);
            }
            out
        }
    }

    async fn server(clock: &ManualClock) -> RelayServer {
        let cfg = WorldConfig {
            relay_addr: "127.0.0.1:0".to_string(),
            ..WorldConfig::default()
        };
        RelayServer::new(cfg, Arc::new(clock.clone())).await.unwrap()
    }

    fn join(server: &mut RelayServer, room: &str, who: &str) -> Fake {
        join_with_queue(server, room, who, OUTBOUND_QUEUE)
    }

    fn join_with_queue(server: &mut RelayServer, room: &str, who: &str, queue: usize) -> Fake {
        let (tx, rx) = mpsc::channel(queue);
        let conn = ConnId::new_unique();
        server.handle_event(RelayEvent::Joined {
            conn,
            room: RoomCode::parse(room).unwrap(),
            participant: who.into(),
            peer: "127.0.0.1:1".parse().unwrap(),
            outbound: tx,
        });
        Fake { conn, rx }
    }

    fn send(server: &mut RelayServer, fake: &Fake, msg: NetMsg) {
        server.handle_event(RelayEvent::Message {
            conn: fake.conn,
            msg,
        });
    }

    #[tokio::test]
    async fn join_gets_welcome_then_room_contents() {
        let clock = ManualClock::new(5_000);
        let mut s = server(&clock).await;
        let mut a = join(&mut s, "garden", "a");
        let msgs = a.drain();
        assert_eq!(msgs[0], NetMsg::Welcome { server_time_ms: 5_000 });
        assert!(matches!(msgs[1], NetMsg::Shared(_)));
        assert!(matches!(msgs[2], NetMsg::ChatLog(ref log) if log.is_empty()));
        assert!(matches!(msgs[3], NetMsg::Peers { ref peers } if peers.is_empty()));
    }

    #[tokio::test]
    async fn peers_exclude_self_and_carry_relay_liveness() {
        let clock = ManualClock::new(1_000);
        let mut s = server(&clock).await;
        let mut a = join(&mut s, "garden", "a");
        let mut b = join(&mut s, "garden", "b");
        send(
            &mut s,
            &a,
            NetMsg::Publish(AvatarState::new(CharacterSkin::Azure, Vec3::new(1.0, 0.0, 2.0), 0.5)),
        );
        clock.advance(100);
        s.step();

        let last_peers = |msgs: Vec<NetMsg>| {
            msgs.into_iter().rev().find_map(|m| match m {
                NetMsg::Peers { peers } => Some(peers),
                _ => None,
            })
        };
        let seen_by_b = last_peers(b.drain()).unwrap();
        let entry = &seen_by_b[&ParticipantId::from("a")];
        assert_eq!(entry.position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(entry.liveness_ms, 1_000);
        assert!(last_peers(a.drain()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_is_trimmed_and_broadcast_in_order() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let mut a = join(&mut s, "garden", "a");
        let mut b = join(&mut s, "garden", "b");
        a.drain();
        b.drain();
        for text in ["  one ", "   ", "two"] {
            send(
                &mut s,
                &a,
                NetMsg::Chat {
                    author: "Azure".into(),
                    text: text.into(),
                },
            );
        }
        let logs: Vec<_> = b
            .drain()
            .into_iter()
            .filter_map(|m| match m {
                NetMsg::ChatLog(log) => Some(log),
                _ => None,
            })
            .collect();
        assert_eq!(logs.len(), 2);
        let texts: Vec<_> = logs[1].iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[tokio::test]
    async fn stale_write_is_refused_to_the_writer_only() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let mut a = join(&mut s, "garden", "a");
        let mut b = join(&mut s, "garden", "b");
        let inc = |rev| SharedPatch {
            counter: Some(WritePolicy::CompareAndSwap.write(CounterState { value: 1 }, rev)),
            ..SharedPatch::default()
        };
        send(&mut s, &a, NetMsg::WriteShared(inc(0)));
        a.drain();
        b.drain();
        send(&mut s, &b, NetMsg::WriteShared(inc(0)));
        assert!(b.drain().iter().any(|m| matches!(m, NetMsg::WriteConflict(_))));
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn last_member_leaving_resets_room() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let a = join(&mut s, "garden", "a");
        send(
            &mut s,
            &a,
            NetMsg::WriteShared(SharedPatch {
                counter: Some(WritePolicy::LastWriterWins.write(CounterState { value: 7 }, 0)),
                ..SharedPatch::default()
            }),
        );
        send(&mut s, &a, NetMsg::Leave);
        assert_eq!(s.room_count(), 0);

        let mut a2 = join(&mut s, "garden", "a");
        let shared = a2.drain().into_iter().find_map(|m| match m {
            NetMsg::Shared(shared) => Some(shared),
            _ => None,
        });
        assert_eq!(shared.unwrap().counter.value.value, 0);
    }

    #[tokio::test]
    async fn same_participant_rejoining_replaces_old_connection() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let mut old = join(&mut s, "garden", "a");
        old.drain();
        let _new = join(&mut s, "garden", "a");
        assert!(old
            .drain()
            .iter()
            .any(|m| matches!(m, NetMsg::Disconnect { .. })));
        assert_eq!(s.member_count(), 1);
        // The old connection closing must not evict the new one.
        s.handle_event(RelayEvent::Closed { conn: old.conn });
        assert_eq!(s.member_count(), 1);
        assert_eq!(s.room_count(), 1);
    }

    #[tokio::test]
    async fn full_room_rejects() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        s.cfg.relay.max_room_participants = 1;
        let _a = join(&mut s, "garden", "a");
        let mut b = join(&mut s, "garden", "b");
        assert!(matches!(b.drain().as_slice(), [NetMsg::Reject { .. }]));
    }

    #[tokio::test]
    async fn silent_presence_is_evicted() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let a = join(&mut s, "garden", "a");
        let mut b = join(&mut s, "garden", "b");
        send(
            &mut s,
            &a,
            NetMsg::Publish(AvatarState::new(CharacterSkin::Azure, Vec3::ZERO, 0.0)),
        );
        clock.advance(60_001);
        s.step();
        let peers = b.drain().into_iter().rev().find_map(|m| match m {
            NetMsg::Peers { peers } => Some(peers),
            _ => None,
        });
        assert!(peers.unwrap().is_empty());
    }

    #[tokio::test]
    async fn member_that_stops_reading_is_dropped() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        let mut a = join(&mut s, "garden", "a");
        // Room contents on join fill four slots; the next snapshot does not fit.
        let _stuck = join_with_queue(&mut s, "garden", "b", 4);
        assert_eq!(s.member_count(), 2);

        for _ in 0..3 {
            s.step();
            a.drain();
        }
        assert_eq!(s.member_count(), 1);
        assert_eq!(s.room_count(), 1);

        send(
            &mut s,
            &a,
            NetMsg::Chat {
                author: "a".into(),
                text: "still here".into(),
            },
        );
        assert!(a
            .drain()
            .iter()
            .any(|m| matches!(m, NetMsg::ChatLog(log) if log.len() == 1)));
    }

    #[tokio::test]
    async fn console_quit_sets_shutdown() {
        let clock = ManualClock::new(0);
        let mut s = server(&clock).await;
        assert_eq!(s.exec_console("rooms"), vec!["No rooms".to_string()]);
        s.exec_console("quit");
        assert!(s.is_shutting_down());
    }
}
