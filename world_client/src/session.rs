//! World session: the simulation context for one participant in one room.
//!
//! Everything the frame loop touches lives here and is advanced by `step`:
//! - drain the inbox (peer snapshots, chat, shared documents, link loss)
//! - local motion, local animation, proximity triggers
//! - throttled publish of the local avatar
//! - remote reconciliation and staleness eviction
//!
//! Network tasks never touch this struct; they only push into the inbox.

use std::sync::Arc;

use tracing::{debug, info, warn};
use world_shared::{
    avatar::{ActionKind, ActionPulse, AvatarState, CharacterSkin, Emote, EmoteKind, ParticipantId},
    channel::{ChannelConnector, WorldChannel},
    chat::{ChatMessage, ChatView},
    clock::{Clock, Millis},
    config::WorldConfig,
    error::{WorldError, WorldResult},
    inbox::{inbox, ChannelEvent, Inbox},
    math::Vec3,
    minigame::SharedState,
    room::RoomCode,
};

use crate::{
    adapter::{AdapterStats, ChannelAdapter},
    animation::{AnimationInput, AnimationState, Animator, Pose},
    games::MiniGames,
    input::{BoardAction, Command, InputState},
    motion::{MotionFrame, MotionSimulator, TeleportRequest},
    proximity::{ProximityEvaluator, ProximitySignals, CLIMB_PLATFORM},
    reconcile::{PeerEvent, Reconciler, RemoteAvatarEntry},
};

/// Where new arrivals appear.
pub const SPAWN_POINT: Vec3 = Vec3::new(0.0, 0.0, 15.0);

/// Session connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Subscribed and publishing.
    Joined,
    /// The subscription broke; peers are shown as empty until re-joined.
    LinkLost { reason: String },
    /// Left the room.
    Left,
}

/// What happened during one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub motion: MotionFrame,
    pub animation: Option<AnimationState>,
    pub signals: ProximitySignals,
    pub peer_events: Vec<PeerEvent>,
    pub published: bool,
    pub chat_updated: bool,
    pub shared_updated: bool,
}

pub struct WorldSession {
    cfg: WorldConfig,
    author: String,
    skin: CharacterSkin,
    clock: Arc<dyn Clock>,
    state: SessionState,

    adapter: ChannelAdapter,
    inbox: Inbox,

    input: InputState,
    motion: MotionSimulator,
    last_frame: MotionFrame,
    animator: Animator,
    proximity: ProximityEvaluator,
    signals: ProximitySignals,
    reconciler: Reconciler,

    chat: ChatView,
    shared: SharedState,
    games: MiniGames,
    conflicts: u64,

    emote: Option<Emote>,
    pulse: Option<ActionPulse>,
    next_teleport_id: u64,
    pending_teleport: Option<TeleportRequest>,
    publish_asap: bool,
    elapsed_s: f32,
    joined_at_ms: Millis,
}

impl WorldSession {
    /// Connects through `connector` and joins the configured room.
    pub async fn join(
        cfg: &WorldConfig,
        connector: &dyn ChannelConnector,
        participant: &ParticipantId,
        clock: Arc<dyn Clock>,
    ) -> WorldResult<Self> {
        let room = cfg.room()?;
        let channel = connector.connect(&room, participant).await?;
        Self::with_channel(cfg, channel, clock)
    }

    /// Builds a session over an already established channel.
    pub fn with_channel(
        cfg: &WorldConfig,
        channel: Box<dyn WorldChannel>,
        clock: Arc<dyn Clock>,
    ) -> WorldResult<Self> {
        let now = clock.now_ms();
        let visible_from = cfg
            .sync
            .filter_pre_join_chat
            .then(|| now - cfg.sync.chat_join_grace_ms);
        let mut adapter = ChannelAdapter::new(channel, clock.clone(), cfg.sync.publish_interval_ms());
        let (tx, rx) = inbox();

        let state = match adapter.subscribe(tx) {
            Ok(()) => SessionState::Joined,
            Err(e @ WorldError::Configuration(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Subscribe failed");
                SessionState::LinkLost {
                    reason: e.to_string(),
                }
            }
        };
        info!(room = %adapter.room(), participant = %adapter.participant(), skin = ?cfg.skin, "Entered world");

        let spawn = Vec3::new(
            SPAWN_POINT.x + (rand::random::<f32>() * 4.0 - 2.0),
            SPAWN_POINT.y,
            SPAWN_POINT.z,
        );
        let motion = MotionSimulator::new(cfg.motion, spawn, 0.0);
        let shared = adapter.read_shared_state();

        Ok(Self {
            author: cfg.author_name(),
            skin: cfg.skin,
            state,
            adapter,
            inbox: rx,
            input: InputState::default(),
            last_frame: MotionFrame {
                position: motion.position(),
                facing: motion.facing(),
                ..MotionFrame::default()
            },
            motion,
            animator: Animator::new(),
            proximity: ProximityEvaluator::default(),
            signals: ProximitySignals::default(),
            reconciler: Reconciler::new(cfg.animation, cfg.sync.staleness_ms()),
            chat: ChatView::new(cfg.sync.chat_history, visible_from),
            shared,
            games: MiniGames::new(cfg.sync.write_policy),
            conflicts: 0,
            emote: None,
            pulse: None,
            next_teleport_id: 0,
            pending_teleport: None,
            publish_asap: true,
            elapsed_s: 0.0,
            joined_at_ms: now,
            clock,
            cfg: cfg.clone(),
        })
    }

    // ─── Accessors ───

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn room(&self) -> &RoomCode {
        self.adapter.room()
    }

    pub fn participant(&self) -> &ParticipantId {
        self.adapter.participant()
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn position(&self) -> Vec3 {
        self.motion.position()
    }

    pub fn facing(&self) -> f32 {
        self.motion.facing()
    }

    pub fn is_sitting(&self) -> bool {
        self.motion.state().sitting
    }

    pub fn pose(&self) -> &Pose {
        self.animator.pose()
    }

    pub fn signals(&self) -> ProximitySignals {
        self.signals
    }

    pub fn peers(&self) -> impl Iterator<Item = (&ParticipantId, &RemoteAvatarEntry)> {
        self.reconciler.iter()
    }

    pub fn peer_count(&self) -> usize {
        self.reconciler.len()
    }

    pub fn chat(&self) -> &[ChatMessage] {
        self.chat.messages()
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn write_conflicts(&self) -> u64 {
        self.conflicts
    }

    pub fn adapter_stats(&self) -> AdapterStats {
        self.adapter.stats()
    }

    pub fn joined_at_ms(&self) -> Millis {
        self.joined_at_ms
    }

    /// The published projection of the local avatar.
    pub fn avatar_state(&self) -> AvatarState {
        let now = self.clock.now_ms();
        let f = &self.last_frame;
        AvatarState {
            position: f.position,
            rot: f.facing,
            moving: f.moving,
            sprinting: f.sprinting,
            sitting: f.sitting,
            skin: self.skin,
            emote: self
                .emote
                .filter(|e| e.is_active(now, self.cfg.animation.emote_duration_ms)),
            pulse: self
                .pulse
                .filter(|p| p.is_active(now, self.cfg.animation.pulse_duration_ms)),
            liveness_ms: now,
        }
    }

    // ─── Frame step ───

    /// Advances one frame of `dt` seconds.
    pub fn step(&mut self, dt: f32) -> FrameReport {
        let mut report = FrameReport::default();
        let now = self.clock.now_ms();
        self.elapsed_s += dt.max(0.0);

        for event in self.inbox.drain() {
            self.apply_event(event, &mut report);
        }

        if let Some(req) = self.pending_teleport.take() {
            self.motion.teleport(req);
        }
        let input = self.input.sample();
        let frame = self.motion.step(&input, dt);
        if frame.landed {
            debug!("Landed");
        }
        self.last_frame = frame;
        report.motion = frame;

        let (anim_state, _) = self.animator.update(
            &AnimationInput {
                speed: frame.speed,
                height: frame.position.y,
                sitting: frame.sitting,
                emote: self.emote,
                pulse: self.pulse,
                time_s: self.elapsed_s,
                now_ms: now,
            },
            &self.cfg.animation,
        );
        report.animation = Some(anim_state);

        self.signals = self.proximity.evaluate(frame.position);
        report.signals = self.signals;

        if self.state == SessionState::Joined {
            let state = self.avatar_state();
            report.published = if std::mem::take(&mut self.publish_asap) {
                self.adapter.publish_now(&state)
            } else {
                self.adapter.publish_self(&state)
            };
        }

        report.peer_events.extend(self.reconciler.evict_stale(now));
        self.reconciler.step(self.elapsed_s, now);
        report
    }

    fn apply_event(&mut self, event: ChannelEvent, report: &mut FrameReport) {
        match event {
            ChannelEvent::Peers(snapshot) => {
                if matches!(self.state, SessionState::LinkLost { .. }) {
                    return;
                }
                report.peer_events.extend(self.reconciler.apply_snapshot(&snapshot));
            }
            ChannelEvent::Chat(log) => {
                self.chat.replace(log);
                report.chat_updated = true;
            }
            ChannelEvent::Shared(shared) => {
                self.shared = shared;
                report.shared_updated = true;
            }
            ChannelEvent::WriteConflict(conflict) => {
                self.conflicts += 1;
                debug!(?conflict, "Shared write lost a race, keeping delivered state");
            }
            ChannelEvent::LinkLost { reason } => {
                warn!(room = %self.adapter.room(), reason = %reason, "Link lost");
                report.peer_events.extend(self.reconciler.clear());
                self.state = SessionState::LinkLost { reason };
            }
        }
    }

    /// Re-subscribes over a fresh channel after link loss. Local motion is kept.
    pub fn rejoin(&mut self, channel: Box<dyn WorldChannel>) -> WorldResult<()> {
        self.adapter.replace_channel(channel);
        let (tx, rx) = inbox();
        self.adapter.subscribe(tx)?;
        self.inbox = rx;
        self.state = SessionState::Joined;
        self.publish_asap = true;
        info!(room = %self.adapter.room(), "Rejoined room");
        Ok(())
    }

    /// Unsubscribes and retracts presence.
    pub fn leave(&mut self) {
        if self.state == SessionState::Left {
            return;
        }
        self.adapter.leave();
        self.reconciler.clear();
        self.state = SessionState::Left;
        info!(room = %self.adapter.room(), "Left room");
    }

    // ─── Actions ───

    /// Toggles sitting. Sitting down needs a nearby seat; standing up always works.
    pub fn toggle_sit(&mut self) -> bool {
        let sitting = self.motion.state().sitting;
        if !sitting && !self.signals.near_seat() {
            return false;
        }
        self.motion.set_sitting(!sitting);
        if !sitting {
            self.input.set_direction(0.0, 0.0);
        }
        self.publish_asap = true;
        true
    }

    pub fn emote(&mut self, kind: EmoteKind) {
        self.emote = Some(Emote {
            kind,
            issued_at_ms: self.clock.now_ms(),
        });
        self.publish_asap = true;
    }

    pub fn punch(&mut self) {
        self.pulse = Some(ActionPulse {
            kind: ActionKind::Punch,
            issued_at_ms: self.clock.now_ms(),
        });
        self.publish_asap = true;
    }

    pub fn say(&mut self, text: &str) -> bool {
        self.adapter.send_chat(&self.author, text)
    }

    /// Enters the climbable structure when standing next to it.
    pub fn climb(&mut self) -> bool {
        if !self.signals.near_climbable || self.motion.state().sitting {
            return false;
        }
        self.next_teleport_id += 1;
        self.pending_teleport = Some(TeleportRequest {
            target: CLIMB_PLATFORM,
            id: self.next_teleport_id,
        });
        self.publish_asap = true;
        true
    }

    /// Tic-tac-toe. Invalid moves are ignored.
    pub fn board(&mut self, action: BoardAction) -> bool {
        let patch = match action {
            BoardAction::Reset => self.games.reset(),
            BoardAction::Mark(cell) => match self.games.play(&self.shared, cell) {
                Ok(patch) => patch,
                Err(e) => {
                    debug!(cell, error = %e, "Move ignored");
                    return false;
                }
            },
        };
        self.adapter.write_shared_state(patch)
    }

    /// Cooking counter. Only available at the station.
    pub fn cook(&mut self) -> bool {
        if !self.signals.near_cooking {
            return false;
        }
        let patch = self.games.cook(&self.shared);
        self.adapter.write_shared_state(patch)
    }

    /// Executes a console command and returns lines to print.
    pub fn exec(&mut self, cmd: Command) -> Vec<String> {
        match cmd {
            Command::Move { x, y } => {
                if self.is_sitting() {
                    return vec!["You are sitting. Type 'sit' to stand up.".into()];
                }
                self.input.set_direction(x, y);
                Vec::new()
            }
            Command::Stop => {
                self.input.set_direction(0.0, 0.0);
                Vec::new()
            }
            Command::Jump => {
                if !self.is_sitting() {
                    self.input.press_jump();
                }
                Vec::new()
            }
            Command::Sprint(on) => {
                self.input.sprint = on;
                Vec::new()
            }
            Command::Look(yaw) => {
                self.input.camera_yaw = yaw;
                Vec::new()
            }
            Command::Sit => {
                if self.toggle_sit() {
                    let now = if self.is_sitting() { "Sitting" } else { "Standing" };
                    vec![now.into()]
                } else {
                    vec!["No seat nearby.".into()]
                }
            }
            Command::Emote(kind) => {
                self.emote(kind);
                Vec::new()
            }
            Command::Punch => {
                self.punch();
                Vec::new()
            }
            Command::Say(text) => {
                self.say(&text);
                Vec::new()
            }
            Command::Board(action) => {
                if self.board(action) {
                    Vec::new()
                } else {
                    vec!["Move not accepted.".into()]
                }
            }
            Command::Cook => {
                if self.cook() {
                    Vec::new()
                } else {
                    vec!["Not at the cooking station.".into()]
                }
            }
            Command::Climb => {
                if self.climb() {
                    vec!["Climbing up.".into()]
                } else {
                    vec!["Nothing to climb here.".into()]
                }
            }
            Command::Status => self.status_lines(),
            Command::Quit => {
                self.leave();
                vec!["Bye.".into()]
            }
        }
    }

    pub fn status_lines(&self) -> Vec<String> {
        let p = self.position();
        let stats = self.adapter.stats();
        let mut out = vec![
            format!("Room: {} as {} ({:?})", self.room(), self.author, self.state),
            format!(
                "Position: ({:.2}, {:.2}, {:.2}) facing {:.2}{}",
                p.x,
                p.y,
                p.z,
                self.facing(),
                if self.is_sitting() { " sitting" } else { "" }
            ),
            format!(
                "Published: {} throttled: {} failed: {}",
                stats.published, stats.throttled, stats.failed
            ),
            format!("Peers: {}", self.reconciler.len()),
        ];
        for (id, e) in self.reconciler.iter() {
            let r = e.rendered_position;
            out.push(format!(
                "  {id} {:?} at ({:.2}, {:.2}, {:.2}) {:?}",
                e.skin(),
                r.x,
                r.y,
                r.z,
                e.animation_state()
            ));
        }
        let s = self.signals;
        out.push(format!(
            "Nearby: memory={:?} cooking={} climbable={} seat={:?}",
            s.memory, s.near_cooking, s.near_climbable, s.seat
        ));
        let ttt = &self.shared.tic_tac_toe.value;
        out.push(format!(
            "Board (next {:?}, result {:?}):",
            ttt.next_mover, ttt.winner
        ));
        out.extend(ttt.render().lines().map(|l| format!("  {l}")));
        out.push(format!("Counter: {}", self.shared.counter.value.value));
        if let Some(m) = self.chat.latest() {
            out.push(format!("Last chat: <{}> {}", m.author, m.text));
        }
        out
    }
}

impl Drop for WorldSession {
    fn drop(&mut self) {
        self.leave();
    }
}
