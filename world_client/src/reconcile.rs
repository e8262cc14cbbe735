//! Remote avatar reconciler.
//!
//! Peers publish at a low rate; the reconciler turns those discrete states
//! into continuous motion by chasing the last received state with
//! exponential smoothing. It never extrapolates past the data it has.
//!
//! Entries are created on first sight, refreshed on every snapshot that
//! still lists them, and evicted when a snapshot omits them or their data is
//! older than the staleness window.

use std::collections::BTreeMap;

use tracing::debug;
use world_shared::{
    avatar::{AvatarState, CharacterSkin, ParticipantId},
    clock::Millis,
    config::AnimationConfig,
    inbox::PeerSnapshot,
    math::{shortest_arc, wrap_angle, Vec3},
};

use crate::animation::{AnimationInput, AnimationState, Animator, Pose};

/// Why a remote avatar went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Missing from the latest snapshot.
    Absent,
    /// Liveness older than the staleness window.
    Stale,
    /// The subscription broke.
    LinkLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Spawned(ParticipantId),
    Evicted(ParticipantId, EvictReason),
}

/// One remote participant as the client sees it.
#[derive(Debug, Clone)]
pub struct RemoteAvatarEntry {
    /// Last received state; the smoothing target.
    pub target: AvatarState,
    pub rendered_position: Vec3,
    pub rendered_rot: f32,
    /// Local receipt time of the last snapshot that refreshed this entry.
    pub last_update_ms: Millis,
    pub animator: Animator,
}

impl RemoteAvatarEntry {
    fn spawn(state: AvatarState, received_at_ms: Millis) -> Self {
        RemoteAvatarEntry {
            rendered_position: state.position,
            rendered_rot: state.rot,
            target: state,
            last_update_ms: received_at_ms,
            animator: Animator::new(),
        }
    }

    pub fn skin(&self) -> CharacterSkin {
        self.target.skin
    }

    pub fn pose(&self) -> &Pose {
        self.animator.pose()
    }

    pub fn animation_state(&self) -> Option<AnimationState> {
        self.animator.state()
    }
}

pub struct Reconciler {
    entries: BTreeMap<ParticipantId, RemoteAvatarEntry>,
    cfg: AnimationConfig,
    staleness_ms: Millis,
}

impl Reconciler {
    pub fn new(cfg: AnimationConfig, staleness_ms: Millis) -> Self {
        Self {
            entries: BTreeMap::new(),
            cfg,
            staleness_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteAvatarEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &RemoteAvatarEntry)> {
        self.entries.iter()
    }

    fn is_stale(&self, state: &AvatarState, now_ms: Millis) -> bool {
        state.age_ms(now_ms) > self.staleness_ms
    }

    /// Applies a full snapshot of peers.
    pub fn apply_snapshot(&mut self, snapshot: &PeerSnapshot) -> Vec<PeerEvent> {
        let now = snapshot.received_at_ms;
        let mut events = Vec::new();

        let gone: Vec<ParticipantId> = self
            .entries
            .keys()
            .filter(|id| !snapshot.peers.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            self.entries.remove(&id);
            debug!(participant = %id, "Peer absent from snapshot");
            events.push(PeerEvent::Evicted(id, EvictReason::Absent));
        }

        for (id, state) in &snapshot.peers {
            if self.is_stale(state, now) {
                if self.entries.remove(id).is_some() {
                    debug!(participant = %id, age_ms = state.age_ms(now), "Peer stale");
                    events.push(PeerEvent::Evicted(id.clone(), EvictReason::Stale));
                }
                continue;
            }
            match self.entries.get_mut(id) {
                Some(entry) => {
                    if state.liveness_ms >= entry.target.liveness_ms {
                        entry.target = state.clone();
                        entry.last_update_ms = now;
                    }
                }
                None => {
                    self.entries
                        .insert(id.clone(), RemoteAvatarEntry::spawn(state.clone(), now));
                    debug!(participant = %id, skin = ?state.skin, "Peer spawned");
                    events.push(PeerEvent::Spawned(id.clone()));
                }
            }
        }
        events
    }

    /// Evicts entries that were not refreshed within the staleness window.
    pub fn evict_stale(&mut self, now_ms: Millis) -> Vec<PeerEvent> {
        let window = self.staleness_ms;
        let stale: Vec<ParticipantId> = self
            .entries
            .iter()
            .filter(|(_, e)| now_ms - e.last_update_ms > window)
            .map(|(id, _)| id.clone())
            .collect();
        stale
            .into_iter()
            .map(|id| {
                self.entries.remove(&id);
                debug!(participant = %id, "Peer timed out");
                PeerEvent::Evicted(id, EvictReason::Stale)
            })
            .collect()
    }

    /// Drops every entry, e.g. after the subscription broke.
    pub fn clear(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.entries)
            .into_keys()
            .map(|id| PeerEvent::Evicted(id, EvictReason::LinkLost))
            .collect()
    }

    /// Advances every rendered transform one frame toward its target and
    /// animates it.
    pub fn step(&mut self, time_s: f32, now_ms: Millis) {
        let pos_k = self.cfg.remote_position_smoothing;
        let rot_k = self.cfg.remote_rotation_smoothing;
        for entry in self.entries.values_mut() {
            entry.rendered_position = entry.rendered_position.lerp(entry.target.position, pos_k);
            entry.rendered_rot = wrap_angle(
                entry.rendered_rot + shortest_arc(entry.rendered_rot, entry.target.rot) * rot_k,
            );
            let input = AnimationInput {
                speed: if entry.target.moving { 1.0 } else { 0.0 },
                height: entry.rendered_position.y,
                sitting: entry.target.sitting,
                emote: entry.target.emote,
                pulse: entry.target.pulse,
                time_s,
                now_ms,
            };
            entry.animator.update(&input, &self.cfg);
        }
    }
}
