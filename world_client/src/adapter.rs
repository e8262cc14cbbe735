//! World channel adapter.
//!
//! Sits between the frame loop and whatever `WorldChannel` is plugged in.
//! It owns the publish throttle and the liveness stamp, and it turns
//! transport failures into log lines: nothing here is retried, because the
//! next scheduled publish already carries the current state.

use std::sync::Arc;

use tracing::{debug, warn};
use world_shared::{
    avatar::{AvatarState, ParticipantId},
    channel::WorldChannel,
    chat::normalize_text,
    clock::{Clock, Millis},
    error::WorldResult,
    inbox::InboxSender,
    minigame::{SharedPatch, SharedState},
    room::RoomCode,
};

/// Counters for the status command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub published: u64,
    pub throttled: u64,
    pub failed: u64,
}

pub struct ChannelAdapter {
    channel: Box<dyn WorldChannel>,
    clock: Arc<dyn Clock>,
    publish_interval_ms: Millis,
    last_publish_ms: Option<Millis>,
    last_forced_ms: Option<Millis>,
    stats: AdapterStats,
}

impl ChannelAdapter {
    pub fn new(channel: Box<dyn WorldChannel>, clock: Arc<dyn Clock>, publish_interval_ms: Millis) -> Self {
        Self {
            channel,
            clock,
            publish_interval_ms,
            last_publish_ms: None,
            last_forced_ms: None,
            stats: AdapterStats::default(),
        }
    }

    pub fn room(&self) -> &RoomCode {
        self.channel.room()
    }

    pub fn participant(&self) -> &ParticipantId {
        self.channel.participant()
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    /// Swaps in a fresh channel, e.g. after the old one lost its link.
    pub fn replace_channel(&mut self, channel: Box<dyn WorldChannel>) {
        self.channel = channel;
        self.last_publish_ms = None;
        self.last_forced_ms = None;
    }

    /// Publishes if the throttle allows. Returns whether a publish went out.
    pub fn publish_self(&mut self, state: &AvatarState) -> bool {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_publish_ms {
            if now - last < self.publish_interval_ms {
                self.stats.throttled += 1;
                return false;
            }
        }
        self.publish_at(state, now)
    }

    /// Publishes ahead of the throttle, for one-off events such as emotes.
    /// Only one such publish is let through per interval; further calls fall
    /// back to the throttled path.
    pub fn publish_now(&mut self, state: &AvatarState) -> bool {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_forced_ms {
            if now - last < self.publish_interval_ms {
                return self.publish_self(state);
            }
        }
        self.last_forced_ms = Some(now);
        self.publish_at(state, now)
    }

    fn publish_at(&mut self, state: &AvatarState, now: Millis) -> bool {
        let mut stamped = state.clone();
        stamped.liveness_ms = now;
        // Failed publishes still consume the slot.
        self.last_publish_ms = Some(now);
        match self.channel.publish_self(&stamped) {
            Ok(()) => {
                self.stats.published += 1;
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(room = %self.channel.room(), error = %e, "Publish failed");
                false
            }
        }
    }

    pub fn subscribe(&mut self, inbox: InboxSender) -> WorldResult<()> {
        self.channel.subscribe(inbox)
    }

    /// Sends a chat line after trimming. Blank text is ignored.
    pub fn send_chat(&mut self, author: &str, text: &str) -> bool {
        let Some(text) = normalize_text(text) else {
            return false;
        };
        match self.channel.send_chat(author, &text) {
            Ok(()) => true,
            Err(e) => {
                warn!(room = %self.channel.room(), error = %e, "Chat send failed");
                false
            }
        }
    }

    pub fn read_shared_state(&self) -> SharedState {
        self.channel.read_shared_state()
    }

    pub fn write_shared_state(&mut self, patch: SharedPatch) -> bool {
        match self.channel.write_shared_state(patch) {
            Ok(()) => true,
            Err(e) => {
                warn!(room = %self.channel.room(), error = %e, "Shared write failed");
                false
            }
        }
    }

    /// Unsubscribes and retracts presence so peers evict us right away.
    pub fn leave(&mut self) {
        self.channel.unsubscribe();
        if let Err(e) = self.channel.retract_self() {
            debug!(error = %e, "Retract on leave failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use world_shared::{
        avatar::CharacterSkin, clock::ManualClock, inbox::inbox, inbox::ChannelEvent,
        loopback::LoopbackHub, math::Vec3,
    };

    fn setup(clock: &ManualClock) -> (LoopbackHub, ChannelAdapter) {
        let hub = LoopbackHub::new(Arc::new(clock.clone()), 50);
        let room = RoomCode::parse("t").unwrap();
        let ch = hub.open(&room, &"me".into());
        let adapter = ChannelAdapter::new(Box::new(ch), Arc::new(clock.clone()), 100);
        (hub, adapter)
    }

    #[test]
    fn throttle_caps_publish_rate() {
        let clock = ManualClock::new(0);
        let (_hub, mut adapter) = setup(&clock);
        let state = AvatarState::new(CharacterSkin::Azure, Vec3::ZERO, 0.0);
        let mut sent = 0;
        for _ in 0..60 {
            if adapter.publish_self(&state) {
                sent += 1;
            }
            clock.advance(16);
        }
        // 60 frames at ~16 ms is just under a second: at most 10 publishes.
        assert!(sent <= 10, "sent {sent}");
        assert!(sent >= 9);
        assert_eq!(adapter.stats().throttled, 60 - sent);
    }

    #[test]
    fn immediate_publishes_are_limited_to_one_per_interval() {
        let clock = ManualClock::new(0);
        let (_hub, mut adapter) = setup(&clock);
        let state = AvatarState::new(CharacterSkin::Azure, Vec3::ZERO, 0.0);

        assert!(adapter.publish_self(&state));
        clock.advance(16);
        assert!(adapter.publish_now(&state));
        clock.advance(16);
        assert!(!adapter.publish_now(&state));

        clock.advance(1_000);
        let mut sent = 0;
        for _ in 0..60 {
            if adapter.publish_now(&state) {
                sent += 1;
            }
            clock.advance(16);
        }
        assert!(sent <= 10, "sent {sent}");
        assert!(sent >= 5, "sent {sent}");
    }

    #[test]
    fn publish_stamps_liveness() {
        let clock = ManualClock::new(42_000);
        let (hub, mut adapter) = setup(&clock);
        let room = RoomCode::parse("t").unwrap();
        let mut other = hub.open(&room, &"other".into());
        let (tx, mut rx) = inbox();
        other.subscribe(tx).unwrap();
        adapter.publish_now(&AvatarState::new(CharacterSkin::Coral, Vec3::ZERO, 0.0));
        let seen = rx.drain().into_iter().rev().find_map(|e| match e {
            ChannelEvent::Peers(p) => p.peers.get(&ParticipantId::from("me")).cloned(),
            _ => None,
        });
        assert_eq!(seen.unwrap().liveness_ms, 42_000);
    }

    #[test]
    fn blank_chat_is_dropped() {
        let clock = ManualClock::new(0);
        let (_hub, mut adapter) = setup(&clock);
        assert!(!adapter.send_chat("me", "   "));
        assert!(adapter.send_chat("me", " hi "));
    }
}
