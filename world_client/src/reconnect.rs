//! Re-joining after link loss.
//!
//! Connecting can take as long as the handshake timeout, so it runs on a
//! spawned task. The frame loop only polls for the outcome and keeps
//! stepping the session in the meantime.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{info, warn};
use world_shared::{
    avatar::ParticipantId,
    channel::{ChannelConnector, WorldChannel},
    error::WorldResult,
    room::RoomCode,
};

use crate::session::{SessionState, WorldSession};

type Attempt = oneshot::Receiver<WorldResult<Box<dyn WorldChannel>>>;

pub struct Reconnector {
    connector: Arc<dyn ChannelConnector>,
    room: RoomCode,
    participant: ParticipantId,
    interval: Duration,
    last_attempt: Option<Instant>,
    pending: Option<Attempt>,
}

impl Reconnector {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        room: RoomCode,
        participant: ParticipantId,
        interval: Duration,
    ) -> Self {
        Self {
            connector,
            room,
            participant,
            interval,
            last_attempt: None,
            pending: None,
        }
    }

    /// Whether a connect attempt is still running.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Called once per frame; never waits. Hands a finished connection to
    /// the session, or starts a new attempt when the link is down and none
    /// is running. Returns true on the frame the session rejoins.
    pub fn poll(&mut self, session: &mut WorldSession) -> bool {
        if let Some(rx) = &mut self.pending {
            let result = match rx.try_recv() {
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Closed) => None,
                Ok(result) => Some(result),
            };
            self.pending = None;
            match result {
                Some(Ok(channel)) if is_lost(session) => match session.rejoin(channel) {
                    Ok(()) => return true,
                    Err(e) => warn!(room = %self.room, error = %e, "Rejoin failed"),
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(room = %self.room, error = %e, "Reconnect failed"),
                None => warn!(room = %self.room, "Reconnect task ended early"),
            }
        }

        if !is_lost(session) {
            return false;
        }
        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.interval {
                return false;
            }
        }
        self.last_attempt = Some(Instant::now());

        let (tx, rx) = oneshot::channel();
        let connector = self.connector.clone();
        let room = self.room.clone();
        let participant = self.participant.clone();
        tokio::spawn(async move {
            let _ = tx.send(connector.connect(&room, &participant).await);
        });
        self.pending = Some(rx);
        info!(room = %self.room, "Reconnecting");
        false
    }
}

fn is_lost(session: &WorldSession) -> bool {
    matches!(session.state(), SessionState::LinkLost { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use world_shared::{
        avatar::{AvatarState, CharacterSkin},
        clock::ManualClock,
        config::WorldConfig,
        error::WorldError,
        inbox::InboxSender,
        loopback::LoopbackHub,
        minigame::{SharedPatch, SharedState},
    };

    const FRAME: f32 = 1.0 / 60.0;

    /// A channel whose link is already gone.
    struct Unreachable {
        room: RoomCode,
        participant: ParticipantId,
    }

    impl WorldChannel for Unreachable {
        fn room(&self) -> &RoomCode {
            &self.room
        }

        fn participant(&self) -> &ParticipantId {
            &self.participant
        }

        fn publish_self(&mut self, _: &AvatarState) -> WorldResult<()> {
            Err(WorldError::transport("gone"))
        }

        fn retract_self(&mut self) -> WorldResult<()> {
            Err(WorldError::transport("gone"))
        }

        fn subscribe(&mut self, _: InboxSender) -> WorldResult<()> {
            Err(WorldError::transport("gone"))
        }

        fn unsubscribe(&mut self) {}

        fn send_chat(&mut self, _: &str, _: &str) -> WorldResult<()> {
            Err(WorldError::transport("gone"))
        }

        fn read_shared_state(&self) -> SharedState {
            SharedState::default()
        }

        fn write_shared_state(&mut self, _: SharedPatch) -> WorldResult<()> {
            Err(WorldError::transport("gone"))
        }
    }

    /// Never finishes connecting.
    #[derive(Default)]
    struct Stalled {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ChannelConnector for Stalled {
        async fn connect(
            &self,
            _: &RoomCode,
            _: &ParticipantId,
        ) -> WorldResult<Box<dyn WorldChannel>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn config() -> WorldConfig {
        WorldConfig {
            room_code: "garden".into(),
            ..WorldConfig::default()
        }
    }

    fn lost_session(clock: &ManualClock, id: &str) -> WorldSession {
        let cfg = config();
        let channel = Unreachable {
            room: cfg.room().unwrap(),
            participant: id.into(),
        };
        WorldSession::with_channel(&cfg, Box::new(channel), Arc::new(clock.clone())).unwrap()
    }

    #[tokio::test]
    async fn stalled_connect_does_not_hold_up_frames() {
        let clock = ManualClock::new(0);
        let mut session = lost_session(&clock, "b");
        assert!(is_lost(&session));

        let stalled = Arc::new(Stalled::default());
        let mut reconnector = Reconnector::new(
            stalled.clone(),
            session.room().clone(),
            session.participant().clone(),
            Duration::ZERO,
        );

        session.input_mut().set_direction(0.0, 1.0);
        let start = session.position();
        for _ in 0..30 {
            clock.advance(16);
            assert!(!reconnector.poll(&mut session));
            session.step(FRAME);
            tokio::task::yield_now().await;
        }

        assert!(reconnector.is_pending());
        assert_eq!(stalled.attempts.load(Ordering::SeqCst), 1);
        assert!(session.position().horizontal_distance(start) > 0.5);
        assert!(is_lost(&session));
    }

    #[tokio::test]
    async fn lost_session_rejoins_through_the_connector() {
        let clock = ManualClock::new(0);
        let hub = LoopbackHub::new(Arc::new(clock.clone()), 50);
        let cfg = config();
        let room = cfg.room().unwrap();
        let mut a = WorldSession::with_channel(
            &cfg,
            Box::new(hub.open(&room, &"a".into())),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let mut b = lost_session(&clock, "b");

        let mut reconnector = Reconnector::new(
            Arc::new(hub.clone()),
            room,
            b.participant().clone(),
            Duration::ZERO,
        );

        let mut rejoined = false;
        for _ in 0..50 {
            clock.advance(16);
            rejoined |= reconnector.poll(&mut b);
            a.step(FRAME);
            b.step(FRAME);
            tokio::task::yield_now().await;
        }

        assert!(rejoined);
        assert!(!reconnector.is_pending());
        assert_eq!(*b.state(), SessionState::Joined);
        assert_eq!(a.peer_count(), 1);
        assert_eq!(b.peer_count(), 1);
    }
}
