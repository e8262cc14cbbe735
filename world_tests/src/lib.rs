//! Shared helpers for the integration tests.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use world_client::{RelayConnector, WorldSession};
use world_relay::server::bind_ephemeral;
use world_shared::{
    avatar::{CharacterSkin, ParticipantId},
    clock::{Clock, SystemClock},
    config::WorldConfig,
};

/// Frame length used when pumping sessions in real time.
pub const FRAME: Duration = Duration::from_millis(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A relay running in the background on an ephemeral port.
pub struct TestRelay {
    pub cfg: WorldConfig,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl TestRelay {
    pub async fn spawn(tick_hz: u32) -> anyhow::Result<Self> {
        let (mut server, cfg) = bind_ephemeral(tick_hz).await?;
        let handle = tokio::spawn(async move { server.run().await });
        Ok(Self { cfg, handle })
    }

    pub fn connector(&self) -> RelayConnector {
        self.connector_with_clock(Arc::new(SystemClock))
    }

    pub fn connector_with_clock(&self, clock: Arc<dyn Clock>) -> RelayConnector {
        RelayConnector::new(
            self.cfg.relay_addr.clone(),
            Duration::from_millis(self.cfg.relay.handshake_timeout_ms),
            clock,
        )
    }

    /// Client config pointing at this relay.
    pub fn client_config(&self, room: &str, skin: CharacterSkin) -> WorldConfig {
        WorldConfig {
            room_code: room.to_string(),
            skin,
            ..self.cfg.clone()
        }
    }

    pub async fn join(&self, room: &str, skin: CharacterSkin) -> anyhow::Result<WorldSession> {
        self.join_with_clock(room, skin, Arc::new(SystemClock)).await
    }

    /// Joins with a client whose wall clock may disagree with the relay's.
    pub async fn join_with_clock(
        &self,
        room: &str,
        skin: CharacterSkin,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<WorldSession> {
        let cfg = self.client_config(room, skin);
        let connector = self.connector_with_clock(clock.clone());
        let session = WorldSession::join(&cfg, &connector, &ParticipantId::random(), clock).await?;
        Ok(session)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Steps every session in real time until `done` holds, or fails after `limit`.
pub async fn pump_until<F>(
    sessions: &mut [&mut WorldSession],
    limit: Duration,
    mut done: F,
) -> anyhow::Result<()>
where
    F: FnMut(&[&mut WorldSession]) -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        for s in sessions.iter_mut() {
            s.step(FRAME.as_secs_f32());
        }
        if done(sessions) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not reached within {limit:?}");
        }
        tokio::time::sleep(FRAME).await;
    }
}
