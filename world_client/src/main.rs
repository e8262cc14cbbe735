//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p world_client -- --room GARDEN [--addr 127.0.0.1:40100]
//!       [--name Sam] [--skin coral] [--config world.json] [--loopback]
//!
//! `--loopback` runs against an in-process backend instead of a relay.
//!
//! Console commands:
//!   move <x> <y>     - Set the movement direction (-1..1 per axis)
//!   stop             - Stop moving
//!   jump             - Jump
//!   sprint on|off    - Toggle sprint
//!   look <yaw>       - Set the camera yaw in radians
//!   sit              - Sit down near a seat, or stand up
//!   emote <kind>     - wave, dance or heart
//!   punch            - Punch
//!   say <message>    - Send chat message
//!   xo <cell>|reset  - Tic-tac-toe
//!   cook             - Increment the cooking counter
//!   climb            - Climb the structure when next to it
//!   status           - Show session status
//!   quit             - Leave and exit

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use world_client::{
    input::Command, reconcile::PeerEvent, Reconnector, RelayConnector, SessionState, WorldSession,
};
use world_shared::{
    avatar::{CharacterSkin, ParticipantId},
    channel::ChannelConnector,
    clock::{Clock, SystemClock},
    config::WorldConfig,
    loopback::LoopbackHub,
};

const REJOIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    room: Option<String>,
    name: Option<String>,
    skin: Option<String>,
    loopback: bool,
}

fn parse_args() -> Args {
    let mut out = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                out.room = Some(args[i + 1].clone());
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.name = Some(args[i + 1].clone());
                i += 2;
            }
            "--skin" if i + 1 < args.len() => {
                out.skin = Some(args[i + 1].clone());
                i += 2;
            }
            "--loopback" => {
                out.loopback = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

fn load_config(args: &Args) -> anyhow::Result<WorldConfig> {
    let mut cfg = match &args.config {
        Some(path) => WorldConfig::from_file(path)?,
        None => WorldConfig::default(),
    };
    if let Some(addr) = &args.addr {
        cfg.relay_addr = addr.clone();
    }
    if let Some(room) = &args.room {
        cfg.room_code = room.clone();
    }
    if let Some(name) = &args.name {
        cfg.display_name = Some(name.clone());
    }
    if let Some(skin) = &args.skin {
        cfg.skin = CharacterSkin::parse(skin)
            .with_context(|| format!("unknown skin {skin:?}, expected azure or coral"))?;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let cfg = load_config(&args)?;
    let room = cfg.room().context("a room code is required, pass --room")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let connector: Arc<dyn ChannelConnector> = if args.loopback {
        info!("Using in-process loopback backend");
        Arc::new(LoopbackHub::new(clock.clone(), cfg.sync.chat_history))
    } else {
        info!(relay = %cfg.relay_addr, "Using relay backend");
        Arc::new(RelayConnector::new(
            cfg.relay_addr.clone(),
            Duration::from_millis(cfg.relay.handshake_timeout_ms),
            clock.clone(),
        ))
    };

    let participant = ParticipantId::random();
    let mut session = WorldSession::join(&cfg, connector.as_ref(), &participant, clock.clone())
        .await
        .context("join room")?;
    let mut reconnector = Reconnector::new(connector, room.clone(), participant, REJOIN_INTERVAL);

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Joined room {room} as {}. Type 'status' for info, 'quit' to exit.", cfg.author_name());
    println!();

    let frame_hz = cfg.frame_hz.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(1.0 / frame_hz as f32));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        ticker.tick().await;

        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            match Command::parse(&line) {
                Ok(cmd) => {
                    for out in session.exec(cmd) {
                        println!("{out}");
                    }
                }
                Err(usage) => println!("{usage}"),
            }
        }
        if *session.state() == SessionState::Left {
            break;
        }

        if reconnector.poll(&mut session) {
            println!("* reconnected to {room}");
        }

        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let report = session.step(dt);
        for event in &report.peer_events {
            match event {
                PeerEvent::Spawned(id) => println!("* {id} joined"),
                PeerEvent::Evicted(id, reason) => println!("* {id} left ({reason:?})"),
            }
        }
        if report.chat_updated {
            if let Some(m) = session.chat().last() {
                println!("<{}> {}", m.author, m.text);
            }
        }
        if report.motion.landed {
            info!("Landed");
        }
    }

    Ok(())
}
