//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p world_relay -- [--addr 127.0.0.1:40100] [--tick-hz 10]
//!       [--stale-secs 60] [--config world.json]
//!
//! The relay accepts client joins, keeps per-room presence, chat and shared
//! mini-game state, and broadcasts peer snapshots every tick.
//!
//! Console commands:
//!   status  - Show relay status
//!   rooms   - List rooms and members
//!   quit    - Shutdown relay

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use world_relay::RelayServer;
use world_shared::{clock::SystemClock, config::WorldConfig};

fn parse_args() -> anyhow::Result<WorldConfig> {
    let args: Vec<String> = env::args().collect();

    let mut config_path = None;
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            config_path = Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }
    let mut cfg = match config_path {
        Some(path) => WorldConfig::from_file(&path)?,
        None => WorldConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.relay_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.relay.tick_hz = args[i + 1].parse().unwrap_or(cfg.relay.tick_hz);
                i += 2;
            }
            "--stale-secs" if i + 1 < args.len() => {
                cfg.sync.staleness_secs = args[i + 1].parse().unwrap_or(cfg.sync.staleness_secs);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.relay_addr, tick_hz = cfg.relay.tick_hz, stale_secs = cfg.sync.staleness_secs, "Starting relay");

    let mut server = RelayServer::new(cfg, Arc::new(SystemClock))
        .await
        .context("create relay")?;
    info!(local = %server.local_addr(), "Relay listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

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

    println!("Relay ready. Type 'status' or 'rooms' for info, 'quit' to exit.");
    println!();

    server.run().await
}
