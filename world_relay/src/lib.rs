//! `world_relay`
//!
//! Room-scoped presence relay:
//! - Tick-based main loop owning all room state
//! - Accepts `Hello` joins and pushes room contents on arrival
//! - Relays presence snapshots, chat logs and shared documents
//!
//! Networking model:
//! - TCP with length-prefixed JSON frames, one stream per participant
//! - Per-connection reader and writer tasks feed queues drained each tick

pub mod server;

pub use server::RelayServer;
