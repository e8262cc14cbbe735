//! `world_client`
//!
//! Client core for a shared virtual world:
//! - Local motion simulation and input sampling
//! - Character animation state machine
//! - Proximity triggers around world anchors
//! - Remote avatar reconciliation
//! - World channel adapter (publish throttle, chat, shared documents)
//! - Relay-backed channel over TCP
//! - Background re-join after link loss
//! - The frame-stepped `WorldSession` tying it all together

pub mod adapter;
pub mod animation;
pub mod games;
pub mod input;
pub mod motion;
pub mod proximity;
pub mod reconcile;
pub mod reconnect;
pub mod relay;
pub mod session;

pub use reconnect::Reconnector;
pub use relay::RelayConnector;
pub use session::{FrameReport, SessionState, WorldSession};
