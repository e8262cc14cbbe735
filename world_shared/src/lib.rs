//! `world_shared`
//!
//! Shared libraries used by the client core and the relay.
//!
//! Design goals:
//! - Plain data in, plain data out: no rendering or windowing types.
//! - Clear separation of concerns (avatar, chat, minigame, channel, net).
//! - Traits at the transport seam so the core never knows which backend it talks to.
//! - No `unsafe`.

pub mod avatar;
pub mod channel;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod inbox;
pub mod loopback;
pub mod math;
pub mod minigame;
pub mod net;
pub mod room;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::avatar::*;
    pub use crate::channel::*;
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::inbox::*;
    pub use crate::math::*;
    pub use crate::room::*;
}
