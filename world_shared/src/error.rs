//! Error taxonomy.
//!
//! Transport failures are logged and dropped by callers, invalid mini-game
//! moves are ignored, and configuration failures block entering the world.
//! Stale peers are not errors; they are evictions (see `EvictReason`).

use thiserror::Error;

/// Why a mini-game action was refused locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    /// The targeted cell already holds a mark.
    #[error("cell occupied")]
    CellOccupied,
    /// A winner or draw has been recorded; only a reset is accepted.
    #[error("game over")]
    GameOver,
    /// Cell index outside `0..9`.
    #[error("cell out of range")]
    OutOfRange,
}

/// World errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Publish/subscribe/read/write failed. Never fatal.
    #[error("transport error: {0}")]
    Transport(String),

    /// The channel cannot be established at all.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mini-game action rejected against local state.
    #[error("invalid move: {0}")]
    InvalidMove(MoveRejection),
}

impl WorldError {
    pub fn transport(e: impl std::fmt::Display) -> Self {
        WorldError::Transport(e.to_string())
    }

    pub fn configuration(e: impl std::fmt::Display) -> Self {
        WorldError::Configuration(e.to_string())
    }

    /// Whether the next scheduled operation is expected to heal this.
    pub fn is_transient(&self) -> bool {
        matches!(self, WorldError::Transport(_))
    }
}

pub type WorldResult<T> = Result<T, WorldError>;
