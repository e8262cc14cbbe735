//! Mini-game actions.
//!
//! Turns local intents into shared-document patches. Validation runs against
//! the last delivered copy, which may already be stale; see
//! `world_shared::minigame` for what each `WritePolicy` does about that.

use world_shared::{
    error::WorldResult,
    minigame::{SharedPatch, SharedState, TicTacToeState, WritePolicy},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MiniGames {
    policy: WritePolicy,
}

impl MiniGames {
    pub fn new(policy: WritePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Marks `cell` for the next mover. Board, winner and next mover go out
    /// in one write.
    pub fn play(&self, shared: &SharedState, cell: usize) -> WorldResult<SharedPatch> {
        let doc = &shared.tic_tac_toe;
        let next = doc.value.with_move(cell)?;
        Ok(SharedPatch {
            tic_tac_toe: Some(self.policy.write(next, doc.revision)),
            ..SharedPatch::default()
        })
    }

    /// Clears the board. Always unconditional; concurrent resets are identical.
    pub fn reset(&self) -> SharedPatch {
        SharedPatch {
            tic_tac_toe: Some(WritePolicy::LastWriterWins.write(TicTacToeState::reset(), 0)),
            ..SharedPatch::default()
        }
    }

    /// Increments the cooking counter from the last known value.
    pub fn cook(&self, shared: &SharedState) -> SharedPatch {
        let doc = &shared.counter;
        SharedPatch {
            counter: Some(self.policy.write(doc.value.incremented(), doc.revision)),
            ..SharedPatch::default()
        }
    }
}
