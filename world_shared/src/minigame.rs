//! Shared mini-game state: tic-tac-toe and the cooking counter.
//!
//! Both documents live on the backend and are overwritten field by field.
//! Under `WritePolicy::LastWriterWins` two participants acting on the same
//! stale local copy can both pass validation; whichever write lands last
//! wins, which may regress the board or lose a counter increment.
//! `WritePolicy::CompareAndSwap` makes such writes fail visibly instead.

use serde::{Deserialize, Serialize};

use crate::error::{MoveRejection, WorldError};

/// Number of board cells.
pub const BOARD_CELLS: usize = 9;

/// The 8 winning line triples.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A board mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[serde(rename = "X")]
    A,
    #[serde(rename = "O")]
    B,
}

impl Mark {
    /// Mark that moves first after a reset.
    pub const STARTING: Mark = Mark::A;

    pub fn other(self) -> Mark {
        match self {
            Mark::A => Mark::B,
            Mark::B => Mark::A,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Mark::A => 'X',
            Mark::B => 'O',
        }
    }
}

/// Result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Winner(Mark),
    Draw,
}

/// Tic-tac-toe document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicTacToeState {
    pub board: [Option<Mark>; BOARD_CELLS],
    pub next_mover: Mark,
    pub winner: Option<Outcome>,
}

impl Default for TicTacToeState {
    fn default() -> Self {
        Self::reset()
    }
}

impl TicTacToeState {
    /// Empty board, starting mover, no winner.
    pub fn reset() -> Self {
        TicTacToeState {
            board: [None; BOARD_CELLS],
            next_mover: Mark::STARTING,
            winner: None,
        }
    }

    pub fn is_over(&self) -> bool {
        self.winner.is_some()
    }

    /// Checks a move against this (possibly stale) copy.
    pub fn validate_move(&self, cell: usize) -> Result<(), MoveRejection> {
        if cell >= BOARD_CELLS {
            return Err(MoveRejection::OutOfRange);
        }
        if self.winner.is_some() {
            return Err(MoveRejection::GameOver);
        }
        if self.board[cell].is_some() {
            return Err(MoveRejection::CellOccupied);
        }
        Ok(())
    }

    /// The full document after the next mover marks `cell`.
    pub fn with_move(&self, cell: usize) -> Result<TicTacToeState, WorldError> {
        self.validate_move(cell).map_err(WorldError::InvalidMove)?;
        let mut board = self.board;
        board[cell] = Some(self.next_mover);
        Ok(TicTacToeState {
            board,
            next_mover: self.next_mover.other(),
            winner: evaluate(&board),
        })
    }

    /// Renders the board as three rows of `X`, `O` and `.`.
    pub fn render(&self) -> String {
        self.board
            .chunks(3)
            .map(|row| {
                row.iter()
                    .map(|c| c.map_or('.', Mark::symbol))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Winner of a board: a completed line, else a draw when full.
pub fn evaluate(board: &[Option<Mark>; BOARD_CELLS]) -> Option<Outcome> {
    for [a, b, c] in LINES {
        if let Some(mark) = board[a] {
            if board[b] == Some(mark) && board[c] == Some(mark) {
                return Some(Outcome::Winner(mark));
            }
        }
    }
    if board.iter().all(Option::is_some) {
        return Some(Outcome::Draw);
    }
    None
}

/// Cooking counter document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub value: u64,
}

impl CounterState {
    pub fn incremented(self) -> CounterState {
        CounterState {
            value: self.value.saturating_add(1),
        }
    }
}

/// A document plus the backend revision that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: u64,
}

/// Shared documents of a room.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedState {
    pub tic_tac_toe: Versioned<TicTacToeState>,
    pub counter: Versioned<CounterState>,
}

/// Names a shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedDocument {
    TicTacToe,
    Counter,
}

/// One document overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWrite<T> {
    pub value: T,
    /// Only commit if the document is still at this revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<u64>,
}

/// A merge-by-field write; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tic_tac_toe: Option<FieldWrite<TicTacToeState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<FieldWrite<CounterState>>,
}

/// A write refused because the document moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConflict {
    pub document: SharedDocument,
    pub expected_revision: u64,
    pub current_revision: u64,
}

/// What happened to each field of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub applied: Vec<SharedDocument>,
    pub conflicts: Vec<WriteConflict>,
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

impl SharedState {
    /// Applies a patch field by field. Used by the backends.
    pub fn apply(&mut self, patch: SharedPatch) -> PatchOutcome {
        let mut outcome = PatchOutcome::default();
        if let Some(write) = patch.tic_tac_toe {
            apply_field(
                &mut self.tic_tac_toe,
                write,
                SharedDocument::TicTacToe,
                &mut outcome,
            );
        }
        if let Some(write) = patch.counter {
            apply_field(&mut self.counter, write, SharedDocument::Counter, &mut outcome);
        }
        outcome
    }
}

fn apply_field<T>(
    doc: &mut Versioned<T>,
    write: FieldWrite<T>,
    name: SharedDocument,
    outcome: &mut PatchOutcome,
) {
    if let Some(expected) = write.expected_revision {
        if expected != doc.revision {
            outcome.conflicts.push(WriteConflict {
                document: name,
                expected_revision: expected,
                current_revision: doc.revision,
            });
            return;
        }
    }
    doc.value = write.value;
    doc.revision += 1;
    outcome.applied.push(name);
}

/// How clients write shared documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Unconditional overwrite; concurrent edits resolve to the last arrival.
    #[default]
    LastWriterWins,
    /// Commit only if the document is still at the revision that was read.
    CompareAndSwap,
}

impl WritePolicy {
    pub fn write<T>(self, value: T, observed_revision: u64) -> FieldWrite<T> {
        FieldWrite {
            value,
            expected_revision: match self {
                WritePolicy::LastWriterWins => None,
                WritePolicy::CompareAndSwap => Some(observed_revision),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Mark::{A, B};

    fn board(cells: [Option<Mark>; 9]) -> TicTacToeState {
        TicTacToeState {
            board: cells,
            next_mover: A,
            winner: evaluate(&cells),
        }
    }

    #[test]
    fn top_row_wins_for_a() {
        let cells = [Some(A), Some(A), Some(A), None, None, None, None, None, None];
        assert_eq!(evaluate(&cells), Some(Outcome::Winner(A)));
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let cells = [
            Some(A), Some(B), Some(A),
            Some(A), Some(B), Some(B),
            Some(B), Some(A), Some(A),
        ];
        assert_eq!(evaluate(&cells), Some(Outcome::Draw));
    }

    #[test]
    fn occupied_cell_is_rejected_and_board_unchanged() {
        let state = TicTacToeState::reset().with_move(4).unwrap();
        let before = state.clone();
        let err = state.with_move(4).unwrap_err();
        assert!(matches!(
            err,
            WorldError::InvalidMove(MoveRejection::CellOccupied)
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn no_moves_after_winner() {
        let state = board([Some(A), Some(A), Some(A), None, Some(B), Some(B), None, None, None]);
        assert_eq!(state.validate_move(8), Err(MoveRejection::GameOver));
    }

    #[test]
    fn move_flips_next_mover_and_derives_winner() {
        let mut state = TicTacToeState::reset();
        for cell in [0, 3, 1, 4] {
            state = state.with_move(cell).unwrap();
        }
        assert_eq!(state.next_mover, A);
        let done = state.with_move(2).unwrap();
        assert_eq!(done.winner, Some(Outcome::Winner(A)));
        assert_eq!(done.next_mover, B);
    }

    #[test]
    fn reset_clears_everything() {
        let state = TicTacToeState::reset();
        assert!(state.board.iter().all(Option::is_none));
        assert_eq!(state.next_mover, Mark::STARTING);
        assert_eq!(state.winner, None);
        assert_eq!(state.validate_move(9), Err(MoveRejection::OutOfRange));
    }

    #[test]
    fn last_writer_wins_overwrites_blindly() {
        let mut shared = SharedState::default();
        let policy = WritePolicy::LastWriterWins;
        let first = policy.write(CounterState { value: 1 }, 0);
        let second = policy.write(CounterState { value: 1 }, 0);
        shared.apply(SharedPatch { counter: Some(first), ..Default::default() });
        let outcome = shared.apply(SharedPatch { counter: Some(second), ..Default::default() });
        assert!(outcome.conflicts.is_empty());
        // Two increments from the same read lose one.
        assert_eq!(shared.counter.value.value, 1);
        assert_eq!(shared.counter.revision, 2);
    }

    #[test]
    fn compare_and_swap_rejects_stale_write() {
        let mut shared = SharedState::default();
        let policy = WritePolicy::CompareAndSwap;
        shared.apply(SharedPatch {
            counter: Some(policy.write(CounterState { value: 1 }, 0)),
            ..Default::default()
        });
        let outcome = shared.apply(SharedPatch {
            counter: Some(policy.write(CounterState { value: 1 }, 0)),
            ..Default::default()
        });
        assert_eq!(
            outcome.conflicts,
            vec![WriteConflict {
                document: SharedDocument::Counter,
                expected_revision: 0,
                current_revision: 1,
            }]
        );
        assert_eq!(shared.counter.value.value, 1);
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut shared = SharedState::default();
        shared.apply(SharedPatch {
            tic_tac_toe: Some(WritePolicy::LastWriterWins.write(TicTacToeState::reset().with_move(0).unwrap(), 0)),
            ..Default::default()
        });
        assert_eq!(shared.tic_tac_toe.revision, 1);
        assert_eq!(shared.counter.revision, 0);
    }

    #[test]
    fn board_serializes_with_symbols() {
        let state = TicTacToeState::reset().with_move(0).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.starts_with(r#"{"board":["X",null"#));
        assert_eq!(state.render(), "X..\n...\n...");
    }
}
