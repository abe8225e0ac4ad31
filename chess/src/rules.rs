//! Rules-engine seam.
//!
//! The pipeline only ever asks three things of the rules engine: the starting
//! position, the legal moves of a position, and the result of playing a move.
//! cozy-chess answers all three; nothing outside this module generates moves.

use cozy_chess::{Board, Move};

/// The standard starting position.
pub fn initial_position() -> Board {
    Board::default()
}

/// All legal moves for `board`, in cozy-chess castling form.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// Play `mv` on a copy of `board`.
pub fn apply(board: &Board, mv: Move) -> Result<Board, RulesError> {
    let mut next = board.clone();
    next.try_play(mv).map_err(|_| RulesError::IllegalMove(mv))?;
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("Illegal move: {0}")]
    IllegalMove(Move),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_has_twenty_moves() {
        assert_eq!(legal_moves(&initial_position()).len(), 20);
    }

    #[test]
    fn apply_leaves_original_untouched() {
        let start = initial_position();
        let next = apply(&start, "e2e4".parse().unwrap()).unwrap();
        assert_eq!(start, Board::default());
        assert_ne!(next, start);
        assert_eq!(next.side_to_move(), cozy_chess::Color::Black);
    }

    #[test]
    fn apply_rejects_illegal_move() {
        let err = apply(&initial_position(), "e2e5".parse().unwrap()).unwrap_err();
        assert!(matches!(err, RulesError::IllegalMove(_)));
    }
}
