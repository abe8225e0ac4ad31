//! Replays a game's move tokens from its start position, capturing the
//! position and legal-move set before every ply.

use cozy_chess::{Board, Color, Move};

use crate::pgn::san::{self, SanError};
use crate::{fen, rules, uci};

/// Starting position of the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    Standard,
    Fen(String),
}

impl StartPosition {
    pub fn board(&self) -> Result<Board, ReplayError> {
        match self {
            Self::Standard => Ok(rules::initial_position()),
            Self::Fen(text) => fen::parse_fen(text).map_err(|e| ReplayError::InvalidStartPosition {
                fen: text.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// State of the game immediately before one ply.
///
/// `mv` and `legal_moves` use standard castling notation (`e1g1`), not the
/// cozy-chess king-takes-rook form.
#[derive(Debug, Clone)]
pub struct PlySnapshot {
    /// 1-based half-move counter.
    pub ply: u32,
    pub move_number: u32,
    pub side_to_move: Color,
    pub fen_before: String,
    pub board_before: Board,
    pub mv: Move,
    pub san: String,
    pub legal_moves: Vec<Move>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStatus {
    Complete,
    /// Replay stopped at `ply` because `token` did not resolve to a unique
    /// legal move. Snapshots before that ply are kept.
    Partial {
        ply: u32,
        token: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub snapshots: Vec<PlySnapshot>,
    pub status: ReplayStatus,
}

impl ReplayOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == ReplayStatus::Complete
    }
}

/// Replay `tokens` from `start`.
///
/// An illegal, ambiguous or unparseable token ends the replay with
/// [`ReplayStatus::Partial`]; only an unusable start position is an error.
pub fn replay_game(start: &StartPosition, tokens: &[String]) -> Result<ReplayOutcome, ReplayError> {
    let mut board = start.board()?;
    let mut snapshots = Vec::with_capacity(tokens.len());

    for (i, token) in tokens.iter().enumerate() {
        let ply = u32::try_from(i + 1).unwrap_or(u32::MAX);
        let legal = rules::legal_moves(&board);

        let mv = match resolve_token(&board, &legal, token) {
            Ok(mv) => mv,
            Err(reason) => {
                tracing::debug!(ply, token = %token, %reason, "Replay stopped");
                return Ok(ReplayOutcome {
                    snapshots,
                    status: ReplayStatus::Partial {
                        ply,
                        token: token.clone(),
                        reason: reason.to_string(),
                    },
                });
            }
        };

        let next = match rules::apply(&board, mv) {
            Ok(next) => next,
            Err(e) => {
                return Ok(ReplayOutcome {
                    snapshots,
                    status: ReplayStatus::Partial {
                        ply,
                        token: token.clone(),
                        reason: e.to_string(),
                    },
                });
            }
        };

        let mut standard_legal: Vec<Move> = legal
            .iter()
            .map(|&m| uci::to_standard_castling(&board, m))
            .collect();
        standard_legal.sort_by_key(|m| (m.from as u8, m.to as u8, m.promotion.map(|p| p as u8)));

        snapshots.push(PlySnapshot {
            ply,
            move_number: u32::from(board.fullmove_number()),
            side_to_move: board.side_to_move(),
            fen_before: fen::format_fen(&board),
            mv: uci::to_standard_castling(&board, mv),
            san: san::format_san(&board, mv),
            legal_moves: standard_legal,
            board_before: board,
        });

        board = next;
    }

    Ok(ReplayOutcome {
        snapshots,
        status: ReplayStatus::Complete,
    })
}

/// Resolve one movetext token to a legal move in cozy-chess form.
fn resolve_token(board: &Board, legal: &[Move], token: &str) -> Result<Move, SanError> {
    if uci::is_coordinate_token(token) {
        return uci::parse_uci_move(token, legal).ok_or_else(|| SanError::NoLegalMove(token.to_string()));
    }
    san::resolve_san(board, legal, token)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("Invalid start position {fen:?}: {reason}")]
    InvalidStartPosition { fen: String, reason: String },
}
