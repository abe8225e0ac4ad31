use cozy_chess::{Move, Piece, Rank, Square};
use once_cell::sync::Lazy;
use serde::Serialize;

use super::CodecError;
use crate::types::PieceKind;
use crate::uci;

/// Bumped whenever the enumeration below changes. Stored alongside every
/// corpus so indices from different schemes are never mixed.
pub const MOVE_INDEX_VERSION: u32 = 1;

/// Number of move classes.
///
/// Only `(from, to, promotion)` triples that a legal move can produce get a
/// class: 1456 queen-line pairs and 336 knight jumps make 1792 plain pairs,
/// and the 44 pawn promotion pairs (22 per side) add four promotion pieces
/// each, 176 more. Tables that also reserve slots for unreachable triples
/// (2104 wide) are not index-compatible with this one.
pub const MOVE_SPACE_SIZE: usize = 1968;

const PROMOTION_SLOTS: usize = 5;
const UNMAPPED: u16 = u16::MAX;

static MOVE_INDEX: Lazy<MoveIndex> = Lazy::new(MoveIndex::build);

/// The process-wide move index.
pub fn move_index() -> &'static MoveIndex {
    &MOVE_INDEX
}

/// Bijection between move classes `0..MOVE_SPACE_SIZE` and
/// `(from, to, promotion)` triples that some legal chess move can have.
///
/// Moves are in standard castling notation (`e1g1`).
pub struct MoveIndex {
    forward: Vec<u16>,
    reverse: Vec<Move>,
}

/// One row of the exported index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveIndexEntry {
    pub index: u16,
    pub uci: String,
    pub from_square: String,
    pub to_square: String,
    pub promotion: Option<char>,
}

impl MoveIndex {
    fn build() -> Self {
        let mut forward = vec![UNMAPPED; 64 * 64 * PROMOTION_SLOTS];
        let mut reverse = Vec::with_capacity(MOVE_SPACE_SIZE);

        for from in Square::ALL {
            for to in Square::ALL {
                if is_queen_line(from, to) || is_knight_jump(from, to) {
                    forward[slot(from, to, None)] = reverse.len() as u16;
                    reverse.push(Move { from, to, promotion: None });
                }
                if is_promotion_step(from, to) {
                    for kind in PieceKind::PROMOTIONS {
                        let piece = Piece::from(kind);
                        forward[slot(from, to, Some(piece))] = reverse.len() as u16;
                        reverse.push(Move { from, to, promotion: Some(piece) });
                    }
                }
            }
        }

        Self { forward, reverse }
    }

    pub fn version(&self) -> u32 {
        MOVE_INDEX_VERSION
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    pub fn encode(&self, from: Square, to: Square, promotion: Option<Piece>) -> Result<u16, CodecError> {
        let unencodable = || {
            CodecError::UnencodableMove(uci::format_uci_move(Move { from, to, promotion }))
        };
        if matches!(promotion, Some(Piece::Pawn | Piece::King)) {
            return Err(unencodable());
        }
        match self.forward[slot(from, to, promotion)] {
            UNMAPPED => Err(unencodable()),
            index => Ok(index),
        }
    }

    /// Encode a move given in standard castling notation.
    pub fn encode_move(&self, mv: Move) -> Result<u16, CodecError> {
        self.encode(mv.from, mv.to, mv.promotion)
    }

    pub fn decode(&self, index: usize) -> Result<Move, CodecError> {
        self.reverse
            .get(index)
            .copied()
            .ok_or(CodecError::IndexOutOfRange(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, Move)> + '_ {
        self.reverse.iter().enumerate().map(|(i, &mv)| (i as u16, mv))
    }

    pub fn entries(&self) -> impl Iterator<Item = MoveIndexEntry> + '_ {
        self.iter().map(|(index, mv)| MoveIndexEntry {
            index,
            uci: uci::format_uci_move(mv),
            from_square: uci::format_square(mv.from),
            to_square: uci::format_square(mv.to),
            promotion: mv.promotion.map(uci::format_piece),
        })
    }
}

fn slot(from: Square, to: Square, promotion: Option<Piece>) -> usize {
    let promo = match promotion {
        None => 0,
        Some(Piece::Knight) => 1,
        Some(Piece::Bishop) => 2,
        Some(Piece::Rook) => 3,
        // pawn/king promotions are rejected before lookup
        Some(_) => 4,
    };
    ((from as usize) * 64 + to as usize) * PROMOTION_SLOTS + promo
}

fn deltas(from: Square, to: Square) -> (i8, i8) {
    (
        to.file() as i8 - from.file() as i8,
        to.rank() as i8 - from.rank() as i8,
    )
}

fn is_queen_line(from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    from != to && (df == 0 || dr == 0 || df.abs() == dr.abs())
}

fn is_knight_jump(from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    matches!((df.abs(), dr.abs()), (1, 2) | (2, 1))
}

fn is_promotion_step(from: Square, to: Square) -> bool {
    let (df, _) = deltas(from, to);
    let ranks = (from.rank(), to.rank());
    df.abs() <= 1 && matches!(ranks, (Rank::Seventh, Rank::Eighth) | (Rank::Second, Rank::First))
}
