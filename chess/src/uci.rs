//! UCI (coordinate notation) utilities and castling translation.
//!
//! cozy-chess encodes castling as "king captures own rook" (`e1h1`), while
//! UCI and the move index use the standard king-two-squares form (`e1g1`).
//! Everything that leaves the rules engine goes through
//! [`to_standard_castling`]; everything that enters it goes through
//! [`from_standard_castling`].

use cozy_chess::{Board, File, Move, Piece, Rank, Square};

/// Convert a cozy-chess castling move into standard notation.
///
/// Non-castling moves are returned unchanged. `board` must be the position
/// the move is played from.
pub fn to_standard_castling(board: &Board, mv: Move) -> Move {
    let is_king = board.piece_on(mv.from) == Some(Piece::King);
    let onto_own_piece = board.color_on(mv.to) == Some(board.side_to_move());

    if is_king && onto_own_piece {
        let file = if mv.to.file() as u8 > mv.from.file() as u8 {
            File::G
        } else {
            File::C
        };
        return Move {
            from: mv.from,
            to: Square::new(file, mv.from.rank()),
            promotion: None,
        };
    }

    mv
}

/// Convert standard castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
///
/// The conversion only happens when the king-to-rook move is present in
/// `legal_moves`; otherwise the move is returned unchanged.
pub fn from_standard_castling(mv: Move, legal_moves: &[Move]) -> Move {
    let is_rank_1_or_8 = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);

    if is_rank_1_or_8 && is_e_file && is_g_or_c_file && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };

        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };

        if legal_moves.contains(&converted) {
            return converted;
        }
    }

    mv
}

/// Returns true when `token` looks like a coordinate move (`e2e4`, `e7e8q`).
pub fn is_coordinate_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    if !(bytes.len() == 4 || bytes.len() == 5) {
        return false;
    }

    let square_ok = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    let promotion_ok = bytes.len() == 4 || matches!(bytes[4].to_ascii_lowercase(), b'n' | b'b' | b'r' | b'q');

    square_ok(bytes[0], bytes[1]) && square_ok(bytes[2], bytes[3]) && promotion_ok
}

/// Resolve a coordinate token against the legal moves of a position.
///
/// Accepts standard castling notation. Returns the move in cozy-chess form,
/// or `None` if the token does not denote a legal move.
pub fn parse_uci_move(token: &str, legal_moves: &[Move]) -> Option<Move> {
    if !is_coordinate_token(token) {
        return None;
    }

    let mv: Move = token.to_ascii_lowercase().parse().ok()?;
    if legal_moves.contains(&mv) {
        return Some(mv);
    }

    let converted = from_standard_castling(mv, legal_moves);
    legal_moves.contains(&converted).then_some(converted)
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

/// Lowercase square name (`e4`).
pub fn format_square(sq: Square) -> String {
    sq.to_string()
}

/// Lowercase piece letter as used in UCI promotions.
pub fn format_piece(piece: Piece) -> char {
    crate::types::PieceKind::from(piece).to_char_lower()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::legal_moves;

    fn castling_board() -> Board {
        "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_format_uci_move() {
        let mv = Move {
            from: Square::new(File::E, Rank::Second),
            to: Square::new(File::E, Rank::Fourth),
            promotion: None,
        };
        assert_eq!(format_uci_move(mv), "e2e4");
    }

    #[test]
    fn test_format_uci_move_with_promotion() {
        let mv = Move {
            from: Square::new(File::E, Rank::Seventh),
            to: Square::new(File::E, Rank::Eighth),
            promotion: Some(Piece::Queen),
        };
        assert_eq!(format_uci_move(mv), "e7e8q");
    }

    #[test]
    fn castling_translates_both_ways() {
        let board = castling_board();
        let legal = legal_moves(&board);

        let standard: Move = "e1g1".parse().unwrap();
        let cozy = from_standard_castling(standard, &legal);
        assert_eq!(format_uci_move(cozy), "e1h1");
        assert_eq!(to_standard_castling(&board, cozy), standard);

        let queenside: Move = "e1c1".parse().unwrap();
        let cozy = from_standard_castling(queenside, &legal);
        assert_eq!(format_uci_move(cozy), "e1a1");
        assert_eq!(to_standard_castling(&board, cozy), queenside);
    }

    #[test]
    fn non_castling_moves_are_untouched() {
        let board = Board::default();
        let mv: Move = "e2e4".parse().unwrap();
        assert_eq!(to_standard_castling(&board, mv), mv);
        assert_eq!(from_standard_castling(mv, &legal_moves(&board)), mv);
    }

    #[test]
    fn coordinate_tokens() {
        assert!(is_coordinate_token("e2e4"));
        assert!(is_coordinate_token("a7a8Q"));
        assert!(!is_coordinate_token("Nf3"));
        assert!(!is_coordinate_token("e4"));
        assert!(!is_coordinate_token("e7e8k"));
    }

    #[test]
    fn parse_uci_checks_legality() {
        let board = castling_board();
        let legal = legal_moves(&board);
        assert_eq!(
            parse_uci_move("e1g1", &legal).map(format_uci_move).as_deref(),
            Some("e1h1")
        );
        assert!(parse_uci_move("e1e3", &legal).is_none());
    }
}
