use cozy_chess::{Board, Color, Square};

use crate::pgn::metadata::Rating;
use crate::types::PieceKind;

/// 12 piece planes of 64 squares.
pub const BOARD_TENSOR_LEN: usize = 12 * 64;
pub const METADATA_TENSOR_LEN: usize = 4;

/// Rating distribution of the reference corpus, used for z-normalisation.
pub const ELO_MEAN: f32 = 1638.431_5;
pub const ELO_STD: f32 = 185.800_55;

/// Encode piece placement as `[f32; 768]`.
///
/// Plane `p` covers indices `p * 64 .. p * 64 + 64`, where `p` is the piece
/// kind (pawn = 0 .. king = 5), plus 6 for black pieces. Squares are indexed
/// a1 = 0 .. h8 = 63.
pub fn encode_board(board: &Board) -> [f32; BOARD_TENSOR_LEN] {
    let mut tensor = [0.0f32; BOARD_TENSOR_LEN];
    for square in board.occupied() {
        let (Some(piece), Some(color)) = (board.piece_on(square), board.color_on(square)) else {
            continue;
        };
        tensor[plane_offset(PieceKind::from(piece), color) + square_index(square)] = 1.0;
    }
    tensor
}

/// `[white_elo_z, black_elo_z, white_to_move, black_to_move]`.
///
/// Unknown ratings encode as 0.0, i.e. the corpus mean.
pub fn encode_metadata(
    side_to_move: Color,
    white: Rating,
    black: Rating,
) -> [f32; METADATA_TENSOR_LEN] {
    let (white_to_move, black_to_move) = match side_to_move {
        Color::White => (1.0, 0.0),
        Color::Black => (0.0, 1.0),
    };
    [
        normalize_elo(white),
        normalize_elo(black),
        white_to_move,
        black_to_move,
    ]
}

fn normalize_elo(rating: Rating) -> f32 {
    match rating {
        Rating::Known(elo) => (elo as f32 - ELO_MEAN) / ELO_STD,
        Rating::Unknown => 0.0,
    }
}

fn plane_offset(kind: PieceKind, color: Color) -> usize {
    let plane = kind.index() + if color == Color::Black { 6 } else { 0 };
    plane * 64
}

fn square_index(square: Square) -> usize {
    square as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn start_position_planes() {
        let tensor = encode_board(&Board::default());
        assert_eq!(tensor.iter().filter(|&&v| v == 1.0).count(), 32);

        // white pawns on a2..h2
        for sq in 8..16 {
            assert_eq!(tensor[sq], 1.0);
        }
        // black king on e8 (square 60) in plane 11
        assert_eq!(tensor[11 * 64 + 60], 1.0);
        // white king on e1 (square 4) in plane 5
        assert_eq!(tensor[5 * 64 + 4], 1.0);
        assert_eq!(tensor[4], 0.0);
    }

    #[test]
    fn metadata_vector() {
        let meta = encode_metadata(Color::Black, Rating::Known(1638), Rating::Unknown);
        assert!(meta[0].abs() < 0.01);
        assert_eq!(meta[1], 0.0);
        assert_eq!(&meta[2..], &[0.0, 1.0]);

        let meta = encode_metadata(Color::White, Rating::Known(2010), Rating::Known(1400));
        assert!((meta[0] - 2.0).abs() < 0.01);
        assert!(meta[1] < 0.0);
        assert_eq!(&meta[2..], &[1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn ones_match_piece_count(moves in proptest::collection::vec(any::<u16>(), 0..60)) {
            let mut board = Board::default();
            for choice in moves {
                let legal = crate::rules::legal_moves(&board);
                if legal.is_empty() {
                    break;
                }
                let mv = legal[usize::from(choice) % legal.len()];
                board.play_unchecked(mv);
            }

            let tensor = encode_board(&board);
            let ones = tensor.iter().filter(|&&v| v == 1.0).count();
            let zeros = tensor.iter().filter(|&&v| v == 0.0).count();
            prop_assert_eq!(ones, board.occupied().len() as usize);
            prop_assert_eq!(ones + zeros, BOARD_TENSOR_LEN);
        }
    }
}
