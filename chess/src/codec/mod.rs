//! Fixed-size numeric encodings of positions and moves for model training.
//!
//! * [`board`]: 768-value piece-plane tensor plus the 4-value metadata vector.
//! * [`moves`]: the versioned move-class index.
//! * [`mask`]: legal-move bitsets over the move-class space.

pub mod board;
pub mod mask;
pub mod moves;

pub use board::{encode_board, encode_metadata, BOARD_TENSOR_LEN, METADATA_TENSOR_LEN};
pub use mask::{decode_index_list, encode_index_list, legal_move_mask, LegalMoveMask};
pub use moves::{move_index, MoveIndex, MoveIndexEntry, MOVE_INDEX_VERSION, MOVE_SPACE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Move {0} is outside the move-class space")]
    UnencodableMove(String),
    #[error("Move-class index {0} is out of range")]
    IndexOutOfRange(usize),
}
