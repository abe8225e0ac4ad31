pub mod codec;
pub mod fen;
pub mod pgn;
pub mod replay;
pub mod rules;
pub mod types;
pub mod uci;

pub use codec::{move_index, CodecError, LegalMoveMask, MoveIndex, MOVE_INDEX_VERSION, MOVE_SPACE_SIZE};
pub use pgn::{GameMetadata, GameSplitter, PgnError, PgnGame, Rating};
pub use replay::{replay_game, PlySnapshot, ReplayError, ReplayOutcome, ReplayStatus, StartPosition};
pub use types::{PieceColor, PieceKind};
pub use uci::format_uci_move;

pub use cozy_chess::{Board, Color, Move, Piece, Square};
