//! PGN handling: stream splitting, record parsing, SAN and tag metadata.

pub mod metadata;
pub mod parser;
pub mod san;
pub mod splitter;

pub use metadata::{start_position, GameMetadata, Rating};
pub use parser::{parse_pgn, GameResult, PgnError, PgnGame};
pub use san::{format_san, parse_san, resolve_san, SanError};
pub use splitter::GameSplitter;
