//! Storage of sources, raw games, statistics and training snapshots.
//!
//! The pipeline talks to storage only through the repository traits in
//! [`traits`]; [`sqlite`] provides the production backend.

pub mod sqlite;
pub mod traits;

pub use traits::{
    MoveIndexRepository, Persistence, RawGameRepository, SnapshotRepository, SourceRepository,
};

use chess::{GameMetadata, Rating};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Stored move index {stored} does not match compiled index {expected}")]
    IncompatibleMoveIndex { stored: String, expected: String },
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
    #[error("Raw game {0} is no longer pending")]
    GameNotPending(i64),
}

impl PersistenceError {
    /// Whether retrying the same operation may succeed (lock contention,
    /// pool exhaustion, I/O hiccups).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    // SQLITE_BUSY / SQLITE_LOCKED and their extended codes
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
                _ => false,
            },
            Self::Migration(_)
            | Self::IncompatibleMoveIndex { .. }
            | Self::InvalidData(_)
            | Self::GameNotPending(_) => false,
        }
    }
}

/// Lifecycle of a source file.
///
/// `Registered -> Splitting -> Snapshotting -> Processed`, or `Failed` when
/// the archive cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceStatus {
    Registered,
    Splitting,
    Snapshotting,
    Processed,
    Failed,
}

impl SourceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

/// Outcome of processing one raw game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GameStatus {
    Pending,
    Processed,
    Partial,
    Malformed,
    Skipped,
}

/// A source file to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSource {
    pub uri: String,
    pub declared_games: Option<u64>,
    pub size_bytes: Option<u64>,
}

impl NewSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            declared_games: None,
            size_bytes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub id: i64,
    pub uri: String,
    pub declared_games: Option<u64>,
    pub size_bytes: Option<u64>,
    pub status: SourceStatus,
    /// Records consumed from the archive so far; resuming skips this many.
    pub games_split: u64,
    pub claimed_by: Option<String>,
    /// Unix time the claim was taken or last renewed.
    pub claimed_at: Option<u64>,
    pub error: Option<String>,
}

/// A game record ready to be stored.
#[derive(Debug, Clone)]
pub struct NewRawGame {
    /// Position of the record in its archive, starting at 0.
    pub ordinal: u64,
    pub pgn: String,
    pub pgn_hash: String,
    pub status: GameStatus,
    pub error: Option<String>,
    pub metadata: Option<GameMetadata>,
}

impl NewRawGame {
    pub fn new(ordinal: u64, pgn: String) -> Self {
        let pgn_hash = pgn_hash(&pgn);
        Self {
            ordinal,
            pgn,
            pgn_hash,
            status: GameStatus::Pending,
            error: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGame {
    pub id: i64,
    pub source_file_id: i64,
    pub ordinal: u64,
    pub pgn: String,
    pub status: GameStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawGameCommit {
    pub inserted: u64,
    pub duplicates: u64,
}

/// One training example before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub ply: u32,
    pub move_number: u32,
    /// `'w'` or `'b'`.
    pub side_to_move: char,
    pub move_uci: String,
    pub move_san: String,
    pub fen_before: String,
    pub move_index: u16,
    /// Ascending move-class indices.
    pub legal_moves: Vec<u16>,
}

/// All snapshots of one game together with the game's final status. Stored
/// atomically.
#[derive(Debug, Clone)]
pub struct GameSnapshotBatch {
    pub raw_game_id: i64,
    pub snapshots: Vec<NewSnapshot>,
    pub status: GameStatus,
    pub error: Option<String>,
}

/// A stored snapshot joined with the game's ratings.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub id: i64,
    pub raw_game_id: i64,
    pub ply: u32,
    pub move_number: u32,
    pub side_to_move: char,
    pub move_uci: String,
    pub move_san: String,
    pub fen_before: String,
    pub move_index: u16,
    pub legal_moves: Vec<u16>,
    pub white_elo: Rating,
    pub black_elo: Rating,
}

/// Row counts across the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusCounts {
    pub sources: u64,
    pub raw_games: u64,
    pub pending_games: u64,
    pub processed_games: u64,
    pub partial_games: u64,
    pub malformed_games: u64,
    pub skipped_games: u64,
    pub snapshots: u64,
}

/// Hex SHA-256 of a game record, used to deduplicate records.
pub fn pgn_hash(pgn: &str) -> String {
    let digest = Sha256::digest(pgn.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Get the current unix timestamp in seconds.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgn_hash_is_stable_hex() {
        let hash = pgn_hash("[Event \"x\"]\n\n1. e4 *");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, pgn_hash("[Event \"x\"]\n\n1. e4 *"));
        assert_ne!(hash, pgn_hash("[Event \"y\"]\n\n1. e4 *"));
    }

    #[test]
    fn terminal_source_states() {
        assert!(SourceStatus::Processed.is_terminal());
        assert!(SourceStatus::Failed.is_terminal());
        assert!(!SourceStatus::Splitting.is_terminal());
    }

    #[test]
    fn non_storage_errors_are_not_transient() {
        assert!(!PersistenceError::Migration("x".into()).is_transient());
        assert!(PersistenceError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!PersistenceError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!PersistenceError::GameNotPending(3).is_transient());
    }
}
