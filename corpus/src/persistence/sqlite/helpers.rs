//! Shared encode/decode helpers for SQLite ↔ domain type conversions.
//!
//! These functions bridge the gap between domain enums and the string/integer
//! columns used in the SQLite schema's CHECK constraints.

use crate::persistence::{GameStatus, PersistenceError, SourceStatus};

// ── SourceStatus ───────────────────────────────────────────────────────

pub fn encode_source_status(status: SourceStatus) -> &'static str {
    match status {
        SourceStatus::Registered => "registered",
        SourceStatus::Splitting => "splitting",
        SourceStatus::Snapshotting => "snapshotting",
        SourceStatus::Processed => "processed",
        SourceStatus::Failed => "failed",
    }
}

pub fn decode_source_status(s: &str) -> Result<SourceStatus, PersistenceError> {
    match s {
        "registered" => Ok(SourceStatus::Registered),
        "splitting" => Ok(SourceStatus::Splitting),
        "snapshotting" => Ok(SourceStatus::Snapshotting),
        "processed" => Ok(SourceStatus::Processed),
        "failed" => Ok(SourceStatus::Failed),
        other => Err(PersistenceError::InvalidData(format!(
            "unknown source status {other:?}"
        ))),
    }
}

// ── GameStatus ─────────────────────────────────────────────────────────

pub fn encode_game_status(status: GameStatus) -> &'static str {
    match status {
        GameStatus::Pending => "pending",
        GameStatus::Processed => "processed",
        GameStatus::Partial => "partial",
        GameStatus::Malformed => "malformed",
        GameStatus::Skipped => "skipped",
    }
}

pub fn decode_game_status(s: &str) -> Result<GameStatus, PersistenceError> {
    match s {
        "pending" => Ok(GameStatus::Pending),
        "processed" => Ok(GameStatus::Processed),
        "partial" => Ok(GameStatus::Partial),
        "malformed" => Ok(GameStatus::Malformed),
        "skipped" => Ok(GameStatus::Skipped),
        other => Err(PersistenceError::InvalidData(format!(
            "unknown game status {other:?}"
        ))),
    }
}

// ── Integers ───────────────────────────────────────────────────────────

/// SQLite integers are signed; counters never exceed `i64::MAX` in practice.
pub fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub fn decode_side(s: &str) -> Result<char, PersistenceError> {
    match s {
        "w" => Ok('w'),
        "b" => Ok('b'),
        other => Err(PersistenceError::InvalidData(format!(
            "unknown side to move {other:?}"
        ))),
    }
}
