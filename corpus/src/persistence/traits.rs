//! Async repository trait definitions for the persistence layer.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send`, which `tokio::spawn` requires of the
//! pipeline workers.

use super::{
    CorpusCounts, GameSnapshotBatch, NewRawGame, NewSource, PersistenceError, RawGame,
    RawGameCommit, SourceFile, SourceStatus, StoredSnapshot,
};
use chess::MoveIndex;
use std::future::Future;
use std::time::Duration;

/// Repository for registered archive files and their processing claims.
pub trait SourceRepository: Send + Sync {
    /// Register `source`, or return the existing row for the same URI.
    fn register_source(
        &self,
        source: &NewSource,
    ) -> impl Future<Output = Result<SourceFile, PersistenceError>> + Send;

    /// Atomically claim the oldest unclaimed, non-terminal source.
    fn claim_next_source(
        &self,
        worker: &str,
    ) -> impl Future<Output = Result<Option<SourceFile>, PersistenceError>> + Send;

    /// Refresh `worker`'s lease on source `id`. Returns `false` when the
    /// worker no longer holds the claim.
    fn renew_claim(
        &self,
        id: i64,
        worker: &str,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;

    /// Release the claim on `id` if `worker` still holds it.
    fn release_claim(
        &self,
        id: i64,
        worker: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Drop claims not renewed within `timeout`, e.g. those left behind by a
    /// crashed run. Live claims are kept. Returns the number released.
    fn release_stale_claims(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
    fn set_source_status(
        &self,
        id: i64,
        status: SourceStatus,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn list_sources(&self) -> impl Future<Output = Result<Vec<SourceFile>, PersistenceError>> + Send;
    fn list_unprocessed_sources(
        &self,
    ) -> impl Future<Output = Result<Vec<SourceFile>, PersistenceError>> + Send;
    fn load_source(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<SourceFile>, PersistenceError>> + Send;
}

/// Repository for raw game records and their statistics.
///
/// Implementations must store a batch of games, their statistics and the
/// source's split cursor in a single transaction.
pub trait RawGameRepository: Send + Sync {
    fn commit_raw_games(
        &self,
        source_id: i64,
        games: &[NewRawGame],
        games_split: u64,
    ) -> impl Future<Output = Result<RawGameCommit, PersistenceError>> + Send;

    /// Pending games of a source in insertion order.
    fn list_unprocessed_games(
        &self,
        source_id: i64,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<RawGame>, PersistenceError>> + Send;
    fn count_rows(&self) -> impl Future<Output = Result<CorpusCounts, PersistenceError>> + Send;
}

/// Repository for training snapshots.
///
/// Implementations must store each game's snapshots together with the game's
/// terminal status, so a game is either fully snapshotted or still pending.
pub trait SnapshotRepository: Send + Sync {
    /// Returns the number of snapshot rows written.
    fn commit_snapshots(
        &self,
        batches: &[GameSnapshotBatch],
    ) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
    fn snapshot_count(&self) -> impl Future<Output = Result<u64, PersistenceError>> + Send;

    /// Snapshot at training index `index` (row id `index + 1`).
    fn load_snapshot(
        &self,
        index: u64,
    ) -> impl Future<Output = Result<Option<StoredSnapshot>, PersistenceError>> + Send;
}

/// Repository for the persisted move-class lookup table.
pub trait MoveIndexRepository: Send + Sync {
    /// Populate the table on first use; afterwards verify that the stored
    /// version and size match `index`.
    fn ensure_move_index(
        &self,
        index: &MoveIndex,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// A complete storage backend.
pub trait Persistence: Send + Sync + 'static {
    type Sources: SourceRepository + 'static;
    type Games: RawGameRepository + 'static;
    type Snapshots: SnapshotRepository + 'static;
    type MoveIndex: MoveIndexRepository + 'static;

    fn sources(&self) -> &Self::Sources;
    fn games(&self) -> &Self::Games;
    fn snapshots(&self) -> &Self::Snapshots;
    fn move_index(&self) -> &Self::MoveIndex;
}
