//! SQLite-backed repository implementations.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** with a busy timeout, so workers queue on the write lock.
//! - **Foreign keys enabled**, enforced at the connection level.
//! - **Pool size and busy timeout** from [`DatabaseSettings`](crate::config::DatabaseSettings).
//! - **Embedded migrations**: `sqlx::migrate!` applies `migrations/*.sql`
//!   when [`Database::open`] is called.
//!
//! ## Repository types
//!
//! Each `Sqlite*Repository` holds a clone of the pool and implements the
//! corresponding trait from [`crate::persistence::traits`]:
//!
//! | Type | Trait |
//! |------|-------|
//! | [`SqliteSourceRepository`] | `SourceRepository` |
//! | [`SqliteRawGameRepository`] | `RawGameRepository` |
//! | [`SqliteSnapshotRepository`] | `SnapshotRepository` |
//! | [`SqliteMoveIndexRepository`] | `MoveIndexRepository` |
//!
//! [`SqlitePersistence`] bundles all four for the pipeline.
//!
//! Status columns are stored as `TEXT` and round-tripped through the helpers
//! in [`helpers`].

mod database;
mod game_repo;
pub(crate) mod helpers;
#[cfg(test)]
mod integration_tests;
mod move_index_repo;
mod snapshot_repo;
mod source_repo;

pub use database::Database;
pub use game_repo::SqliteRawGameRepository;
pub use move_index_repo::SqliteMoveIndexRepository;
pub use snapshot_repo::SqliteSnapshotRepository;
pub use source_repo::SqliteSourceRepository;

use super::Persistence;

/// The SQLite storage backend.
pub struct SqlitePersistence {
    sources: SqliteSourceRepository,
    games: SqliteRawGameRepository,
    snapshots: SqliteSnapshotRepository,
    move_index: SqliteMoveIndexRepository,
}

impl SqlitePersistence {
    pub fn new(db: &Database) -> Self {
        let pool = db.pool().clone();
        Self {
            sources: SqliteSourceRepository::new(pool.clone()),
            games: SqliteRawGameRepository::new(pool.clone()),
            snapshots: SqliteSnapshotRepository::new(pool.clone()),
            move_index: SqliteMoveIndexRepository::new(pool),
        }
    }
}

impl Persistence for SqlitePersistence {
    type Sources = SqliteSourceRepository;
    type Games = SqliteRawGameRepository;
    type Snapshots = SqliteSnapshotRepository;
    type MoveIndex = SqliteMoveIndexRepository;

    fn sources(&self) -> &Self::Sources {
        &self.sources
    }

    fn games(&self) -> &Self::Games {
        &self.games
    }

    fn snapshots(&self) -> &Self::Snapshots {
        &self.snapshots
    }

    fn move_index(&self) -> &Self::MoveIndex {
        &self.move_index
    }
}
