//! SQLite-backed repository for training snapshots.

use chess::codec::{decode_index_list, encode_index_list};
use chess::Rating;
use sqlx::SqlitePool;

use super::helpers::{decode_side, encode_game_status, from_db_int};
use crate::persistence::traits::SnapshotRepository;
use crate::persistence::{GameSnapshotBatch, PersistenceError, StoredSnapshot};

/// Row type for snapshot queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    raw_game_id: i64,
    ply: i64,
    move_number: i64,
    side_to_move: String,
    move_uci: String,
    move_san: String,
    fen_before: String,
    move_index: i64,
    legal_moves: Vec<u8>,
    white_elo: Option<i64>,
    black_elo: Option<i64>,
}

impl TryFrom<SnapshotRow> for StoredSnapshot {
    type Error = PersistenceError;

    fn try_from(r: SnapshotRow) -> Result<Self, Self::Error> {
        let move_index = u16::try_from(r.move_index).map_err(|_| {
            PersistenceError::InvalidData(format!("move index {} out of range", r.move_index))
        })?;
        Ok(Self {
            id: r.id,
            raw_game_id: r.raw_game_id,
            ply: u32::try_from(r.ply).unwrap_or_default(),
            move_number: u32::try_from(r.move_number).unwrap_or_default(),
            side_to_move: decode_side(&r.side_to_move)?,
            move_uci: r.move_uci,
            move_san: r.move_san,
            fen_before: r.fen_before,
            move_index,
            legal_moves: decode_index_list(&r.legal_moves),
            white_elo: Rating::from(r.white_elo),
            black_elo: Rating::from(r.black_elo),
        })
    }
}

/// SQLite implementation of [`SnapshotRepository`].
pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SnapshotRepository for SqliteSnapshotRepository {
    async fn commit_snapshots(&self, batches: &[GameSnapshotBatch]) -> Result<u64, PersistenceError> {
        let mut written = 0u64;
        let mut tx = self.pool.begin().await?;

        for batch in batches {
            // Only a pending game may be finished; anything else means another
            // worker got there first and the whole batch is rolled back.
            let updated = sqlx::query(
                "UPDATE raw_games SET status = ?, error = ? WHERE id = ? AND status = 'pending'",
            )
            .bind(encode_game_status(batch.status))
            .bind(&batch.error)
            .bind(batch.raw_game_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(PersistenceError::GameNotPending(batch.raw_game_id));
            }

            for snap in &batch.snapshots {
                sqlx::query(
                    r#"
                    INSERT INTO game_snapshots
                        (raw_game_id, ply, move_number, side_to_move, move_uci,
                         move_san, fen_before, move_index, legal_moves)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(batch.raw_game_id)
                .bind(i64::from(snap.ply))
                .bind(i64::from(snap.move_number))
                .bind(snap.side_to_move.to_string())
                .bind(&snap.move_uci)
                .bind(&snap.move_san)
                .bind(&snap.fen_before)
                .bind(i64::from(snap.move_index))
                .bind(encode_index_list(&snap.legal_moves))
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn snapshot_count(&self) -> Result<u64, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(from_db_int(row.0))
    }

    async fn load_snapshot(&self, index: u64) -> Result<Option<StoredSnapshot>, PersistenceError> {
        let Some(id) = index.checked_add(1).and_then(|id| i64::try_from(id).ok()) else {
            return Ok(None);
        };

        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.raw_game_id, s.ply, s.move_number, s.side_to_move,
                   s.move_uci, s.move_san, s.fen_before, s.move_index, s.legal_moves,
                   g.white_elo, g.black_elo
            FROM game_snapshots s
            LEFT JOIN game_statistics g ON g.raw_game_id = s.raw_game_id
            WHERE s.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredSnapshot::try_from).transpose()
    }
}
