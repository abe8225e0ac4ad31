//! SQLite-backed repository for raw game records and their statistics.

use sqlx::SqlitePool;

use super::helpers::{decode_game_status, encode_game_status, from_db_int, to_db_int};
use crate::persistence::traits::RawGameRepository;
use crate::persistence::{
    now_timestamp, CorpusCounts, GameStatus, NewRawGame, PersistenceError, RawGame, RawGameCommit,
};

/// Row type for raw game queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct RawGameRow {
    id: i64,
    source_file_id: i64,
    ordinal: i64,
    pgn: String,
    status: String,
    error: Option<String>,
}

impl TryFrom<RawGameRow> for RawGame {
    type Error = PersistenceError;

    fn try_from(r: RawGameRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            source_file_id: r.source_file_id,
            ordinal: from_db_int(r.ordinal),
            pgn: r.pgn,
            status: decode_game_status(&r.status)?,
            error: r.error,
        })
    }
}

/// SQLite implementation of [`RawGameRepository`].
pub struct SqliteRawGameRepository {
    pool: SqlitePool,
}

impl SqliteRawGameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RawGameRepository for SqliteRawGameRepository {
    async fn commit_raw_games(
        &self,
        source_id: i64,
        games: &[NewRawGame],
        games_split: u64,
    ) -> Result<RawGameCommit, PersistenceError> {
        let mut commit = RawGameCommit::default();
        let mut tx = self.pool.begin().await?;

        for game in games {
            let inserted: Option<(i64,)> = sqlx::query_as(
                r#"
                INSERT OR IGNORE INTO raw_games
                    (source_file_id, ordinal, pgn, pgn_hash, status, error)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(source_id)
            .bind(to_db_int(game.ordinal))
            .bind(&game.pgn)
            .bind(&game.pgn_hash)
            .bind(encode_game_status(game.status))
            .bind(&game.error)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((raw_game_id,)) = inserted else {
                commit.duplicates += 1;
                continue;
            };
            commit.inserted += 1;

            let Some(meta) = &game.metadata else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO game_statistics
                    (raw_game_id, event, site, date, round, white, black, result,
                     white_elo, black_elo, white_rating_diff, black_rating_diff,
                     time_control, eco, opening, termination, utc_date, utc_time,
                     variant, total_moves)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(raw_game_id)
            .bind(&meta.event)
            .bind(&meta.site)
            .bind(&meta.date)
            .bind(&meta.round)
            .bind(&meta.white)
            .bind(&meta.black)
            .bind(&meta.result)
            .bind(meta.white_elo.known())
            .bind(meta.black_elo.known())
            .bind(meta.white_rating_diff)
            .bind(meta.black_rating_diff)
            .bind(&meta.time_control)
            .bind(&meta.eco)
            .bind(&meta.opening)
            .bind(&meta.termination)
            .bind(&meta.utc_date)
            .bind(&meta.utc_time)
            .bind(&meta.variant)
            .bind(i64::from(meta.total_moves))
            .execute(&mut *tx)
            .await?;
        }

        // The cursor only moves forward, so replaying an old batch is harmless.
        sqlx::query(
            "UPDATE source_files SET games_split = MAX(games_split, ?), updated_at = ? WHERE id = ?",
        )
        .bind(to_db_int(games_split))
        .bind(to_db_int(now_timestamp()))
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(commit)
    }

    async fn list_unprocessed_games(
        &self,
        source_id: i64,
        limit: u32,
    ) -> Result<Vec<RawGame>, PersistenceError> {
        let rows: Vec<RawGameRow> = sqlx::query_as(
            r#"
            SELECT id, source_file_id, ordinal, pgn, status, error
            FROM raw_games
            WHERE source_file_id = ? AND status = 'pending'
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(source_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RawGame::try_from).collect()
    }

    async fn count_rows(&self) -> Result<CorpusCounts, PersistenceError> {
        let sources: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM source_files")
            .fetch_one(&self.pool)
            .await?;
        let snapshots: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_snapshots")
            .fetch_one(&self.pool)
            .await?;
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM raw_games GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = CorpusCounts {
            sources: from_db_int(sources.0),
            snapshots: from_db_int(snapshots.0),
            ..CorpusCounts::default()
        };
        for (status, n) in by_status {
            let n = from_db_int(n);
            counts.raw_games += n;
            match decode_game_status(&status)? {
                GameStatus::Pending => counts.pending_games += n,
                GameStatus::Processed => counts.processed_games += n,
                GameStatus::Partial => counts.partial_games += n,
                GameStatus::Malformed => counts.malformed_games += n,
                GameStatus::Skipped => counts.skipped_games += n,
            }
        }
        Ok(counts)
    }
}
