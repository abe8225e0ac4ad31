//! SQLite-backed repository for source files and worker claims.
//!
//! A claim is a lease: `claimed_at` is set when a worker claims a source and
//! refreshed by [`SourceRepository::renew_claim`]. Only leases that have not
//! been renewed within the timeout can be released by another run.

use std::time::Duration;

use sqlx::SqlitePool;

use super::helpers::{decode_source_status, encode_source_status, from_db_int, to_db_int};
use crate::persistence::traits::SourceRepository;
use crate::persistence::{now_timestamp, NewSource, PersistenceError, SourceFile, SourceStatus};

const SOURCE_COLUMNS: &str =
    "id, uri, declared_games, size_bytes, status, games_split, claimed_by, claimed_at, error";

/// Row type for source queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i64,
    uri: String,
    declared_games: Option<i64>,
    size_bytes: Option<i64>,
    status: String,
    games_split: i64,
    claimed_by: Option<String>,
    claimed_at: Option<i64>,
    error: Option<String>,
}

impl TryFrom<SourceRow> for SourceFile {
    type Error = PersistenceError;

    fn try_from(r: SourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            uri: r.uri,
            declared_games: r.declared_games.map(from_db_int),
            size_bytes: r.size_bytes.map(from_db_int),
            status: decode_source_status(&r.status)?,
            games_split: from_db_int(r.games_split),
            claimed_by: r.claimed_by,
            claimed_at: r.claimed_at.map(from_db_int),
            error: r.error,
        })
    }
}

/// SQLite implementation of [`SourceRepository`].
pub struct SqliteSourceRepository {
    pool: SqlitePool,
}

impl SqliteSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        clause: &str,
    ) -> Result<Vec<SourceFile>, PersistenceError> {
        let rows: Vec<SourceRow> = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM source_files {clause} ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SourceFile::try_from).collect()
    }
}

impl SourceRepository for SqliteSourceRepository {
    async fn register_source(&self, source: &NewSource) -> Result<SourceFile, PersistenceError> {
        let now = to_db_int(now_timestamp());

        sqlx::query(
            r#"
            INSERT INTO source_files (uri, declared_games, size_bytes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(uri) DO UPDATE SET
                declared_games = COALESCE(excluded.declared_games, source_files.declared_games),
                size_bytes = COALESCE(excluded.size_bytes, source_files.size_bytes)
            "#,
        )
        .bind(&source.uri)
        .bind(source.declared_games.map(to_db_int))
        .bind(source.size_bytes.map(to_db_int))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row: SourceRow = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM source_files WHERE uri = ?"
        ))
        .bind(&source.uri)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn claim_next_source(&self, worker: &str) -> Result<Option<SourceFile>, PersistenceError> {
        let now = to_db_int(now_timestamp());
        let row: Option<SourceRow> = sqlx::query_as(&format!(
            r#"
            UPDATE source_files
            SET claimed_by = ?, claimed_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM source_files
                WHERE claimed_by IS NULL AND status NOT IN ('processed', 'failed')
                ORDER BY id
                LIMIT 1
            )
            AND claimed_by IS NULL
            RETURNING {SOURCE_COLUMNS}
            "#
        ))
        .bind(worker)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SourceFile::try_from).transpose()
    }

    async fn renew_claim(&self, id: i64, worker: &str) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            "UPDATE source_files SET claimed_at = ? WHERE id = ? AND claimed_by = ?",
        )
        .bind(to_db_int(now_timestamp()))
        .bind(id)
        .bind(worker)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: i64, worker: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            UPDATE source_files
            SET claimed_by = NULL, claimed_at = NULL, updated_at = ?
            WHERE id = ? AND claimed_by = ?
            "#,
        )
        .bind(to_db_int(now_timestamp()))
        .bind(id)
        .bind(worker)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_stale_claims(&self, timeout: Duration) -> Result<u64, PersistenceError> {
        let now = now_timestamp();
        let cutoff = to_db_int(now.saturating_sub(timeout.as_secs()));
        let result = sqlx::query(
            r#"
            UPDATE source_files
            SET claimed_by = NULL, claimed_at = NULL, updated_at = ?
            WHERE claimed_by IS NOT NULL
              AND (claimed_at IS NULL OR claimed_at <= ?)
            "#,
        )
        .bind(to_db_int(now))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_source_status(
        &self,
        id: i64,
        status: SourceStatus,
        error: Option<&str>,
    ) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE source_files SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(encode_source_status(status))
            .bind(error)
            .bind(to_db_int(now_timestamp()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<SourceFile>, PersistenceError> {
        self.fetch_where("").await
    }

    async fn list_unprocessed_sources(&self) -> Result<Vec<SourceFile>, PersistenceError> {
        self.fetch_where("WHERE status NOT IN ('processed', 'failed')")
            .await
    }

    async fn load_source(&self, id: i64) -> Result<Option<SourceFile>, PersistenceError> {
        let row: Option<SourceRow> = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM source_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SourceFile::try_from).transpose()
    }
}
