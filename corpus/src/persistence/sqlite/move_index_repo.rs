//! SQLite-backed repository for the move-class lookup table.

use chess::MoveIndex;
use sqlx::SqlitePool;

use crate::persistence::traits::MoveIndexRepository;
use crate::persistence::PersistenceError;

const VERSION_KEY: &str = "move_index_version";
const SIZE_KEY: &str = "move_index_size";

/// SQLite implementation of [`MoveIndexRepository`].
pub struct SqliteMoveIndexRepository {
    pool: SqlitePool,
}

impl SqliteMoveIndexRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn meta_value(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM corpus_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }
}

impl MoveIndexRepository for SqliteMoveIndexRepository {
    async fn ensure_move_index(&self, index: &MoveIndex) -> Result<(), PersistenceError> {
        let expected = format!("v{}/{}", index.version(), index.len());

        let version = self.meta_value(VERSION_KEY).await?;
        let size = self.meta_value(SIZE_KEY).await?;
        if let (Some(version), Some(size)) = (version, size) {
            let stored = format!("v{version}/{size}");
            if stored != expected {
                return Err(PersistenceError::IncompatibleMoveIndex { stored, expected });
            }
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM legal_move_index")
            .execute(&mut *tx)
            .await?;
        for entry in index.entries() {
            sqlx::query(
                r#"
                INSERT INTO legal_move_index (idx, uci, from_square, to_square, promotion)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(i64::from(entry.index))
            .bind(&entry.uci)
            .bind(&entry.from_square)
            .bind(&entry.to_square)
            .bind(entry.promotion.map(|p| p.to_string()))
            .execute(&mut *tx)
            .await?;
        }
        for (key, value) in [
            (VERSION_KEY, index.version().to_string()),
            (SIZE_KEY, index.len().to_string()),
        ] {
            sqlx::query("INSERT OR REPLACE INTO corpus_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            version = index.version(),
            size = index.len(),
            "Stored move index"
        );
        Ok(())
    }
}
