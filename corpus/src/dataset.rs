//! Read side for training: stored snapshots as fixed-size tensors.
//!
//! Index `i` is the snapshot with row id `i + 1`. Ids are assigned in commit
//! order and never reused, so indices stay stable while ingestion appends.

use chess::codec::{encode_board, encode_metadata, BOARD_TENSOR_LEN, METADATA_TENSOR_LEN};
use chess::fen::parse_fen;
use chess::{Color, LegalMoveMask, PieceColor};
use sqlx::SqlitePool;

use crate::persistence::sqlite::SqliteSnapshotRepository;
use crate::persistence::{PersistenceError, SnapshotRepository, StoredSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Snapshot {index} is corrupt: {reason}")]
    CorruptSnapshot { index: u64, reason: String },
}

/// One training example.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub board: [f32; BOARD_TENSOR_LEN],
    pub metadata: [f32; METADATA_TENSOR_LEN],
    /// Move-class index of the move played.
    pub move_class: u16,
}

pub struct SnapshotDataset<S = SqliteSnapshotRepository> {
    snapshots: S,
}

impl SnapshotDataset {
    pub fn open(pool: SqlitePool) -> Self {
        Self::new(SqliteSnapshotRepository::new(pool))
    }
}

impl<S: SnapshotRepository> SnapshotDataset<S> {
    pub fn new(snapshots: S) -> Self {
        Self { snapshots }
    }

    /// Number of stored snapshots. Grows while ingestion runs.
    pub async fn len(&self) -> Result<u64, DatasetError> {
        Ok(self.snapshots.snapshot_count().await?)
    }

    pub async fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.len().await? == 0)
    }

    /// `None` when `index` is past the end.
    pub async fn get(&self, index: u64) -> Result<Option<TrainingExample>, DatasetError> {
        let Some(snapshot) = self.snapshots.load_snapshot(index).await? else {
            return Ok(None);
        };
        to_example(index, &snapshot).map(Some)
    }

    /// Legal moves of the position before the move, as a move-class mask.
    pub async fn legal_move_mask(&self, index: u64) -> Result<Option<LegalMoveMask>, DatasetError> {
        let snapshot = self.snapshots.load_snapshot(index).await?;
        Ok(snapshot.map(|s| LegalMoveMask::from_indices(s.legal_moves)))
    }
}

fn to_example(index: u64, snapshot: &StoredSnapshot) -> Result<TrainingExample, DatasetError> {
    let corrupt = |reason: String| DatasetError::CorruptSnapshot { index, reason };

    let board = parse_fen(&snapshot.fen_before).map_err(|e| corrupt(e.to_string()))?;
    let side = PieceColor::from_fen_char(snapshot.side_to_move)
        .map(Color::from)
        .ok_or_else(|| corrupt(format!("side to move {:?}", snapshot.side_to_move)))?;

    Ok(TrainingExample {
        board: encode_board(&board),
        metadata: encode_metadata(side, snapshot.white_elo, snapshot.black_elo),
        move_class: snapshot.move_index,
    })
}
