use cozy_chess::Board;
use smallvec::SmallVec;

use super::moves::{move_index, MOVE_SPACE_SIZE};
use crate::{rules, uci};

const WORDS: usize = MOVE_SPACE_SIZE.div_ceil(64);

/// Bitset over the move-class space: bit `i` is set when move class `i` is
/// legal in the position.
#[derive(Clone, PartialEq, Eq)]
pub struct LegalMoveMask {
    words: [u64; WORDS],
}

impl LegalMoveMask {
    pub fn empty() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Build a mask from move-class indices. Indices outside the move space
    /// are ignored.
    pub fn from_indices<I: IntoIterator<Item = u16>>(indices: I) -> Self {
        let mut mask = Self::empty();
        for index in indices {
            mask.insert(index);
        }
        mask
    }

    pub fn insert(&mut self, index: u16) {
        let i = usize::from(index);
        if i < MOVE_SPACE_SIZE {
            self.words[i / 64] |= 1 << (i % 64);
        }
    }

    pub fn contains(&self, index: u16) -> bool {
        let i = usize::from(index);
        i < MOVE_SPACE_SIZE && self.words[i / 64] & (1 << (i % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set indices in ascending order.
    pub fn indices(&self) -> SmallVec<[u16; 64]> {
        let mut out = SmallVec::new();
        for (w, &word) in self.words.iter().enumerate() {
            let mut bits = word;
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push((w * 64 + bit) as u16);
                bits &= bits - 1;
            }
        }
        out
    }

    /// Dense `0.0`/`1.0` vector of length `MOVE_SPACE_SIZE`.
    pub fn to_dense(&self) -> Vec<f32> {
        (0..MOVE_SPACE_SIZE)
            .map(|i| if self.contains(i as u16) { 1.0 } else { 0.0 })
            .collect()
    }
}

impl std::fmt::Debug for LegalMoveMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}

/// Mask of the move classes legal in `board`.
pub fn legal_move_mask(board: &Board) -> LegalMoveMask {
    let index = move_index();
    let mut mask = LegalMoveMask::empty();
    for mv in rules::legal_moves(board) {
        let standard = uci::to_standard_castling(board, mv);
        // every legal move has a class; skip rather than panic if not
        if let Ok(class) = index.encode_move(standard) {
            mask.insert(class);
        }
    }
    mask
}

/// Serialise ascending move-class indices as little-endian `u16`s.
pub fn encode_index_list(indices: &[u16]) -> Vec<u8> {
    indices.iter().flat_map(|i| i.to_le_bytes()).collect()
}

/// Inverse of [`encode_index_list`]. A trailing odd byte is ignored.
pub fn decode_index_list(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
