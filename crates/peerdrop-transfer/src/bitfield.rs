/// Per-transfer chunk tracking using a compact bitfield.
///
/// One bit per chunk index, `ceil(total / 64)` words. The sender uses it as
/// its set of acknowledged chunks.

/// Compact bitfield tracking which chunks of a transfer are done.
#[derive(Debug, Clone)]
pub struct ChunkBitfield {
    bits: Vec<u64>,
    total: u32,
    set_count: u32,
}

impl ChunkBitfield {
    /// Create an empty bitfield for a transfer with `total` chunks.
    pub fn new(total: u32) -> Self {
        Self {
            bits: vec![0u64; (total as usize).div_ceil(64)],
            total,
            set_count: 0,
        }
    }

    /// Mark a chunk. Returns true if it was newly set (not duplicate, in range).
    #[inline]
    pub fn set(&mut self, index: u32) -> bool {
        if index >= self.total {
            return false;
        }
        let word = index as usize / 64;
        let mask = 1u64 << (index % 64);
        if self.bits[word] & mask != 0 {
            return false;
        }
        self.bits[word] |= mask;
        self.set_count += 1;
        true
    }

    /// Check if a chunk is marked.
    #[inline]
    pub fn get(&self, index: u32) -> bool {
        if index >= self.total {
            return false;
        }
        self.bits[index as usize / 64] & (1u64 << (index % 64)) != 0
    }

    /// Returns true once every chunk is marked.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.set_count >= self.total
    }

    /// Number of marked chunks.
    #[inline]
    pub fn count(&self) -> u32 {
        self.set_count
    }

    /// First unmarked index at or after `from`, or `total` if there is none.
    pub fn first_unset_from(&self, from: u32) -> u32 {
        let mut index = from;
        while index < self.total && self.get(index) {
            index += 1;
        }
        index
    }
}
