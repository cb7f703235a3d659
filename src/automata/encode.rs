//! Wide character-class encoding.
//!
//! Code-unit ranges at or above the directly-indexable ASCII span are too
//! wide and too sparse for dense transition tables. Each unit is split into
//! a (hi byte, lo byte) pair and the set of matched lo bytes per hi byte
//! becomes a 256-bit vector. Two compressions apply on top:
//!
//! 1. Hi bytes whose lo vectors are identical are grouped: one vector
//!    records the group's hi-byte membership and one records the shared lo
//!    mask. Large contiguous ranges collapse to a single pair this way.
//! 2. Every vector is interned in a global pool keyed by value; disjoint
//!    ranges across lexical states very often produce identical masks, and
//!    reusing the pool position is the dominant space saving.
//!
//! Index allocation and pool insertion are append-only and order-preserving;
//! generated scanner code hardcodes pool positions as array offsets, so no
//! index, once issued, is ever reassigned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ASCII_SPAN;
use crate::LexerConfig;

/// A 256-bit vector, one bit per byte value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVec256(pub [u64; 4]);

impl BitVec256 {
    pub fn set(&mut self, bit: u8) {
        self.0[bit as usize / 64] |= 1u64 << (bit % 64);
    }

    pub fn get(&self, bit: u8) -> bool {
        self.0[bit as usize / 64] & (1u64 << (bit % 64)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Set bits, ascending.
    pub fn ones(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (word, &w) in self.0.iter().enumerate() {
            let mut bits = w;
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push((word * 64 + bit) as u8);
                bits &= bits - 1;
            }
        }
        out
    }
}

/// The encoded wide-move artifact for one automaton state.
///
/// `common_indices` holds pairs of pool positions, flattened: the first of
/// each pair is the hi-byte membership vector of a group of hi bytes that
/// share one lo mask, the second is that shared lo mask. `lo_byte_pairs`
/// lists the remaining hi bytes with their individual lo-mask positions, in
/// ascending hi-byte order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonAsciiMove {
    pub common_indices: Vec<u32>,
    pub lo_byte_pairs: Vec<(u8, u32)>,
}

/// Capacity of the scratch array: two pool indices per possible hi byte.
const SCRATCH_CAPACITY: usize = 512;

/// Deduplicating encoder for wide code-unit ranges.
///
/// One instance is owned per generation run and passed by mutable reference
/// into each lexical state's processing, so runs never interfere. The
/// lo/hi byte table, the bit-vector pool, and the per-state move pool are
/// shared across all lexical states of the run.
#[derive(Debug)]
pub struct CharClassEncoder {
    /// Bit-vector signature -> pool position. Values are dense, first-seen,
    /// never reused.
    lohi_byte_table: HashMap<BitVec256, u32>,
    /// Distinct bit vectors in interning order; position == table value.
    bit_vectors: Vec<BitVec256>,
    /// Working array for one state's common-group indices; reset between
    /// states, never persisted.
    scratch: Vec<u32>,
    /// When false, exceeding `SCRATCH_CAPACITY` is a bug.
    unbounded_scratch: bool,
    /// Encoded per-state moves, deduplicated by value. A generated scanner
    /// dispatches on positions in this pool.
    methods: Vec<NonAsciiMove>,
}

impl CharClassEncoder {
    pub fn new(config: &LexerConfig) -> Self {
        CharClassEncoder {
            lohi_byte_table: HashMap::new(),
            bit_vectors: Vec::new(),
            scratch: Vec::with_capacity(SCRATCH_CAPACITY),
            unbounded_scratch: config.unbounded_token_buffers,
            methods: Vec::new(),
        }
    }

    /// Encode a set of inclusive wide ranges into a move artifact, returning
    /// its position in the method pool. Identical range sets (and distinct
    /// range sets producing identical artifacts) share one position.
    pub fn encode(&mut self, ranges: &[(u16, u16)]) -> u32 {
        // One 256-bit lo mask per hi byte.
        let mut lo_masks = vec![BitVec256::default(); 256];
        for &(lo, hi) in ranges {
            debug_assert!(lo >= ASCII_SPAN && lo <= hi, "range below the ASCII span");
            for unit in lo..=hi {
                lo_masks[(unit >> 8) as usize].set((unit & 0xff) as u8);
            }
        }

        // Group hi bytes with identical lo masks; intern the membership
        // vector, then the shared mask, appending both positions to the
        // scratch prefix that becomes common_indices.
        self.scratch.clear();
        let mut done = [false; 256];
        for i in 0..256 {
            if done[i] || lo_masks[i].is_empty() {
                done[i] = true;
                continue;
            }
            let mut membership: Option<BitVec256> = None;
            for j in (i + 1)..256 {
                if done[j] || lo_masks[j] != lo_masks[i] {
                    continue;
                }
                done[j] = true;
                let members = membership.get_or_insert_with(|| {
                    done[i] = true;
                    let mut m = BitVec256::default();
                    m.set(i as u8);
                    m
                });
                members.set(j as u8);
            }
            if let Some(members) = membership {
                let hi_index = self.intern(members);
                self.push_scratch(hi_index);
                let lo_index = self.intern(lo_masks[i]);
                self.push_scratch(lo_index);
            }
        }
        let common_indices = self.scratch.clone();
        self.scratch.clear();

        // Remaining hi bytes carry individual masks, ascending.
        let mut lo_byte_pairs = Vec::new();
        for i in 0..256 {
            if !done[i] {
                let index = self.intern(lo_masks[i]);
                lo_byte_pairs.push((i as u8, index));
            }
        }

        let moves = NonAsciiMove { common_indices, lo_byte_pairs };
        if let Some(existing) = self.methods.iter().position(|m| *m == moves) {
            return existing as u32;
        }
        let index = self.methods.len() as u32;
        self.methods.push(moves);
        index
    }

    /// Reconstruct the exact set of matched code units from a stored move.
    pub fn decode(&self, method: u32) -> Vec<u16> {
        let moves = &self.methods[method as usize];
        let mut units = Vec::new();
        for pair in moves.common_indices.chunks_exact(2) {
            let members = &self.bit_vectors[pair[0] as usize];
            let mask = &self.bit_vectors[pair[1] as usize];
            for hi in members.ones() {
                for lo in mask.ones() {
                    units.push((hi as u16) << 8 | lo as u16);
                }
            }
        }
        for &(hi, index) in &moves.lo_byte_pairs {
            for lo in self.bit_vectors[index as usize].ones() {
                units.push((hi as u16) << 8 | lo as u16);
            }
        }
        units.sort_unstable();
        units
    }

    /// Pool position for a bit vector: existing on a signature hit, else the
    /// next dense index from the monotonic counter.
    fn intern(&mut self, vector: BitVec256) -> u32 {
        if let Some(&index) = self.lohi_byte_table.get(&vector) {
            return index;
        }
        let index = self.bit_vectors.len() as u32;
        self.bit_vectors.push(vector);
        self.lohi_byte_table.insert(vector, index);
        index
    }

    fn push_scratch(&mut self, index: u32) {
        assert!(
            self.unbounded_scratch || self.scratch.len() < SCRATCH_CAPACITY,
            "scratch overflow: more than {} common-group indices in one state",
            SCRATCH_CAPACITY
        );
        self.scratch.push(index);
    }

    /// Distinct bit vectors in interning order.
    pub fn bit_vectors(&self) -> &[BitVec256] {
        &self.bit_vectors
    }

    /// Number of allocated lo/hi byte table indices.
    pub fn lohi_byte_count(&self) -> usize {
        self.bit_vectors.len()
    }

    /// Encoded per-state moves in allocation order.
    pub fn methods(&self) -> &[NonAsciiMove] {
        &self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> CharClassEncoder {
        CharClassEncoder::new(&LexerConfig::default())
    }

    #[test]
    fn test_single_range_round_trip() {
        let mut enc = encoder();
        let method = enc.encode(&[(0x0391, 0x03A9)]);
        let units = enc.decode(method);
        assert_eq!(units, (0x0391..=0x03A9).collect::<Vec<u16>>());
    }

    #[test]
    fn test_identical_masks_share_pool_position() {
        let mut enc = encoder();
        // Same lo-byte span under two different hi bytes.
        let a = enc.encode(&[(0x0110, 0x0120)]);
        let b = enc.encode(&[(0x0210, 0x0220)]);
        assert_ne!(a, b, "different hi bytes are distinct moves");

        let pair_a = enc.methods()[a as usize].lo_byte_pairs[0];
        let pair_b = enc.methods()[b as usize].lo_byte_pairs[0];
        assert_eq!(pair_a.1, pair_b.1, "identical lo masks must share a pool position");
        assert_ne!(pair_a.0, pair_b.0);
    }

    #[test]
    fn test_identical_range_sets_share_method() {
        let mut enc = encoder();
        let a = enc.encode(&[(0x4E00, 0x4E10)]);
        let b = enc.encode(&[(0x4E00, 0x4E10)]);
        assert_eq!(a, b);
        assert_eq!(enc.methods().len(), 1);
    }

    #[test]
    fn test_full_hi_bytes_grouped() {
        let mut enc = encoder();
        // 0x0200..=0x04FF covers hi bytes 2, 3, 4 completely; all three share
        // the all-ones lo mask and collapse into one common group.
        let method = enc.encode(&[(0x0200, 0x04FF)]);
        let moves = &enc.methods()[method as usize];
        assert_eq!(moves.common_indices.len(), 2);
        assert!(moves.lo_byte_pairs.is_empty());

        let members = enc.bit_vectors()[moves.common_indices[0] as usize];
        assert_eq!(members.ones(), vec![2, 3, 4]);
        let mask = enc.bit_vectors()[moves.common_indices[1] as usize];
        assert_eq!(mask.ones().len(), 256);

        assert_eq!(enc.decode(method), (0x0200..=0x04FF).collect::<Vec<u16>>());
    }

    #[test]
    fn test_mixed_group_and_singleton() {
        let mut enc = encoder();
        // Hi bytes 1 and 2 share a full span; hi byte 3 has a partial one.
        let method = enc.encode(&[(0x0100, 0x02FF), (0x0300, 0x0310)]);
        let moves = &enc.methods()[method as usize];
        assert_eq!(moves.common_indices.len(), 2);
        assert_eq!(moves.lo_byte_pairs.len(), 1);
        assert_eq!(moves.lo_byte_pairs[0].0, 3);

        let mut expected: Vec<u16> = (0x0100..=0x02FF).collect();
        expected.extend(0x0300..=0x0310);
        assert_eq!(enc.decode(method), expected);
    }

    #[test]
    fn test_pool_indices_dense_and_stable() {
        let mut enc = encoder();
        enc.encode(&[(0x0080, 0x0085)]);
        let count_after_first = enc.lohi_byte_count();
        enc.encode(&[(0x0080, 0x0085)]);
        assert_eq!(enc.lohi_byte_count(), count_after_first, "re-encoding allocates nothing");

        enc.encode(&[(0x0090, 0x0095)]);
        assert!(enc.lohi_byte_count() > count_after_first);

        // Pool has no structural duplicates.
        for (i, a) in enc.bit_vectors().iter().enumerate() {
            for b in &enc.bit_vectors()[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_lowest_wide_units() {
        let mut enc = encoder();
        // 0x80..=0xFF sits under hi byte 0.
        let method = enc.encode(&[(0x0080, 0x00FF)]);
        assert_eq!(enc.decode(method), (0x0080..=0x00FF).collect::<Vec<u16>>());
    }
}
