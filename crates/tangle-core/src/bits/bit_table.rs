// Copyright 2025 The Tangle Developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

use rand::RngCore;

use super::bit_vec::{padded_u64s, randomize_u64s};
use super::word;
use super::word::WORD_BITS;

/// Transposes a 64x64 bit block held as one u64 per row, bit `c` of row `r`
/// being element (r, c).
pub fn transpose_64x64(a: &mut [u64; 64]) {
    let mut j: usize = 32;
    let mut m: u64 = 0x0000_0000_FFFF_FFFF;
    while j != 0 {
        let mut k = 0;
        while k < 64 {
            let t = ((a[k] >> j) ^ a[k + j]) & m;
            a[k + j] ^= t;
            a[k] ^= t << j;
            k = (k + j + 1) & !j;
        }
        j >>= 1;
        m ^= m << j;
    }
}

/// A dense 2d bit array.
///
/// Every row is padded to a whole number of SIMD words so rows can be handed
/// to the word-wise slice operations directly. The `square` constructor also
/// pads the row count to the padded column count, which is what the in-place
/// square transpose requires.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BitTable {
    words: Vec<u64>,
    num_major: usize,
    num_minor_bits: usize,
    u64s_per_row: usize,
}

impl BitTable {
    /// A zeroed table with exactly `num_major` rows of `num_minor_bits` columns.
    #[must_use]
    pub fn new(num_major: usize, num_minor_bits: usize) -> Self {
        let u64s_per_row = padded_u64s(num_minor_bits);
        BitTable {
            words: vec![0; num_major * u64s_per_row],
            num_major,
            num_minor_bits,
            u64s_per_row,
        }
    }

    /// A zeroed table padded to a square number of padded bits in both
    /// dimensions, as required by `square_transpose`.
    #[must_use]
    pub fn square(num_bits: usize) -> Self {
        let u64s_per_row = padded_u64s(num_bits);
        let num_major = u64s_per_row * 64;
        BitTable {
            words: vec![0; num_major * u64s_per_row],
            num_major,
            num_minor_bits: num_bits,
            u64s_per_row,
        }
    }

    /// A padded-square identity matrix over the first `num_bits` rows/cols.
    #[must_use]
    pub fn square_identity(num_bits: usize) -> Self {
        let mut result = BitTable::square(num_bits);
        for k in 0..num_bits {
            result.set(k, k, true);
        }
        result
    }

    #[must_use]
    pub fn num_major(&self) -> usize {
        self.num_major
    }

    #[must_use]
    pub fn num_minor_bits(&self) -> usize {
        self.num_minor_bits
    }

    #[must_use]
    pub fn u64s_per_row(&self) -> usize {
        self.u64s_per_row
    }

    #[inline]
    #[must_use]
    pub fn get(&self, major: usize, minor: usize) -> bool {
        debug_assert!(major < self.num_major);
        let w = major * self.u64s_per_row + (minor >> 6);
        (self.words[w] >> (minor & 63)) & 1 != 0
    }

    #[inline]
    pub fn toggle(&mut self, major: usize, minor: usize) {
        debug_assert!(major < self.num_major);
        let w = major * self.u64s_per_row + (minor >> 6);
        self.words[w] ^= 1u64 << (minor & 63);
    }

    #[inline]
    pub fn set(&mut self, major: usize, minor: usize, value: bool) {
        debug_assert!(major < self.num_major);
        let w = major * self.u64s_per_row + (minor >> 6);
        let mask = 1u64 << (minor & 63);
        if value {
            self.words[w] |= mask;
        } else {
            self.words[w] &= !mask;
        }
    }

    #[inline]
    #[must_use]
    pub fn row(&self, major: usize) -> &[u64] {
        let w = self.u64s_per_row;
        &self.words[major * w..major * w + w]
    }

    #[inline]
    pub fn row_mut(&mut self, major: usize) -> &mut [u64] {
        let w = self.u64s_per_row;
        &mut self.words[major * w..major * w + w]
    }

    /// Mutable views of two distinct rows at once.
    pub fn two_rows_mut(&mut self, a: usize, b: usize) -> (&mut [u64], &mut [u64]) {
        assert_ne!(a, b);
        let w = self.u64s_per_row;
        if a < b {
            let (lo, hi) = self.words.split_at_mut(b * w);
            (&mut lo[a * w..a * w + w], &mut hi[..w])
        } else {
            let (lo, hi) = self.words.split_at_mut(a * w);
            let (rb, ra) = (&mut lo[b * w..b * w + w], &mut hi[..w]);
            (ra, rb)
        }
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (ra, rb) = self.two_rows_mut(a, b);
        word::swap_slices(ra, rb);
    }

    /// `row[dst] ^= row[src]`.
    pub fn xor_row_into(&mut self, src: usize, dst: usize) {
        let (d, s) = self.two_rows_mut(dst, src);
        word::xor_into(d, s);
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Randomizes the first `num_bits` of a row.
    pub fn randomize_row<R: RngCore>(&mut self, major: usize, num_bits: usize, rng: &mut R) {
        randomize_u64s(self.row_mut(major), num_bits, rng);
    }

    /// Randomizes the whole backing store.
    pub fn randomize_all<R: RngCore>(&mut self, rng: &mut R) {
        for w in self.words.iter_mut() {
            *w = rng.next_u64();
        }
    }

    #[must_use]
    pub fn u64s(&self) -> &[u64] {
        &self.words
    }

    pub fn u64s_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    fn read_block(&self, block_row: usize, block_col: usize, out: &mut [u64; 64]) {
        for (r, o) in out.iter_mut().enumerate() {
            let row = block_row * 64 + r;
            *o = if row < self.num_major {
                self.words[row * self.u64s_per_row + block_col]
            } else {
                0
            };
        }
    }

    fn write_block(&mut self, block_row: usize, block_col: usize, data: &[u64; 64]) {
        for (r, d) in data.iter().enumerate() {
            let row = block_row * 64 + r;
            if row < self.num_major {
                self.words[row * self.u64s_per_row + block_col] = *d;
            }
        }
    }

    /// In-place transpose. Requires a `square`-constructed table.
    pub fn square_transpose(&mut self) {
        assert_eq!(self.num_major, self.u64s_per_row * 64);
        let nb = self.u64s_per_row;
        let mut block_a = [0u64; 64];
        let mut block_b = [0u64; 64];
        for bi in 0..nb {
            self.read_block(bi, bi, &mut block_a);
            transpose_64x64(&mut block_a);
            self.write_block(bi, bi, &block_a);
            for bj in bi + 1..nb {
                self.read_block(bi, bj, &mut block_a);
                self.read_block(bj, bi, &mut block_b);
                transpose_64x64(&mut block_a);
                transpose_64x64(&mut block_b);
                self.write_block(bj, bi, &block_a);
                self.write_block(bi, bj, &block_b);
            }
        }
    }

    /// A transposed copy, for rectangular tables. The result has one row per
    /// padded column of the input.
    #[must_use]
    pub fn transposed(&self) -> BitTable {
        let mut out = BitTable::new(self.u64s_per_row * 64, self.num_major);
        let mut block = [0u64; 64];
        let row_blocks = self.num_major.div_ceil(64);
        for bc in 0..self.u64s_per_row {
            for br in 0..row_blocks {
                self.read_block(br, bc, &mut block);
                transpose_64x64(&mut block);
                out.write_block(bc, br, &block);
            }
        }
        out
    }

    /// GF(2) matrix product over the leading `n` rows and columns. Both
    /// operands must be `square`-constructed with the same padding.
    #[must_use]
    pub fn square_mat_mul(&self, other: &BitTable, n: usize) -> BitTable {
        assert_eq!(self.u64s_per_row, other.u64s_per_row);
        let mut out = BitTable::square(self.num_minor_bits);
        for r in 0..n {
            for k in 0..n {
                if self.get(r, k) {
                    let w = out.u64s_per_row;
                    word::xor_into(&mut out.words[r * w..r * w + w], other.row(k));
                }
            }
        }
        out
    }

    /// Inverts the leading `n` by `n` corner, which must be lower triangular
    /// with a unit diagonal.
    #[must_use]
    pub fn inverse_assuming_lower_triangular(&self, n: usize) -> BitTable {
        let mut result = BitTable::square_identity(self.num_minor_bits);
        let mut copy_row = vec![0u64; self.u64s_per_row];
        for target in 0..n {
            copy_row.copy_from_slice(self.row(target));
            for pivot in 0..target {
                if (copy_row[pivot >> 6] >> (pivot & 63)) & 1 != 0 {
                    word::xor_into(&mut copy_row, self.row(pivot));
                    let (t_row, p_row) = result.two_rows_mut(target, pivot);
                    word::xor_into(t_row, p_row);
                }
            }
        }
        result
    }

    /// Assembles a padded-square `2n` by `2n` table from four `n` by `n`
    /// quadrants.
    #[must_use]
    pub fn from_quadrants(
        n: usize,
        top_left: &BitTable,
        top_right: &BitTable,
        bottom_left: &BitTable,
        bottom_right: &BitTable,
    ) -> BitTable {
        let mut out = BitTable::square(n * 2);
        for r in 0..n {
            for c in 0..n {
                out.set(r, c, top_left.get(r, c));
                out.set(r, c + n, top_right.get(r, c));
                out.set(r + n, c, bottom_left.get(r, c));
                out.set(r + n, c + n, bottom_right.get(r, c));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use rand::SeedableRng;

    #[test]
    fn transpose_64x64_round_trip() {
        let mut rng = SimRng::seed_from_u64(0);
        let mut block = [0u64; 64];
        for b in block.iter_mut() {
            *b = rng.next_u64();
        }
        let original = block;
        transpose_64x64(&mut block);
        for r in 0..64 {
            for c in 0..64 {
                assert_eq!((block[r] >> c) & 1, (original[c] >> r) & 1);
            }
        }
        transpose_64x64(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn square_transpose_matches_get() {
        let mut rng = SimRng::seed_from_u64(1);
        // Bigger than one SIMD word in both directions.
        let n = 300;
        let mut t = BitTable::square(n);
        for r in 0..n {
            t.randomize_row(r, n, &mut rng);
        }
        let before = t.clone();
        t.square_transpose();
        for r in 0..n {
            for c in 0..n {
                assert_eq!(t.get(r, c), before.get(c, r));
            }
        }
        t.square_transpose();
        assert_eq!(t, before);
    }

    #[test]
    fn rectangular_transposed_copy() {
        let mut rng = SimRng::seed_from_u64(2);
        let mut t = BitTable::new(5, 130);
        for r in 0..5 {
            t.randomize_row(r, 130, &mut rng);
        }
        let tr = t.transposed();
        for r in 0..5 {
            for c in 0..130 {
                assert_eq!(t.get(r, c), tr.get(c, r));
            }
        }
    }

    #[test]
    fn lower_triangular_inverse() {
        let mut rng = SimRng::seed_from_u64(3);
        let n = 70;
        let mut lower = BitTable::square_identity(n);
        for r in 0..n {
            lower.randomize_row(r, r, &mut rng);
            lower.set(r, r, true);
        }
        let inv = lower.inverse_assuming_lower_triangular(n);
        let product = lower.square_mat_mul(&inv, n);
        assert_eq!(product, BitTable::square_identity(n));
    }

    #[test]
    fn row_helpers() {
        let mut t = BitTable::new(4, 64);
        t.set(0, 3, true);
        t.set(1, 5, true);
        t.xor_row_into(0, 1);
        assert!(t.get(1, 3) && t.get(1, 5));
        t.swap_rows(0, 1);
        assert!(t.get(0, 5) && !t.get(1, 5));
    }
}
