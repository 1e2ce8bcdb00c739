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

use super::word;
use super::word::WORD_BITS;

/// Number of u64s needed to hold `bits` bits, rounded up to whole SIMD words.
#[inline]
pub(crate) fn padded_u64s(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS) * word::WORD_U64S
}

/// Fills the first `num_bits` of a row with random bits, leaving the rest alone.
pub(crate) fn randomize_u64s<R: RngCore>(words: &mut [u64], num_bits: usize, rng: &mut R) {
    let full = num_bits / 64;
    for w in words.iter_mut().take(full) {
        *w = rng.next_u64();
    }
    let rem = num_bits % 64;
    if rem != 0 {
        let mask = (1u64 << rem) - 1;
        words[full] = (words[full] & !mask) | (rng.next_u64() & mask);
    }
}

/// A dense bit vector padded to a whole number of SIMD words.
///
/// Bits at positions `num_bits..` are kept zero so popcounts and zero tests
/// can run over whole words.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct BitVec {
    words: Vec<u64>,
    num_bits: usize,
}

impl BitVec {
    /// An all-zero vector holding `num_bits` bits.
    #[must_use]
    pub fn zeros(num_bits: usize) -> Self {
        BitVec {
            words: vec![0; padded_u64s(num_bits)],
            num_bits,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.num_bits);
        (self.words[index >> 6] >> (index & 63)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index & 63);
        if value {
            self.words[index >> 6] |= mask;
        } else {
            self.words[index >> 6] &= !mask;
        }
    }

    #[inline]
    pub fn toggle(&mut self, index: usize) {
        debug_assert!(index < self.num_bits);
        self.words[index >> 6] ^= 1u64 << (index & 63);
    }

    /// `self ^= other`. Both vectors must have the same length.
    pub fn xor_assign(&mut self, other: &BitVec) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        word::xor_into(&mut self.words, &other.words);
    }

    /// `self &= other`.
    pub fn and_assign(&mut self, other: &BitVec) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        word::and_into(&mut self.words, &other.words);
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Flips every bit below `len()`.
    pub fn invert_bits(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        self.mask_padding();
    }

    #[must_use]
    pub fn not_zero(&self) -> bool {
        !word::is_zero_slice(&self.words)
    }

    #[must_use]
    pub fn popcount(&self) -> usize {
        word::popcount_slice(&self.words)
    }

    /// Randomizes the first `num_bits` bits.
    pub fn randomize<R: RngCore>(&mut self, num_bits: usize, rng: &mut R) {
        debug_assert!(num_bits <= self.num_bits);
        randomize_u64s(&mut self.words, num_bits, rng);
    }

    #[must_use]
    pub fn u64s(&self) -> &[u64] {
        &self.words
    }

    pub fn u64s_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    /// Copies another vector's bits into this one. Lengths must match.
    pub fn copy_from(&mut self, other: &BitVec) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        self.words.copy_from_slice(&other.words);
    }

    fn mask_padding(&mut self) {
        let rem = self.num_bits % 64;
        let full = self.num_bits / 64;
        if rem != 0 {
            self.words[full] &= (1u64 << rem) - 1;
        }
        for w in self.words.iter_mut().skip(full + usize::from(rem != 0)) {
            *w = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use rand::SeedableRng;

    #[test]
    fn get_set_toggle() {
        let mut v = BitVec::zeros(300);
        assert_eq!(v.len(), 300);
        assert!(!v.not_zero());
        v.set(0, true);
        v.set(299, true);
        v.toggle(137);
        assert!(v.get(0) && v.get(137) && v.get(299));
        assert_eq!(v.popcount(), 3);
        v.toggle(137);
        assert_eq!(v.popcount(), 2);
    }

    #[test]
    fn xor_and_invert() {
        let mut a = BitVec::zeros(65);
        let mut b = BitVec::zeros(65);
        a.set(64, true);
        b.set(64, true);
        b.set(3, true);
        a.xor_assign(&b);
        assert!(!a.get(64));
        assert!(a.get(3));
        a.invert_bits();
        assert_eq!(a.popcount(), 64);
        assert!(!a.get(3));
        // Padding beyond bit 65 stays clear.
        assert_eq!(a.u64s()[1], 1);
    }

    #[test]
    fn randomize_prefix_only() {
        let mut rng = SimRng::seed_from_u64(5);
        let mut v = BitVec::zeros(200);
        v.randomize(70, &mut rng);
        for k in 70..200 {
            assert!(!v.get(k));
        }
        // Same seed, same bits.
        let mut rng2 = SimRng::seed_from_u64(5);
        let mut v2 = BitVec::zeros(200);
        v2.randomize(70, &mut rng2);
        assert_eq!(v, v2);
    }
}
