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

pub mod bits;
pub mod buffer;
pub mod prob;
pub mod rng;
pub mod saturate;
pub mod sparse;

pub use bits::bit_table::BitTable;
pub use bits::bit_vec::BitVec;
pub use bits::word::{SimdWord, WORD_BITS, WORD_U64S};
pub use buffer::{MonoBuffer, Span};
pub use prob::{
    combine_independent_probabilities, depolarize1_independent_probability,
    depolarize2_independent_probability, for_samples, sample_hit_indices, RareErrorIterator,
};
pub use rng::{seeded_rng, SimRng};
pub use saturate::{add_saturate, mul_saturate};
pub use sparse::{xor_merge, SparseXorVec};
