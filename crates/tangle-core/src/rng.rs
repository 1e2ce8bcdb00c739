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

use rand::SeedableRng;
pub use rand_chacha::ChaCha8Rng;

/// The simulator RNG. One instance per simulator; never shared.
pub type SimRng = ChaCha8Rng;

/// Builds a simulator RNG from an explicit seed, or from OS entropy when no
/// seed is given. The same seed always yields the same stream.
#[must_use]
pub fn seeded_rng(seed: Option<u64>) -> SimRng {
    match seed {
        Some(seed) => SimRng::seed_from_u64(seed),
        None => SimRng::from_os_rng(),
    }
}
