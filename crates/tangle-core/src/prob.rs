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

use rand::Rng;

/// Yields the indices of hits sampled from a Bernoulli distribution.
///
/// Each call to `next` advances by a geometric-distributed skip, so the cost
/// is proportional to the expected number of hits rather than the number of
/// attempts. Gets more efficient as the hit probability drops.
pub struct RareErrorIterator {
    next_candidate: usize,
    log_one_minus_p: f64,
}

impl RareErrorIterator {
    /// Requires `0 < probability < 1`.
    #[must_use]
    pub fn new(probability: f64) -> Self {
        debug_assert!(probability > 0.0 && probability < 1.0);
        RareErrorIterator {
            next_candidate: 0,
            log_one_minus_p: (-probability).ln_1p(),
        }
    }

    /// The next hit index. Indices are strictly increasing.
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> usize {
        let u: f64 = rng.random();
        // Inversion sampling of the geometric skip length. u == 0 maps to an
        // effectively infinite skip, which callers treat as "no more hits".
        let skip = (u.ln() / self.log_one_minus_p).floor();
        let result = self.next_candidate.saturating_add(skip as usize);
        self.next_candidate = result.saturating_add(1);
        result
    }
}

/// Calls `body` with each hit index among `attempts` independent Bernoulli
/// trials with the given probability.
pub fn for_samples<R: Rng, F: FnMut(usize)>(
    probability: f64,
    attempts: usize,
    rng: &mut R,
    mut body: F,
) {
    assert!(
        (0.0..=1.0).contains(&probability),
        "probability out of range: {probability}"
    );
    if probability == 0.0 || attempts == 0 {
        return;
    }
    if probability == 1.0 {
        for k in 0..attempts {
            body(k);
        }
        return;
    }
    let mut skipper = RareErrorIterator::new(probability);
    loop {
        let k = skipper.next(rng);
        if k >= attempts {
            return;
        }
        body(k);
    }
}

/// Collects the hit indices among `attempts` Bernoulli trials into a vector,
/// for callers that need the RNG free while processing hits.
#[must_use]
pub fn sample_hit_indices<R: Rng>(probability: f64, attempts: usize, rng: &mut R) -> Vec<usize> {
    let mut hits = Vec::new();
    for_samples(probability, attempts, rng, |k| hits.push(k));
    hits
}

/// Combines the chance of flipping under two independent error sources:
/// exactly one of the two must fire.
#[inline]
#[must_use]
pub fn combine_independent_probabilities(p1: f64, p2: f64) -> f64 {
    p1 * (1.0 - p2) + (1.0 - p1) * p2
}

/// Converts a `DEPOLARIZE1` channel probability into the probability of each
/// of the three independent basis errors that compose to it.
#[must_use]
pub fn depolarize1_independent_probability(p: f64) -> f64 {
    0.5 - 0.5 * (1.0 - 4.0 * p / 3.0).sqrt()
}

/// Converts a `DEPOLARIZE2` channel probability into the probability of each
/// of the fifteen independent basis errors that compose to it.
#[must_use]
pub fn depolarize2_independent_probability(p: f64) -> f64 {
    0.5 - 0.5 * (1.0 - 16.0 * p / 15.0).powf(0.125)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use rand::SeedableRng;

    #[test]
    fn extreme_probabilities() {
        let mut rng = SimRng::seed_from_u64(0);
        let mut hits = Vec::new();
        for_samples(0.0, 100, &mut rng, |k| hits.push(k));
        assert!(hits.is_empty());
        for_samples(1.0, 5, &mut rng, |k| hits.push(k));
        assert_eq!(hits, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn hit_rate_tracks_probability() {
        let mut rng = SimRng::seed_from_u64(7);
        let attempts = 100_000;
        let mut count = 0usize;
        for_samples(0.01, attempts, &mut rng, |_| count += 1);
        // Mean 1000, sigma ~31.5.
        assert!((700..1300).contains(&count), "count = {count}");
    }

    #[test]
    fn hits_are_strictly_increasing_and_in_range() {
        let mut rng = SimRng::seed_from_u64(9);
        let mut last = None;
        for_samples(0.5, 1000, &mut rng, |k| {
            assert!(k < 1000);
            if let Some(prev) = last {
                assert!(k > prev);
            }
            last = Some(k);
        });
    }

    #[test]
    fn depolarize_conversions() {
        // p -> 0 keeps the per-basis probability near p/2 * (4/3) / 2.
        assert!(depolarize1_independent_probability(0.0).abs() < 1e-12);
        assert!(depolarize2_independent_probability(0.0).abs() < 1e-12);
        // Composing three independent p-errors reproduces depolarize1(P).
        let big_p = 0.3;
        let p = depolarize1_independent_probability(big_p);
        // Probability the net effect is identity: each of X,Z,Y=XZ flips
        // cancel pairwise; closed form check instead: 3 independent errors
        // each with prob p give a uniform non-identity rate of
        // 3 * (p(1-p)^2 + p^2(1-p)) + ... simplest check is the inverse map.
        let back = 0.75 * (1.0 - (1.0 - 2.0 * p) * (1.0 - 2.0 * p));
        assert!((back - big_p).abs() < 1e-12);
    }

    #[test]
    fn independent_composition() {
        assert_eq!(combine_independent_probabilities(0.0, 0.25), 0.25);
        assert_eq!(combine_independent_probabilities(0.25, 0.0), 0.25);
        let p = combine_independent_probabilities(0.5, 0.5);
        assert!((p - 0.5).abs() < 1e-12);
    }
}
