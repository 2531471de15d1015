//! Seeded outcome sampler.
//!
//! Every draw comes from an explicit [`DiceRng`]; nothing in the engine touches an
//! ambient generator. A `(seed, stream)` pair fully determines the sequence of
//! faces, so a run can be replayed from the seed it reports.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rollquest_types::constants::FACES;
use rollquest_types::{Distribution, Face};

/// Deterministic random source for dice outcomes.
#[derive(Clone, Debug)]
pub struct DiceRng {
    rng: ChaCha20Rng,
    seed: u64,
    stream: u64,
}

impl DiceRng {
    pub fn from_seed(seed: u64) -> Self {
        Self::for_stream(seed, 0)
    }

    /// Independent keystream `stream` derived from `seed`.
    ///
    /// Streams sharing a seed never overlap, which is what batch runs rely on.
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self { rng, seed, stream }
    }

    /// Fresh generator seeded from OS entropy. The chosen seed is retained.
    pub fn from_entropy() -> Self {
        Self::from_seed(generate_seed())
    }

    /// Seeded when `seed` is provided, otherwise from entropy.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map(Self::from_seed).unwrap_or_else(Self::from_entropy)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream(&self) -> u64 {
        self.stream
    }

    /// Raw 64-bit draw, used to derive seeds for child runs.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Draw a face from `distribution` by inverting its cumulative weights.
    pub fn sample(&mut self, distribution: &Distribution) -> Face {
        let u = self.next_unit();
        face_for_unit(distribution, u)
    }

    pub fn sample_many(&mut self, distribution: &Distribution, n: usize) -> Vec<Face> {
        (0..n).map(|_| self.sample(distribution)).collect()
    }

    /// Uniformly random face, independent of any weighting.
    pub fn roll_uniform_face(&mut self) -> Face {
        let index = self.rng.gen_range(0..FACES);
        Face::from_index(index).unwrap_or(Face::ONE)
    }
}

/// Seed for runs that did not ask for one.
pub fn generate_seed() -> u64 {
    rand::rngs::OsRng.next_u64()
}

/// Face selected by `u` in `[0, 1)`: the first face whose cumulative weight exceeds `u`.
///
/// Faces with zero weight are never returned. Rounding slack at the top of the
/// cumulative sum falls to the last face with positive weight.
pub fn face_for_unit(distribution: &Distribution, u: f64) -> Face {
    let mut cumulative = 0.0;
    let mut last_positive = Face::ONE;
    for face in Face::all() {
        let p = distribution.probability(face);
        if p <= 0.0 {
            continue;
        }
        cumulative += p;
        last_positive = face;
        if u < cumulative {
            return face;
        }
    }
    last_positive
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let fair = Distribution::fair();
        let a = DiceRng::from_seed(42).sample_many(&fair, 64);
        let b = DiceRng::from_seed(42).sample_many(&fair, 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_streams_differ() {
        let fair = Distribution::fair();
        let a = DiceRng::for_stream(7, 0).sample_many(&fair, 64);
        let b = DiceRng::for_stream(7, 1).sample_many(&fair, 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_face_for_unit_boundaries() {
        let fair = Distribution::fair();
        assert_eq!(face_for_unit(&fair, 0.0), Face::ONE);
        assert_eq!(face_for_unit(&fair, 0.17).value(), 2);
        assert_eq!(face_for_unit(&fair, 0.999_999), Face::SIX);
    }

    #[test]
    fn test_zero_weight_faces_skipped() {
        let dist = Distribution::tweaked(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        for u in [0.0, 0.25, 0.5, 0.999_999] {
            assert_eq!(face_for_unit(&dist, u).value(), 3);
        }
        let mut rng = DiceRng::from_seed(1);
        assert!(rng.sample_many(&dist, 100).iter().all(|f| f.value() == 3));
    }

    #[test]
    fn test_fair_frequencies_close_to_one_sixth() {
        let fair = Distribution::fair();
        let mut rng = DiceRng::from_seed(2024);
        let mut counts = [0u64; FACES];
        let n = 60_000;
        for face in rng.sample_many(&fair, n) {
            counts[face.index()] += 1;
        }
        for count in counts {
            let freq = count as f64 / n as f64;
            assert!((freq - 1.0 / 6.0).abs() < 0.01, "frequency {freq} too far from 1/6");
        }
    }

    #[test]
    fn test_biased_distribution_is_respected() {
        let dist = Distribution::tweaked(&[0.5, 0.1, 0.1, 0.1, 0.1, 0.1]).unwrap();
        let mut rng = DiceRng::from_seed(99);
        let n = 50_000;
        let ones = rng
            .sample_many(&dist, n)
            .into_iter()
            .filter(|face| *face == Face::ONE)
            .count();
        let freq = ones as f64 / n as f64;
        assert!((freq - 0.5).abs() < 0.01, "frequency {freq} too far from 0.5");
    }

    proptest! {
        #[test]
        fn sample_always_in_range(
            seed in any::<u64>(),
            weights in proptest::collection::vec(0.0f64..5.0, 6),
        ) {
            prop_assume!(weights.iter().sum::<f64>() > 0.0);
            let dist = Distribution::tweaked(&weights).unwrap();
            let mut rng = DiceRng::from_seed(seed);
            for _ in 0..32 {
                let face = rng.sample(&dist);
                prop_assert!((1..=6).contains(&face.value()));
                prop_assert!(dist.probability(face) > 0.0);
            }
        }
    }
}
