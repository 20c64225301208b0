// Seeded, portable pseudo-random number generator for the village sim.
//
// xoshiro256++ (Blackman & Vigna, 2019) expanded from a single `u64` seed via
// SplitMix64. Every random decision in the game (task rolls, trainee names,
// outcome draws, entity IDs) goes through a `GameRng`, so a seed plus a
// command log reproduces a session exactly. That is what lets the scenario
// tests replay assignment races deterministically.
//
// On top of the raw generator this crate carries the small sampling helpers
// the game balance needs: uniform picks from slices, weighted picks, and the
// symmetric "deviate" jitter used for task points and experience.
//
// The core generator uses integer arithmetic only. The float helpers derive
// from `next_f64`, which is exact given the same `u64` stream.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ state. Cheap to clone; clones continue the same stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Seed a generator. Equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f64` in [0, 1), built from the top 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// 16 random bytes, the raw material for entity UUIDs.
    pub fn next_128_bits(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        out[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        out
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo
    /// bias. Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform integer in `[low, high]`. Panics if `low > high`.
    pub fn range_u64_inclusive(&mut self, low: u64, high: u64) -> u64 {
        assert!(low <= high, "range_u64_inclusive: low must be <= high");
        if high == u64::MAX {
            if low == 0 {
                return self.next_u64();
            }
            return self.range_u64(low - 1, high) + 1;
        }
        self.range_u64(low, high + 1)
    }

    /// Uniform index in `[0, len)`. Panics if `len == 0`.
    pub fn range_usize(&mut self, len: usize) -> usize {
        self.range_u64(0, len as u64) as usize
    }

    /// `true` with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// A uniformly chosen element, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.range_usize(items.len()))
    }

    /// Pick a value from `(value, weight)` pairs with probability
    /// proportional to its weight. Zero-weight entries are never chosen;
    /// returns `None` if the total weight is zero.
    pub fn pick_weighted<T: Copy>(&mut self, table: &[(T, u32)]) -> Option<T> {
        let total: u64 = table.iter().map(|&(_, w)| u64::from(w)).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.range_u64(0, total);
        for &(value, weight) in table {
            let weight = u64::from(weight);
            if roll < weight {
                return Some(value);
            }
            roll -= weight;
        }
        None
    }

    /// `value` scaled by a uniform factor in `[1 - fraction, 1 + fraction)`.
    pub fn deviate(&mut self, value: f64, fraction: f64) -> f64 {
        let factor = 1.0 - fraction + self.next_f64() * 2.0 * fraction;
        value * factor
    }
}

/// SplitMix64 step, used only to expand seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = GameRng::new(7);
        let mut b = GameRng::new(7);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = GameRng::new(7);
        let mut b = GameRng::new(8);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_stays_in_unit_interval() {
        let mut rng = GameRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn inclusive_range_hits_both_ends() {
        let mut rng = GameRng::new(99);
        let mut seen = [false; 5];
        for _ in 0..10_000 {
            let v = rng.range_u64_inclusive(1, 5);
            assert!((1..=5).contains(&v));
            seen[(v - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s), "every value in 1..=5 should appear");
    }

    #[test]
    fn inclusive_range_accepts_full_width() {
        let mut rng = GameRng::new(1);
        let v = rng.range_u64_inclusive(u64::MAX - 1, u64::MAX);
        assert!(v >= u64::MAX - 1);
        rng.range_u64_inclusive(0, u64::MAX);
    }

    #[test]
    fn pick_empty_is_none() {
        let mut rng = GameRng::new(1);
        let empty: [u8; 0] = [];
        assert!(rng.pick(&empty).is_none());
        assert_eq!(rng.pick(&[42]), Some(&42));
    }

    #[test]
    fn weighted_pick_follows_weights() {
        let mut rng = GameRng::new(2024);
        let table = [(0u32, 10), (1, 5), (2, 2), (3, 1), (4, 0)];
        let mut counts = [0u32; 5];
        let n = 18_000;
        for _ in 0..n {
            let v = rng.pick_weighted(&table).unwrap();
            counts[v as usize] += 1;
        }
        assert_eq!(counts[4], 0, "zero weight must never be picked");
        // Level 0 carries 10/18 of the weight.
        let share = counts[0] as f64 / n as f64;
        assert!((0.52..0.59).contains(&share), "share was {share}");
        assert!(counts[0] > counts[1] && counts[1] > counts[2] && counts[2] > counts[3]);
    }

    #[test]
    fn weighted_pick_all_zero_is_none() {
        let mut rng = GameRng::new(2);
        assert_eq!(rng.pick_weighted(&[(1u8, 0), (2, 0)]), None);
    }

    #[test]
    fn deviate_stays_within_fraction() {
        let mut rng = GameRng::new(5);
        for _ in 0..10_000 {
            let v = rng.deviate(100.0, 0.15);
            assert!((85.0..115.0).contains(&v), "deviate out of range: {v}");
        }
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = GameRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn serialized_state_resumes_stream() {
        let mut rng = GameRng::new(42);
        for _ in 0..50 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: GameRng = serde_json::from_str(&json).unwrap();
        for _ in 0..50 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
