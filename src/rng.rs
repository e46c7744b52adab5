//! A single, seedable source of randomness (spec §9 "Randomness").
//!
//! Every draw in the kernel — joint-move selection, rollout moves, weighted
//! sampling from likelihoods — goes through one `SmallRng` instance threaded
//! from the Agent Controller, so a fixed seed makes a turn fully
//! reproducible (spec §8 scenario 5, "Anytime monotonicity").

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub fn seeded(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// pick one element of `choices` with probability proportional to its
/// weight, using a single cumulative-weight scan against `rng`. Mirrors the
/// teacher's `strategy::policy::Policy::choose`. Returns `None` for an empty
/// or all-zero-weight slice.
pub fn weighted_choose<'a, T>(rng: &mut SmallRng, choices: &'a [(T, f64)]) -> Option<&'a T> {
    let total: f64 = choices.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }
    let roll = rng.random_range(0.0..total);
    let mut acc = 0.0;
    for (item, weight) in choices {
        acc += weight.max(0.0);
        if roll < acc {
            return Some(item);
        }
    }
    choices.last().map(|(item, _)| item)
}

/// pick one element of `choices` uniformly at random.
pub fn uniform_choose<'a, T>(rng: &mut SmallRng, choices: &'a [T]) -> Option<&'a T> {
    if choices.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..choices.len());
    choices.get(idx)
}
