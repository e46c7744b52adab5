//! Population cap management and diversity filtering (spec §4.5).
//!
//! `filter_by_variance` keeps the single most plausible hypergame, then
//! greedily grows the kept set by always admitting whichever remaining
//! model disagrees the most with what has been kept so far — the same
//! greedy-iterative-selection shape as the teacher's blueprint-building
//! loops in `mccfr::blueprint` (always take the next candidate that moves
//! the running aggregate the furthest, rather than solving the whole
//! selection as one combinatorial optimum).

use std::collections::HashSet;

use crate::error::HyperResult;
use crate::likelihood::LikelihoodTree;
use crate::model::Model;
use crate::rules::RulesEngine;
use crate::Probability;

/// posterior probability of every model in `models`, aligned index-for-
/// index: `getRelativeLikelihood(model.hashPath) / Σ same`, falling back to
/// a uniform `1.0` for every model when that sum is zero (spec §4.5
/// "degenerate fallback").
pub fn posterior_probabilities<E: RulesEngine>(
    tree: &LikelihoodTree,
    models: &[Model<E>],
) -> Vec<Probability> {
    let raw: Vec<f64> = models
        .iter()
        .map(|m| tree.relative_likelihood(m.hash_path()))
        .collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        vec![1.0; models.len()]
    } else {
        raw.into_iter().map(|r| r / total).collect()
    }
}

/// retain the highest-posterior model first, then iteratively admit the
/// model whose current-state fluent set has maximum symmetric difference
/// from the union of already-chosen states' fluents, breaking ties by
/// higher posterior and then by original order. Stops once `cap` models
/// are kept or `models` is exhausted (invariant I7).
pub fn filter_by_variance<E: RulesEngine>(
    engine: &E,
    tree: &LikelihoodTree,
    models: Vec<Model<E>>,
    cap: usize,
) -> HyperResult<Vec<Model<E>>> {
    if models.is_empty() || cap == 0 {
        return Ok(Vec::new());
    }

    let posteriors = posterior_probabilities(tree, &models);
    let mut fluents = Vec::with_capacity(models.len());
    for model in &models {
        let set: HashSet<E::Term> = engine
            .state_fluents(model.current_state())?
            .into_iter()
            .collect();
        fluents.push(set);
    }

    let mut remaining: Vec<usize> = (0..models.len()).collect();
    let first = remaining
        .iter()
        .copied()
        .max_by(|&a, &b| posteriors[a].total_cmp(&posteriors[b]))
        .expect("models is non-empty");
    remaining.retain(|&i| i != first);

    let mut chosen = vec![first];
    let mut union: HashSet<E::Term> = fluents[first].clone();

    while chosen.len() < cap && !remaining.is_empty() {
        let mut best_idx = 0usize;
        let mut best_diff = -1isize;
        let mut best_posterior = f64::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let diff = symmetric_difference_size(&fluents[idx], &union);
            let better = diff as isize > best_diff
                || (diff as isize == best_diff && posteriors[idx] > best_posterior);
            if better {
                best_idx = pos;
                best_diff = diff as isize;
                best_posterior = posteriors[idx];
            }
        }
        let idx = remaining.remove(best_idx);
        union.extend(fluents[idx].iter().cloned());
        chosen.push(idx);
    }

    let mut slots: Vec<Option<Model<E>>> = models.into_iter().map(Some).collect();
    Ok(chosen
        .into_iter()
        .map(|i| slots[i].take().expect("each index taken once"))
        .collect())
}

fn symmetric_difference_size<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> usize {
    a.symmetric_difference(b).count()
}
