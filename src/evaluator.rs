//! Anytime, hypergame-weighted Monte-Carlo move selection (spec §4.6).
//!
//! For every candidate move, every live hypergame contributes a rollout
//! estimate weighted by its posterior raised to `likelihoodPowerFactor`; the
//! evaluator keeps a running mean per move across outer-loop depths until
//! the deadline or `maxNumProbes` depths are exhausted, then returns the
//! move with the greatest mean. Anytime: depth 0 falls back to the first
//! candidate move, the same anytime shape as the teacher's MCCFR training
//! loop bailing out to its current blueprint on a deadline
//! (`mccfr::trainer::Trainer::train`).

use std::collections::HashSet;
use std::time::Instant;

use rand::rngs::SmallRng;

use crate::config::Config;
use crate::error::{HyperError, HyperResult};
use crate::metrics::TurnMetrics;
use crate::model::Model;
use crate::rng::uniform_choose;
use crate::rules::RulesEngine;
use crate::sampler::Sampler;
use crate::Probability;

pub struct Evaluator<'a, E: RulesEngine> {
    engine: &'a E,
    agent: E::Role,
}

impl<'a, E: RulesEngine> Evaluator<'a, E> {
    pub fn new(engine: &'a E, agent: E::Role) -> Self {
        Self { engine, agent }
    }

    /// the agent's own moves considered by the population at `step`: the
    /// union, in first-seen order, of each model's cached legal-move set
    /// (or, absent a cache, a fresh Rules Engine query). Order is kept
    /// stable so tie-breaking among equal running means is deterministic.
    pub fn candidate_moves(&self, population: &[Model<E>], step: usize) -> HyperResult<Vec<E::Move>> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for model in population {
            let legal: Vec<E::Move> = match model.legal_moves_at(step) {
                Some(set) => set.iter().cloned().collect(),
                None => self
                    .engine
                    .legal_moves(model.current_state(), self.agent)
                    .map_err(HyperError::from)?,
            };
            for mv in legal {
                if seen.insert(mv.clone()) {
                    ordered.push(mv);
                }
            }
        }
        Ok(ordered)
    }

    /// §4.6: run outer-loop depths of weighted rollouts until `deadline` or
    /// `config.max_num_probes`, and return the move with the greatest
    /// running mean. Falls back to `fallback` (typically the first known
    /// legal move) if no rollout ever completed.
    #[allow(clippy::too_many_arguments)]
    pub fn select(
        &self,
        population: &[Model<E>],
        posteriors: &[Probability],
        candidates: &[E::Move],
        step: usize,
        config: &Config,
        deadline: Instant,
        sampler: &Sampler<E>,
        rng: &mut SmallRng,
        metrics: &mut TurnMetrics,
    ) -> HyperResult<Option<E::Move>> {
        if candidates.is_empty() || population.is_empty() {
            return Ok(None);
        }

        let mut sums = vec![0.0f64; candidates.len()];
        let mut counts = vec![0usize; candidates.len()];
        let mut depth = 0usize;

        while depth < config.max_num_probes && Instant::now() < deadline {
            for (ci, mv) in candidates.iter().enumerate() {
                for (model, &posterior) in population.iter().zip(posteriors.iter()) {
                    if config.exclude_zero_posterior && posterior <= 0.0 {
                        continue;
                    }
                    let contribution = self.rollout_contribution(model, mv, step, posterior, config, sampler, rng, metrics)?;
                    sums[ci] += contribution;
                    counts[ci] += 1;
                }
            }
            depth += 1;
            metrics.rollout_depth = depth;
        }

        let best = (0..candidates.len())
            .filter(|&i| counts[i] > 0)
            .max_by(|&a, &b| {
                let ma = sums[a] / counts[a] as f64;
                let mb = sums[b] / counts[b] as f64;
                ma.total_cmp(&mb)
            });

        Ok(best.map(|i| candidates[i].clone()))
    }

    #[allow(clippy::too_many_arguments)]
    fn rollout_contribution(
        &self,
        model: &Model<E>,
        mv: &E::Move,
        step: usize,
        posterior: Probability,
        config: &Config,
        sampler: &Sampler<E>,
        rng: &mut SmallRng,
        metrics: &mut TurnMetrics,
    ) -> HyperResult<f64> {
        let contributes = model.legal_moves_at(step).is_none_or(|legal| legal.contains(mv));
        if !contributes {
            return Ok(0.0);
        }
        let joints = self
            .engine
            .joint_moves(model.current_state())
            .map_err(HyperError::from)?
            .into_iter()
            .filter(|j| j.get(self.agent) == Some(mv))
            .collect::<Vec<_>>();
        let Some(joint) = uniform_choose(rng, &joints) else {
            return Ok(0.0);
        };
        let next = self
            .engine
            .successor(model.current_state(), joint)
            .map_err(HyperError::from)?;
        let terminal = sampler.playout(&next, rng)?;
        metrics.record_simulation();
        let goal = self
            .engine
            .goal_value(&terminal, self.agent)
            .map_err(HyperError::from)?;
        Ok(goal * posterior.powf(config.likelihood_power_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JointMove, Percept};
    use std::collections::BTreeMap;

    #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
    struct R(u8);
    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct Mv(u8);
    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct T(u8);

    // a single-step game: the agent picks 0 or 1, goal value equals the
    // move chosen, so the evaluator should always prefer 1.
    struct Toy;
    impl RulesEngine for Toy {
        type State = u8;
        type Role = R;
        type Move = Mv;
        type Term = T;
        fn initial_state(&self) -> anyhow::Result<u8> {
            Ok(0)
        }
        fn ordered_roles(&self) -> anyhow::Result<Vec<R>> {
            Ok(vec![R(0)])
        }
        fn legal_moves(&self, s: &u8, _r: R) -> anyhow::Result<Vec<Mv>> {
            if *s == 0 {
                Ok(vec![Mv(0), Mv(1)])
            } else {
                Ok(vec![])
            }
        }
        fn successor(&self, _s: &u8, j: &JointMove<R, Mv>) -> anyhow::Result<u8> {
            Ok(j.get(R(0)).map(|m| m.0).unwrap_or(0) + 1)
        }
        fn sees_terms(&self, _s: &u8, _r: R, _j: &JointMove<R, Mv>) -> anyhow::Result<Percept<R, T>> {
            Ok(Percept::new(BTreeMap::new()))
        }
        fn is_terminal(&self, s: &u8) -> anyhow::Result<bool> {
            Ok(*s > 0)
        }
        fn goal_value(&self, s: &u8, _r: R) -> anyhow::Result<crate::Utility> {
            Ok((*s - 1) as f64)
        }
        fn state_fluents(&self, s: &u8) -> anyhow::Result<Vec<T>> {
            Ok(vec![T(*s)])
        }
    }

    #[test]
    fn prefers_the_higher_payoff_candidate() {
        let engine = Toy;
        let model = Model::seed(&engine, R(0), Percept::empty()).unwrap();
        let population = vec![model];
        let evaluator = Evaluator::new(&engine, R(0));
        let candidates = evaluator.candidate_moves(&population, 0).unwrap();
        assert_eq!(candidates.len(), 2);

        let sampler = Sampler::new(&engine, R(0));
        let mut rng = crate::rng::seeded(7);
        let mut metrics = TurnMetrics::default();
        let config = Config::default();
        let deadline = Instant::now() + std::time::Duration::from_millis(200);
        let chosen = evaluator
            .select(&population, &[1.0], &candidates, 0, &config, deadline, &sampler, &mut rng, &mut metrics)
            .unwrap();
        assert_eq!(chosen, Some(Mv(1)));
    }

    #[test]
    fn zero_depths_yields_no_selection_so_caller_must_fall_back() {
        let engine = Toy;
        let model = Model::seed(&engine, R(0), Percept::empty()).unwrap();
        let population = vec![model];
        let evaluator = Evaluator::new(&engine, R(0));
        let candidates = evaluator.candidate_moves(&population, 0).unwrap();
        let sampler = Sampler::new(&engine, R(0));
        let mut rng = crate::rng::seeded(7);
        let mut metrics = TurnMetrics::default();
        let mut config = Config::default();
        config.max_num_probes = 0;
        let deadline = Instant::now() + std::time::Duration::from_millis(200);
        let chosen = evaluator
            .select(&population, &[1.0], &candidates, 0, &config, deadline, &sampler, &mut rng, &mut metrics)
            .unwrap();
        assert_eq!(chosen, None);
    }
}
