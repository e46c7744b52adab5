//! Advances hypergames under partial observations while preserving the
//! percept-consistency invariant (spec §4.4).

use std::time::Instant;

use rand::rngs::SmallRng;

use crate::error::{HyperError, HyperResult};
use crate::likelihood::LikelihoodTree;
use crate::metrics::TurnMetrics;
use crate::model::Model;
use crate::registries::{BadMoves, InUseMoves, MoveTrackers};
use crate::rng::{uniform_choose, weighted_choose};
use crate::rules::RulesEngine;
use crate::types::{ActionPathHash, JointMove, Percept};

/// safety bound on retries within one `forward` catch-up for a single
/// model: each failed attempt permanently marks a joint move bad, so the
/// candidate set strictly shrinks and this loop always terminates well
/// before this bound is hit on any game with a finite branching factor.
const MAX_FORWARD_RETRIES: usize = 10_000;

/// everything `forward`/`replenish` need to know about the turn in
/// progress: the agent's own executed moves and the percepts it actually
/// observed, both indexed by step.
pub struct TurnContext<'a, E: RulesEngine> {
    pub current_step: usize,
    /// `own_moves[i]` is the agent's actual move taken at step `i`,
    /// transitioning the game from step `i` to step `i + 1`.
    pub own_moves: &'a [E::Move],
    /// `observed_percepts[i]` is what the agent actually saw at step `i`.
    pub observed_percepts: &'a [Percept<E::Role, E::Term>],
}

pub struct Sampler<'a, E: RulesEngine> {
    engine: &'a E,
    agent: E::Role,
}

impl<'a, E: RulesEngine> Sampler<'a, E> {
    pub fn new(engine: &'a E, agent: E::Role) -> Self {
        Self { engine, agent }
    }

    /// §4.4.1: advance `model` by one step, or retry/backtrack in place.
    /// Returns the model's step after the call (which may be unchanged on a
    /// retry, or smaller on a backtrack).
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        model: &mut Model<E>,
        ctx: &TurnContext<E>,
        tree: &mut LikelihoodTree,
        bad: &mut BadMoves<E::Role, E::Move>,
        in_use: &mut InUseMoves<E::Role, E::Move>,
        trackers: &MoveTrackers<E::Move>,
        num_op_probes: usize,
        rng: &mut SmallRng,
        metrics: &mut TurnMetrics,
    ) -> HyperResult<usize> {
        let before = model.step();
        let Some(required_move) = ctx.own_moves.get(before) else {
            return Ok(before);
        };
        let node = model.action_path_hash();

        let enumerated = self
            .engine
            .joint_moves(model.current_state())
            .map_err(HyperError::from)?
            .into_iter()
            .filter(|j| j.get(self.agent) == Some(required_move))
            .collect::<Vec<_>>();

        let surviving: Vec<_> = enumerated
            .iter()
            .filter(|j| !bad.is_bad(node, j) && !in_use.is_in_use(node, j))
            .cloned()
            .collect();

        if surviving.is_empty() {
            log::debug!("node {node} step {before}: no surviving candidate, retreating");
            return Ok(self.retreat(model, &enumerated, node, bad, in_use));
        }

        // `node` is always already registered: the root is registered by
        // `LikelihoodTree::new`, and every other node is registered as a
        // child the moment its parent was expanded, below.
        let node_idx = tree
            .node(node)
            .expect("every visited node was registered by its parent's expansion");
        if !tree.is_expanded(node_idx) {
            // register every enumerated continuation, not just the ones
            // presently `surviving` bad/in-use filtering: a joint excluded
            // here only because it is momentarily in-use elsewhere must
            // still get a tree node now, or it can never be found once its
            // claim is released and a model is routed down it later.
            let mut children_values = Vec::with_capacity(enumerated.len());
            for joint in &enumerated {
                let child_hash = node.child(joint);
                let value = self.estimate_opponent_value(
                    model.current_state(),
                    joint,
                    num_op_probes,
                    rng,
                    metrics,
                )?;
                children_values.push((child_hash, value));
            }
            tree.expand(node_idx, children_values);
        }

        let weighted: Vec<(JointMove<E::Role, E::Move>, f64)> = surviving
            .iter()
            .map(|joint| {
                let weight = tree
                    .node(node.child(joint))
                    .map(|idx| tree.node_data(idx).value)
                    .unwrap_or(0.0);
                (joint.clone(), weight)
            })
            .collect();

        // a total weight of 0 across every surviving candidate means the
        // Likelihood Tree normalised them all to a 0 relLikelihood: per
        // spec §4.3 such a subtree is forbidden for weight purposes, so no
        // selection is made rather than falling back to a uniform pick.
        let selected = weighted_choose(rng, &weighted).cloned();

        let Some(joint) = selected else {
            log::debug!("node {node} step {before}: all surviving candidates weighed to 0, retreating");
            return Ok(self.retreat(model, &enumerated, node, bad, in_use));
        };

        metrics.record_forward_call();
        let step = before + 1;
        model.update(self.engine, step, joint.clone(), self.agent)?;
        in_use.mark(node, joint.clone());

        let observed = ctx.observed_percepts.get(step);
        if observed.is_some_and(|p| p != model.latest_percepts()) {
            log::debug!("node {node} step {step}: observed percept mismatch, backtracking");
            if let Some(child_idx) = tree.node(node.child(&joint)) {
                tree.zero_out(child_idx);
            }
            model.backtrack();
            in_use.release(node, &joint);
            bad.mark(node, joint);
            return Ok(model.step());
        }

        if step < ctx.current_step {
            let legal = model
                .compute_legal_moves(self.engine, self.agent)?
                .into_iter()
                .collect::<std::collections::HashSet<_>>();
            let blacklisted = trackers.blacklisted_at(step).is_some_and(|bl| legal.contains(bl));
            let whitelisted_ok = trackers
                .whitelisted_at(step)
                .is_none_or(|wl| legal.contains(wl));
            if blacklisted || !whitelisted_ok {
                log::debug!("node {node} step {step}: blacklist/whitelist contradiction, backtracking");
                if let Some(child_idx) = tree.node(node.child(&joint)) {
                    tree.zero_out(child_idx);
                }
                model.backtrack();
                in_use.release(node, &joint);
                bad.mark(node, joint);
                return Ok(model.step());
            }
            model.record_legal_moves(step, legal);
        }

        Ok(model.step())
    }

    /// pop `model` one frame because no candidate survived at `node`, and
    /// classify the incoming move as bad (truly dead node) or merely
    /// in-use (occupied elsewhere) at the parent.
    fn retreat(
        &self,
        model: &mut Model<E>,
        enumerated_before_filtering: &[JointMove<E::Role, E::Move>],
        node: ActionPathHash,
        bad: &mut BadMoves<E::Role, E::Move>,
        in_use: &mut InUseMoves<E::Role, E::Move>,
    ) -> usize {
        let incoming = model.last_action().cloned();
        if !model.backtrack() {
            log::debug!("node {node}: already at root, cannot retreat further");
            return model.step();
        }
        if let Some(incoming) = incoming {
            let parent = model.action_path_hash();
            let all_bad = !enumerated_before_filtering.is_empty()
                && enumerated_before_filtering.iter().all(|j| bad.is_bad(node, j));
            if all_bad {
                log::debug!("node {parent}: every enumerated continuation is bad, marking dead");
                bad.mark(parent, incoming);
            } else {
                in_use.mark(parent, incoming);
            }
        }
        model.step()
    }

    /// §4.4.2 retroactive consistency: if the agent's expected move at
    /// `step` differs from what it actually played, blacklist the expected
    /// move and drop every hypergame whose recorded legal-move set at
    /// `step` contradicts the resulting blacklist/whitelist.
    pub fn retroactive_consistency(
        &self,
        population: &mut Vec<Model<E>>,
        trackers: &mut MoveTrackers<E::Move>,
        in_use: &mut InUseMoves<E::Role, E::Move>,
        step: usize,
        expected_move: &E::Move,
        actual_move: &E::Move,
    ) {
        if expected_move == actual_move {
            return;
        }
        trackers.blacklist(step, expected_move.clone());
        let whitelisted = trackers.whitelisted_at(step).cloned();
        let mut kept = Vec::with_capacity(population.len());
        for mut model in std::mem::take(population) {
            let keep = match model.legal_moves_at(step) {
                Some(legal) => {
                    let contains_blacklisted = legal.contains(expected_move);
                    let missing_whitelisted =
                        whitelisted.as_ref().is_some_and(|wl| !legal.contains(wl));
                    !contains_blacklisted && !missing_whitelisted
                }
                None => true,
            };
            if keep {
                kept.push(model);
            } else {
                self.discard(&model, in_use);
            }
        }
        *population = kept;
    }

    /// §4.4.3: seed new hypergames from the root and sample them forward
    /// until the population is replenished, time runs out, or the root
    /// admits no viable continuation.
    #[allow(clippy::too_many_arguments)]
    pub fn replenish(
        &self,
        population: &mut Vec<Model<E>>,
        ctx: &TurnContext<E>,
        initial_percept: &Percept<E::Role, E::Term>,
        tree: &mut LikelihoodTree,
        bad: &mut BadMoves<E::Role, E::Move>,
        in_use: &mut InUseMoves<E::Role, E::Move>,
        trackers: &MoveTrackers<E::Move>,
        cap: usize,
        backtracking_depth: usize,
        num_op_probes: usize,
        deadline: Instant,
        rng: &mut SmallRng,
        metrics: &mut TurnMetrics,
    ) -> HyperResult<()> {
        let threshold = ctx.current_step.saturating_sub(backtracking_depth);
        loop {
            // seeding runs up to 2x cap (spec §4.4.3); the surplus feeds the
            // Population Manager's diversity filter, which then prunes back
            // down to `cap` in `Controller::game_play`.
            if population.len() >= 2 * cap {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }

            let root_node = ActionPathHash::ROOT;
            let root_blocked = self
                .engine
                .joint_moves(&self.engine.initial_state().map_err(HyperError::from)?)
                .map_err(HyperError::from)?
                .into_iter()
                .filter(|j| ctx.own_moves.first().is_none_or(|m| j.get(self.agent) == Some(m)))
                .all(|j| bad.is_bad(root_node, &j) || in_use.is_in_use(root_node, &j));
            if root_blocked {
                log::debug!("replenish: root admits no viable continuation, stopping");
                break;
            }

            let mut model = Model::seed(self.engine, self.agent, initial_percept.clone())?;
            let mut retries = 0;
            let discarded = loop {
                if model.step() >= ctx.current_step {
                    break false;
                }
                retries += 1;
                if retries > MAX_FORWARD_RETRIES {
                    break true;
                }
                let before = model.step();
                self.forward(&mut model, ctx, tree, bad, in_use, trackers, num_op_probes, rng, metrics)?;
                if model.step() < before && (model.step() < threshold || model.step() == 0) {
                    break true;
                }
                if Instant::now() >= deadline {
                    break model.step() < ctx.current_step;
                }
            };

            if discarded {
                self.discard(&model, in_use);
            } else {
                log::debug!("replenish: seeded hypergame reached step {}", model.step());
                population.push(model);
            }
        }
        Ok(())
    }

    /// release every in-use claim a (now-discarded) model held along its
    /// path, so other hypergames can reuse those moves.
    pub fn discard(&self, model: &Model<E>, in_use: &mut InUseMoves<E::Role, E::Move>) {
        log::debug!("discarding {model:?}");
        let hash_path = model.hash_path();
        let actions = model.actions();
        // actions[i] is the move taken between hash_path[i-1] and hash_path[i].
        for i in 1..hash_path.len() {
            if let Some(joint) = actions.get(i).and_then(Option::as_ref) {
                in_use.release(hash_path[i - 1], joint);
            }
        }
    }

    fn estimate_opponent_value(
        &self,
        state: &E::State,
        joint: &JointMove<E::Role, E::Move>,
        num_op_probes: usize,
        rng: &mut SmallRng,
        metrics: &mut TurnMetrics,
    ) -> HyperResult<f64> {
        let next = self.engine.successor(state, joint).map_err(HyperError::from)?;
        let mut total = 0.0;
        for _ in 0..num_op_probes.max(1) {
            let terminal = self.playout(&next, rng)?;
            metrics.record_simulation();
            let mut opponents_value = 0.0;
            for role in self.engine.ordered_roles().map_err(HyperError::from)? {
                if role != self.agent {
                    opponents_value += self.engine.goal_value(&terminal, role).map_err(HyperError::from)?;
                }
            }
            total += opponents_value;
        }
        Ok(total / num_op_probes.max(1) as f64)
    }

    /// play uniformly random joint moves from `state` until terminal.
    pub fn playout(&self, state: &E::State, rng: &mut SmallRng) -> HyperResult<E::State> {
        let mut current = state.clone();
        let mut guard = 0usize;
        while !self.engine.is_terminal(&current).map_err(HyperError::from)? {
            let joints = self.engine.joint_moves(&current).map_err(HyperError::from)?;
            let Some(joint) = uniform_choose(rng, &joints) else {
                break;
            };
            current = self.engine.successor(&current, joint).map_err(HyperError::from)?;
            guard += 1;
            if guard > MAX_FORWARD_RETRIES {
                break;
            }
        }
        Ok(current)
    }
}
