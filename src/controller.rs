//! The per-turn agent loop (spec §4.7), tying every other module together:
//! record this turn's percept and the controller's report of the agent's
//! prior move, recover from a timed-out previous turn, advance and
//! replenish the hypergame population, cap and diversify it, run the Move
//! Evaluator, and emit one CSV row (§6) summarising the turn.

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;

use crate::config::Config;
use crate::error::{HyperError, HyperResult};
use crate::evaluator::Evaluator;
use crate::likelihood::LikelihoodTree;
use crate::log_sink::{LogSink, MoveLogRow};
use crate::metrics::TurnMetrics;
use crate::model::Model;
use crate::population;
use crate::registries::{BadMoves, InUseMoves, MoveTrackers};
use crate::rng;
use crate::rules::RulesEngine;
use crate::sampler::{Sampler, TurnContext};
use crate::types::Percept;
use crate::END_OF_TURN_BUFFER;

pub struct Controller<E: RulesEngine> {
    engine: E,
    agent: E::Role,
    config: Config,
    match_id: String,
    game_name: String,
    player_name: String,

    population: Vec<Model<E>>,
    tree: LikelihoodTree,
    bad: BadMoves<E::Role, E::Move>,
    in_use: InUseMoves<E::Role, E::Move>,
    trackers: MoveTrackers<E::Move>,

    action_tracker: Vec<E::Move>,
    /// `None` at an index means either no turn has computed an expectation
    /// for that step yet, or the turn that would have did not finish before
    /// its play clock elapsed (spec §4.7, "sets expectedAction[step-1] =
    /// null" on timeout recovery).
    expected_action_tracker: Vec<Option<E::Move>>,
    percept_tracker: Vec<Percept<E::Role, E::Term>>,
    timed_out: bool,

    rng: SmallRng,
    metrics: TurnMetrics,
    log_sink: Option<LogSink>,
}

impl<E: RulesEngine> Controller<E> {
    /// `gameStart`: supplies the game, role, and a seed for the shared RNG
    /// (spec §6 "Controller protocol", §9 "Randomness").
    pub fn new(
        engine: E,
        agent: E::Role,
        config: Config,
        match_id: impl Into<String>,
        game_name: impl Into<String>,
        player_name: impl Into<String>,
        seed: u64,
    ) -> Self {
        Self {
            engine,
            agent,
            config,
            match_id: match_id.into(),
            game_name: game_name.into(),
            player_name: player_name.into(),
            population: Vec::new(),
            tree: LikelihoodTree::new(),
            bad: BadMoves::default(),
            in_use: InUseMoves::default(),
            trackers: MoveTrackers::default(),
            action_tracker: Vec::new(),
            expected_action_tracker: Vec::new(),
            percept_tracker: Vec::new(),
            timed_out: false,
            rng: rng::seeded(seed),
            metrics: TurnMetrics::default(),
            log_sink: None,
        }
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// `gamePlay`: record this turn's percept and reported prior move,
    /// advance the hypergame population, and return the chosen move within
    /// `play_clock`. Never returns `Err` unless even a best-effort fallback
    /// legal move could not be found (spec §7 "Propagation": "no exception
    /// crosses the boundary").
    pub fn game_play(
        &mut self,
        percept: Percept<E::Role, E::Term>,
        prior_move: Option<E::Move>,
        play_clock: Duration,
    ) -> HyperResult<E::Move> {
        let step = self.percept_tracker.len();
        self.percept_tracker.push(percept);

        // a previous turn that timed out never finished computing its
        // expectation; discard it before the retroactive-consistency check
        // below runs against it, or a half-finished turn's guess could
        // wrongly blacklist a move the agent actually played (spec §4.7,
        // concrete scenario at §"timeout recovery").
        if self.timed_out {
            self.in_use.clear();
            if step > 0 {
                if let Some(slot) = self.expected_action_tracker.get_mut(step - 1) {
                    *slot = None;
                }
            }
            self.timed_out = false;
        }

        let mut illegal_last_turn = false;
        if let Some(mv) = prior_move {
            if step == 0 {
                log::warn!("game_play: step=0 but a prior_move was supplied, ignoring it");
            } else {
                let prior_step = step - 1;
                self.trackers.whitelist(prior_step, mv.clone());
                if let Some(expected) = self.expected_action_tracker.get(prior_step).cloned().flatten() {
                    illegal_last_turn = expected != mv;
                    let sampler = Sampler::new(&self.engine, self.agent);
                    sampler.retroactive_consistency(
                        &mut self.population,
                        &mut self.trackers,
                        &mut self.in_use,
                        prior_step,
                        &expected,
                        &mv,
                    );
                }
                self.action_tracker.push(mv);
            }
        }

        let deadline_all = Instant::now() + play_clock.saturating_sub(END_OF_TURN_BUFFER);
        let state_update_limit = play_clock / self.config.inv_playtime_factor.max(1);
        let deadline_update = (Instant::now() + state_update_limit).min(deadline_all);

        let mv = match self.run_turn(step, deadline_update, deadline_all) {
            Ok(mv) => mv,
            Err(err) => {
                log::warn!("turn step={step} failed ({err}), falling back to a legal move");
                self.fallback_move(step)?
            }
        };

        self.timed_out = Instant::now() >= deadline_all;

        debug_assert_eq!(self.expected_action_tracker.len(), step);
        self.expected_action_tracker.push(Some(mv.clone()));

        log::info!(
            "turn step={step} population={} rollout_depth={} update_ms={} select_ms={}",
            self.metrics.population_size,
            self.metrics.rollout_depth,
            self.metrics.update_ms(),
            self.metrics.select_ms(),
        );
        self.emit_log_row(step, &mv, illegal_last_turn);

        Ok(mv)
    }

    /// `gameStop`: no further action is required of the kernel.
    pub fn game_stop(&mut self, _percept: Percept<E::Role, E::Term>, _prior_move: Option<E::Move>) {}

    /// seed/advance/replenish/cap the population, then run the Move
    /// Evaluator. Any Rules-Engine or internal sampler failure propagates
    /// as `Err` from here; `game_play` is the only caller and converts it
    /// into a best-effort fallback move rather than letting it cross the
    /// Controller boundary.
    fn run_turn(
        &mut self,
        step: usize,
        deadline_update: Instant,
        deadline_all: Instant,
    ) -> HyperResult<E::Move> {
        self.metrics.start_update();
        if step == 0 {
            let initial_percept = self.percept_tracker[0].clone();
            self.population = vec![Model::seed(&self.engine, self.agent, initial_percept)?];
        } else {
            self.advance_population(step, deadline_update)?;
            self.replenish_population(step, deadline_update)?;
        }
        if self.population.len() > self.config.num_hypergames {
            let cap = self.config.num_hypergames;
            self.population = population::filter_by_variance(
                &self.engine,
                &self.tree,
                std::mem::take(&mut self.population),
                cap,
            )?;
        }
        self.metrics.population_size = self.population.len();
        self.metrics.stop_update();

        self.metrics.start_select();
        let evaluator = Evaluator::new(&self.engine, self.agent);
        let sampler = Sampler::new(&self.engine, self.agent);
        let candidates = evaluator.candidate_moves(&self.population, step)?;
        let posteriors = population::posterior_probabilities(&self.tree, &self.population);
        let chosen = evaluator.select(
            &self.population,
            &posteriors,
            &candidates,
            step,
            &self.config,
            deadline_all,
            &sampler,
            &mut self.rng,
            &mut self.metrics,
        )?;
        self.metrics.stop_select();
        match chosen {
            Some(mv) => Ok(mv),
            None => self.fallback_move(step),
        }
    }

    /// advance every live hypergame towards `current_step`, retiring any
    /// whose forward search backtracks below `backtrackingDepth` of the
    /// current step, then retiring any surviving hypergame whose posterior
    /// drops to 0 while peers remain alive (§4.7.1 state machine).
    fn advance_population(&mut self, current_step: usize, deadline: Instant) -> HyperResult<()> {
        let sampler = Sampler::new(&self.engine, self.agent);
        let ctx = TurnContext {
            current_step,
            own_moves: &self.action_tracker,
            observed_percepts: &self.percept_tracker,
        };
        let threshold = current_step.saturating_sub(self.config.backtracking_depth);

        let mut kept = Vec::with_capacity(self.population.len());
        for mut model in std::mem::take(&mut self.population) {
            let originated_at_root = model.step() == 0;
            let mut retired = false;
            while model.step() < current_step {
                let before = model.step();
                sampler.forward(
                    &mut model,
                    &ctx,
                    &mut self.tree,
                    &mut self.bad,
                    &mut self.in_use,
                    &self.trackers,
                    self.config.num_op_probes,
                    &mut self.rng,
                    &mut self.metrics,
                )?;
                if model.step() < before && model.step() < threshold {
                    retired = true;
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }
            }
            if retired {
                sampler.discard(&model, &mut self.in_use);
            } else {
                // branching (spec §4.4, "updates, branches, and backtracks"):
                // a hypergame's very first update fans out into
                // `numHyperBranches` independent siblings that share this
                // trajectory so far but diverge under their own RNG draws
                // from here on, when this agent family opts in.
                if self.config.should_branch && originated_at_root && model.step() > 0 {
                    log::debug!(
                        "branching hypergame at step {} into {} siblings",
                        model.step(),
                        self.config.num_hyperbranches
                    );
                    for _ in 0..self.config.num_hyperbranches {
                        kept.push(model.clone());
                    }
                }
                kept.push(model);
            }
        }
        self.population = kept;

        if self.population.len() > 1 {
            let posteriors = population::posterior_probabilities(&self.tree, &self.population);
            let mut survivors = Vec::with_capacity(self.population.len());
            for (model, p) in std::mem::take(&mut self.population).into_iter().zip(posteriors) {
                if p <= 0.0 {
                    sampler.discard(&model, &mut self.in_use);
                } else {
                    survivors.push(model);
                }
            }
            self.population = survivors;
        }
        Ok(())
    }

    /// seed fresh hypergames from the root until the population reaches
    /// `numHyperGames` or `deadline` elapses (§4.4.3).
    fn replenish_population(&mut self, current_step: usize, deadline: Instant) -> HyperResult<()> {
        let sampler = Sampler::new(&self.engine, self.agent);
        let ctx = TurnContext {
            current_step,
            own_moves: &self.action_tracker,
            observed_percepts: &self.percept_tracker,
        };
        let initial_percept = self
            .percept_tracker
            .first()
            .cloned()
            .unwrap_or_else(Percept::empty);
        sampler.replenish(
            &mut self.population,
            &ctx,
            &initial_percept,
            &mut self.tree,
            &mut self.bad,
            &mut self.in_use,
            &self.trackers,
            self.config.num_hypergames,
            self.config.backtracking_depth,
            self.config.num_op_probes,
            deadline,
            &mut self.rng,
            &mut self.metrics,
        )
    }

    /// §7 `ConsistencyExhausted`: fall back to whatever legal-move set was
    /// most recently known, or else query the Rules Engine root directly.
    fn fallback_move(&self, step: usize) -> HyperResult<E::Move> {
        for model in &self.population {
            if let Some(legal) = model.legal_moves_at(step) {
                if let Some(mv) = legal.iter().next() {
                    return Ok(mv.clone());
                }
            }
        }
        let initial = self.engine.initial_state().map_err(HyperError::from)?;
        self.engine
            .legal_moves(&initial, self.agent)
            .map_err(HyperError::from)?
            .into_iter()
            .next()
            .ok_or(HyperError::ConsistencyExhausted)
    }

    fn emit_log_row(&mut self, step: usize, mv: &E::Move, was_illegal_last_turn: bool) {
        let Some(sink) = self.log_sink.as_mut() else {
            return;
        };
        let role = format!("{:?}", self.agent);
        let chosen_move = format!("{mv:?}");
        let row = MoveLogRow {
            match_id: &self.match_id,
            game_name: &self.game_name,
            step,
            role: &role,
            player_name: &self.player_name,
            chosen_move: &chosen_move,
            was_illegal_last_turn,
        };
        if let Err(err) = sink.write_row(&row, &self.metrics) {
            log::warn!("failed to write move log row: {err}");
        }
    }
}
