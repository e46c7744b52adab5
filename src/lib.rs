//! HyperPlay agent kernel.
//!
//! Plays imperfect-information, non-deterministic, finite extensive-form
//! games by maintaining a population of *hypergames* — fully specified
//! perfect-information histories consistent with this player's private
//! observation stream so far — and choosing moves that maximise an
//! expected-payoff estimate averaged over the population, weighted by each
//! hypergame's posterior plausibility.
//!
//! The rules of the game being played (legal moves, successor states,
//! percepts, terminality, goal values) are supplied by an external
//! [`rules::RulesEngine`] implementation; this crate never reasons about
//! game rules itself.
//!
//! # Modules
//!
//! - [`rules`]: the abstract interface to an external rules engine.
//! - [`types`]: roles, moves, joint moves, percepts, action-path hashing.
//! - [`model`]: one hypergame (a candidate perfect-information trajectory).
//! - [`likelihood`]: the opponent-preference memoization tree.
//! - [`registries`]: bad-move / in-use / blacklist / whitelist bookkeeping.
//! - [`sampler`]: advances hypergames under partial observations.
//! - [`population`]: population cap and diversity filtering.
//! - [`evaluator`]: anytime, hypergame-weighted Monte-Carlo move selection.
//! - [`controller`]: the per-turn agent loop.
//! - [`config`]: per-agent `key:value` configuration file.
//! - [`metrics`]: per-turn counters feeding the output log.
//! - [`log_sink`]: append-only CSV move log.
//! - [`error`]: crate error kinds.

pub mod config;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod likelihood;
pub mod log_sink;
pub mod metrics;
pub mod model;
pub mod population;
pub mod registries;
pub mod rng;
pub mod rules;
pub mod sampler;
pub mod types;

#[cfg(feature = "native")]
pub mod logging;

/// normalised posterior probability, opponent-rollout value, and
/// move-likelihood weight all live in this dimensional slot.
pub type Probability = f64;

/// expected-payoff estimate, as returned by `RulesEngine::goal_value`.
pub type Utility = f64;

// default configuration values, mirrored in `config::Config::default`.
pub const DEFAULT_NUM_HYPERGAMES: usize = 16;
pub const DEFAULT_NUM_HYPERBRANCHES: usize = 16;
pub const DEFAULT_MAX_NUM_PROBES: usize = 16;
pub const DEFAULT_NUM_OP_PROBES: usize = 8;
pub const DEFAULT_BACKTRACKING_DEPTH: usize = 1;
pub const DEFAULT_LIKELIHOOD_POWER_FACTOR: f64 = 1.0;
pub const DEFAULT_SHOULD_BRANCH: bool = false;
pub const DEFAULT_INV_PLAYTIME_FACTOR: u32 = 10;
/// resolves spec's Open Question on zero-posterior hypergames: excluded by
/// default (see DESIGN.md).
pub const DEFAULT_EXCLUDE_ZERO_POSTERIOR: bool = true;

/// fixed slack subtracted from the play clock before the evaluator must stop.
pub const END_OF_TURN_BUFFER: std::time::Duration = std::time::Duration::from_millis(250);
