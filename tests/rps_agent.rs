//! End-to-end turn loop over a tiny two-role simultaneous game: delayed-
//! reveal rock-paper-scissors. Each round both roles commit a move
//! simultaneously; only after the round resolves does each role learn what
//! the other actually played, so the agent must act from a population of
//! hypergames guessing the opponent's hidden commitment — the scenario the
//! kernel exists for.

use std::collections::BTreeMap;
use std::time::Duration;

use hyperplay::config::Config;
use hyperplay::controller::Controller;
use hyperplay::rules::RulesEngine;
use hyperplay::types::{JointMove, Percept};

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
enum Role {
    P1,
    P2,
}

impl Role {
    fn other(self) -> Self {
        match self {
            Role::P1 => Role::P2,
            Role::P2 => Role::P1,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    /// +1 if `self` beats `other`, -1 if it loses, 0 on a tie.
    fn against(self, other: Move) -> f64 {
        use Move::*;
        match (self, other) {
            (a, b) if a == b => 0.0,
            (Rock, Scissors) | (Paper, Rock) | (Scissors, Paper) => 1.0,
            _ => -1.0,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct State {
    round: u8,
    history: Vec<(Move, Move)>,
}

const ROUNDS: u8 = 2;

struct Rps;

impl RulesEngine for Rps {
    type State = State;
    type Role = Role;
    type Move = Move;
    type Term = Move;

    fn initial_state(&self) -> anyhow::Result<State> {
        Ok(State { round: 0, history: Vec::new() })
    }

    fn ordered_roles(&self) -> anyhow::Result<Vec<Role>> {
        Ok(vec![Role::P1, Role::P2])
    }

    fn legal_moves(&self, state: &State, _role: Role) -> anyhow::Result<Vec<Move>> {
        if state.round < ROUNDS {
            Ok(vec![Move::Rock, Move::Paper, Move::Scissors])
        } else {
            Ok(vec![])
        }
    }

    fn successor(&self, state: &State, joint: &JointMove<Role, Move>) -> anyhow::Result<State> {
        let p1 = *joint.get(Role::P1).expect("P1 always moves");
        let p2 = *joint.get(Role::P2).expect("P2 always moves");
        let mut history = state.history.clone();
        history.push((p1, p2));
        Ok(State { round: state.round + 1, history })
    }

    fn sees_terms(
        &self,
        _state: &State,
        role: Role,
        joint: &JointMove<Role, Move>,
    ) -> anyhow::Result<Percept<Role, Move>> {
        let opponent_move = *joint.get(role.other()).expect("opponent always moves");
        let mut terms = BTreeMap::new();
        terms.insert(role, vec![opponent_move]);
        Ok(Percept::new(terms))
    }

    fn is_terminal(&self, state: &State) -> anyhow::Result<bool> {
        Ok(state.round >= ROUNDS)
    }

    fn goal_value(&self, state: &State, role: Role) -> anyhow::Result<hyperplay::Utility> {
        let total: f64 = state
            .history
            .iter()
            .map(|&(p1, p2)| match role {
                Role::P1 => p1.against(p2),
                Role::P2 => p2.against(p1),
            })
            .sum();
        Ok(total)
    }

    fn state_fluents(&self, state: &State) -> anyhow::Result<Vec<Move>> {
        Ok(state.history.iter().flat_map(|&(a, b)| [a, b]).collect())
    }
}

fn tiny_config() -> Config {
    Config {
        num_hypergames: 4,
        num_hyperbranches: 4,
        max_num_probes: 2,
        num_op_probes: 2,
        ..Config::default()
    }
}

#[test]
fn plays_a_full_two_round_match_without_error() {
    let mut p1 = Controller::new(Rps, Role::P1, tiny_config(), "m1", "rps", "agent1", 1);
    let mut p2 = Controller::new(Rps, Role::P2, tiny_config(), "m1", "rps", "agent2", 2);
    let clock = Duration::from_millis(500);

    let m1_0 = p1.game_play(Percept::empty(), None, clock).unwrap();
    let m2_0 = p2.game_play(Percept::empty(), None, clock).unwrap();

    let percept1_p1 = Percept::new(BTreeMap::from([(Role::P1, vec![m2_0])]));
    let percept1_p2 = Percept::new(BTreeMap::from([(Role::P2, vec![m1_0])]));

    let m1_1 = p1.game_play(percept1_p1, Some(m1_0), clock).unwrap();
    let m2_1 = p2.game_play(percept1_p2, Some(m2_0), clock).unwrap();

    for mv in [m1_0, m2_0, m1_1, m2_1] {
        assert!(matches!(mv, Move::Rock | Move::Paper | Move::Scissors));
    }
}

#[test]
fn first_turn_returns_immediately_with_no_history() {
    let mut p1 = Controller::new(Rps, Role::P1, tiny_config(), "m2", "rps", "agent1", 7);
    let clock = Duration::from_millis(500);
    let mv = p1.game_play(Percept::empty(), None, clock).unwrap();
    assert!(matches!(mv, Move::Rock | Move::Paper | Move::Scissors));
}

#[test]
fn survives_a_play_clock_too_short_for_any_rollout() {
    let mut p1 = Controller::new(Rps, Role::P1, tiny_config(), "m3", "rps", "agent1", 11);
    // a near-zero clock leaves the evaluator zero depths; it must still
    // fall back to a legal move rather than error.
    let clock = Duration::from_millis(1);
    let mv = p1.game_play(Percept::empty(), None, clock).unwrap();
    assert!(matches!(mv, Move::Rock | Move::Paper | Move::Scissors));
}

#[test]
fn mismatched_prior_move_does_not_crash_the_next_turn() {
    let mut p1 = Controller::new(Rps, Role::P1, tiny_config(), "m4", "rps", "agent1", 3);
    let clock = Duration::from_millis(500);
    let _first = p1.game_play(Percept::empty(), None, clock).unwrap();

    // report a prior move that may disagree with what the controller
    // expected (retroactive blacklist path, spec §4.4.2); either way the
    // next turn must still produce a legal move.
    let percept = Percept::new(BTreeMap::from([(Role::P1, vec![Move::Rock])]));
    let mv = p1.game_play(percept, Some(Move::Scissors), clock).unwrap();
    assert!(matches!(mv, Move::Rock | Move::Paper | Move::Scissors));
}
