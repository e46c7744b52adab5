//! One hypergame: a candidate perfect-information trajectory (spec §4.2).
//!
//! A `Model` is the stack of joint moves taken so far, the per-step state,
//! the per-step expected percepts for the player, the per-step branching
//! count, and the legal-move sets the player observed at each step. All
//! parallel stacks have equal length (invariant I1); push/pop keep an
//! incrementally-maintained action-path hash so `action_path_hash` is O(1).

use std::collections::{HashMap, HashSet};

use crate::error::{HyperError, HyperResult};
use crate::rules::RulesEngine;
use crate::types::{ActionPathHash, JointMove, Percept};

pub struct Model<E: RulesEngine> {
    /// first entry is the root marker (no joint move taken yet).
    action_path: Vec<Option<JointMove<E::Role, E::Move>>>,
    state_path: Vec<E::State>,
    percept_path: Vec<Percept<E::Role, E::Term>>,
    branching_path: Vec<usize>,
    hash_path: Vec<ActionPathHash>,
    legal_moves_at_step: HashMap<usize, HashSet<E::Move>>,
}

impl<E: RulesEngine> Clone for Model<E> {
    fn clone(&self) -> Self {
        Self {
            action_path: self.action_path.clone(),
            state_path: self.state_path.clone(),
            percept_path: self.percept_path.clone(),
            branching_path: self.branching_path.clone(),
            hash_path: self.hash_path.clone(),
            legal_moves_at_step: self.legal_moves_at_step.clone(),
        }
    }
}

impl<E: RulesEngine> std::fmt::Debug for Model<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("step", &self.step())
            .field("hash", &self.action_path_hash())
            .finish()
    }
}

impl<E: RulesEngine> Model<E> {
    /// seed a model at the initial state, anchored with the player's first
    /// observed percept (spec §3 "Populated at step 0 with one model
    /// anchored at the initial state").
    pub fn seed(
        engine: &E,
        agent: E::Role,
        initial_percept: Percept<E::Role, E::Term>,
    ) -> HyperResult<Self> {
        let state = engine.initial_state().map_err(HyperError::from)?;
        let branching = engine.joint_moves(&state).map_err(HyperError::from)?.len();
        let legal: HashSet<E::Move> = engine
            .legal_moves(&state, agent)
            .map_err(HyperError::from)?
            .into_iter()
            .collect();
        let mut legal_moves_at_step = HashMap::new();
        legal_moves_at_step.insert(0, legal);
        Ok(Self {
            action_path: vec![None],
            state_path: vec![state],
            percept_path: vec![initial_percept],
            branching_path: vec![branching],
            hash_path: vec![ActionPathHash::ROOT],
            legal_moves_at_step,
        })
    }

    /// push one frame: apply `joint` to the current state and record the
    /// expected percepts for `agent`. Fails with `DuplicateFrame` if this
    /// model already has a frame at `step`.
    pub fn update(
        &mut self,
        engine: &E,
        step: usize,
        joint: JointMove<E::Role, E::Move>,
        agent: E::Role,
    ) -> HyperResult<()> {
        if self.state_path.len() > step {
            return Err(HyperError::DuplicateFrame);
        }
        let state = engine
            .successor(self.current_state(), &joint)
            .map_err(HyperError::from)?;
        let percepts = engine
            .sees_terms(&state, agent, &joint)
            .map_err(HyperError::from)?;
        let branching = engine.joint_moves(&state).map_err(HyperError::from)?.len();
        let hash = self.action_path_hash().child(&joint);
        self.action_path.push(Some(joint));
        self.state_path.push(state);
        self.percept_path.push(percepts);
        self.branching_path.push(branching);
        self.hash_path.push(hash);
        Ok(())
    }

    /// pop the top frame. Never empties the root; returns whether a frame
    /// was actually popped.
    pub fn backtrack(&mut self) -> bool {
        if self.state_path.len() <= 1 {
            return false;
        }
        let popped_step = self.state_path.len() - 1;
        self.action_path.pop();
        self.state_path.pop();
        self.percept_path.pop();
        self.branching_path.pop();
        self.hash_path.pop();
        self.legal_moves_at_step.remove(&popped_step);
        true
    }

    pub fn step(&self) -> usize {
        self.state_path.len() - 1
    }

    pub fn current_state(&self) -> &E::State {
        self.state_path.last().expect("root frame always present")
    }

    pub fn state_at(&self, step: usize) -> Option<&E::State> {
        self.state_path.get(step)
    }

    pub fn latest_percepts(&self) -> &Percept<E::Role, E::Term> {
        self.percept_path.last().expect("root frame always present")
    }

    pub fn percepts_at(&self, step: usize) -> Option<&Percept<E::Role, E::Term>> {
        self.percept_path.get(step)
    }

    pub fn last_action(&self) -> Option<&JointMove<E::Role, E::Move>> {
        self.action_path.last().and_then(Option::as_ref)
    }

    /// the full action-path stack, including the leading root marker
    /// (`None`). Used to walk a model's whole trajectory, e.g. to release
    /// its `InUseMoves` claims when it is discarded.
    pub fn actions(&self) -> &[Option<JointMove<E::Role, E::Move>>] {
        &self.action_path
    }

    pub fn action_path_hash(&self) -> ActionPathHash {
        *self.hash_path.last().expect("root frame always present")
    }

    pub fn previous_action_path_hash(&self) -> ActionPathHash {
        let len = self.hash_path.len();
        if len < 2 {
            ActionPathHash::ROOT
        } else {
            self.hash_path[len - 2]
        }
    }

    pub fn hash_path(&self) -> &[ActionPathHash] {
        &self.hash_path
    }

    /// product of per-step branching counts: the uniform-opponent choice
    /// factor for this hypergame's whole trajectory.
    pub fn branching_product(&self) -> f64 {
        self.branching_path.iter().map(|&b| b as f64).product()
    }

    pub fn record_legal_moves(&mut self, step: usize, moves: HashSet<E::Move>) {
        self.legal_moves_at_step.insert(step, moves);
    }

    pub fn legal_moves_at(&self, step: usize) -> Option<&HashSet<E::Move>> {
        self.legal_moves_at_step.get(&step)
    }

    /// proxy to the Rules Engine for the current state's legal moves.
    pub fn compute_legal_moves(&self, engine: &E, role: E::Role) -> HyperResult<Vec<E::Move>> {
        engine
            .legal_moves(self.current_state(), role)
            .map_err(HyperError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RulesEngine;
    use crate::types::{JointMove, Percept};
    use std::collections::BTreeMap;

    #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
    struct Role(u8);
    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct Mv(u8);
    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct Term(u8);

    struct Toy;
    impl RulesEngine for Toy {
        type State = u8;
        type Role = Role;
        type Move = Mv;
        type Term = Term;
        fn initial_state(&self) -> anyhow::Result<u8> {
            Ok(0)
        }
        fn ordered_roles(&self) -> anyhow::Result<Vec<Role>> {
            Ok(vec![Role(0), Role(1)])
        }
        fn legal_moves(&self, _s: &u8, _r: Role) -> anyhow::Result<Vec<Mv>> {
            Ok(vec![Mv(0), Mv(1)])
        }
        fn successor(&self, s: &u8, _j: &JointMove<Role, Mv>) -> anyhow::Result<u8> {
            Ok(s + 1)
        }
        fn sees_terms(
            &self,
            s: &u8,
            role: Role,
            _j: &JointMove<Role, Mv>,
        ) -> anyhow::Result<Percept<Role, Term>> {
            let mut m = BTreeMap::new();
            m.insert(role, vec![Term(*s)]);
            Ok(Percept::new(m))
        }
        fn is_terminal(&self, s: &u8) -> anyhow::Result<bool> {
            Ok(*s >= 3)
        }
        fn goal_value(&self, _s: &u8, _r: Role) -> anyhow::Result<crate::Utility> {
            Ok(0.0)
        }
        fn state_fluents(&self, s: &u8) -> anyhow::Result<Vec<Term>> {
            Ok(vec![Term(*s)])
        }
    }

    #[test]
    fn update_then_backtrack_restores_hash_and_stacks() {
        let engine = Toy;
        let mut model = Model::seed(&engine, Role(0), Percept::empty()).unwrap();
        let hash_before = model.action_path_hash();
        let joint = JointMove::new(vec![(Role(0), Mv(0)), (Role(1), Mv(1))]);
        model.update(&engine, 1, joint, Role(0)).unwrap();
        assert_eq!(model.step(), 1);
        assert!(model.backtrack());
        assert_eq!(model.step(), 0);
        assert_eq!(model.action_path_hash(), hash_before);
    }

    #[test]
    fn backtrack_never_empties_root() {
        let engine = Toy;
        let mut model = Model::seed(&engine, Role(0), Percept::empty()).unwrap();
        assert!(!model.backtrack());
        assert_eq!(model.step(), 0);
    }

    #[test]
    fn duplicate_frame_is_rejected() {
        let engine = Toy;
        let mut model = Model::seed(&engine, Role(0), Percept::empty()).unwrap();
        let joint = JointMove::new(vec![(Role(0), Mv(0)), (Role(1), Mv(1))]);
        model.update(&engine, 1, joint.clone(), Role(0)).unwrap();
        let err = model.update(&engine, 1, joint, Role(0)).unwrap_err();
        assert!(matches!(err, HyperError::DuplicateFrame));
    }

    #[test]
    fn clone_is_structurally_equal_and_independent() {
        let engine = Toy;
        let mut model = Model::seed(&engine, Role(0), Percept::empty()).unwrap();
        let joint = JointMove::new(vec![(Role(0), Mv(0)), (Role(1), Mv(1))]);
        model.update(&engine, 1, joint, Role(0)).unwrap();
        let mut cloned = model.clone();
        assert_eq!(cloned.action_path_hash(), model.action_path_hash());
        cloned.backtrack();
        assert_ne!(cloned.step(), model.step());
    }
}
