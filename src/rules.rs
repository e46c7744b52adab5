//! The external Rules Engine interface (spec §4.1).
//!
//! Pure, deterministic, side-effect free. The core never reasons about game
//! rules itself; it only calls through this trait. Any failure at this
//! boundary is fatal to the current turn (spec §7).

use crate::types::{JointMove, Percept, Role};

/// everything the kernel needs from an external declarative-rules
/// interpreter. Implementations must be pure functions of their inputs.
pub trait RulesEngine: Send + Sync {
    type State: Clone + Eq + std::hash::Hash + std::fmt::Debug;
    type Role: Role;
    type Move: crate::types::Move;
    type Term: crate::types::Term;

    /// the single initial state of the game.
    fn initial_state(&self) -> anyhow::Result<Self::State>;

    /// the roles in the order the engine considers canonical.
    fn ordered_roles(&self) -> anyhow::Result<Vec<Self::Role>>;

    /// moves legal for `role` in `state`.
    fn legal_moves(
        &self,
        state: &Self::State,
        role: Self::Role,
    ) -> anyhow::Result<Vec<Self::Move>>;

    /// the state reached by applying every role's move simultaneously.
    fn successor(
        &self,
        state: &Self::State,
        joint: &JointMove<Self::Role, Self::Move>,
    ) -> anyhow::Result<Self::State>;

    /// the observation terms `role` sees after `joint` is applied in `state`.
    fn sees_terms(
        &self,
        state: &Self::State,
        role: Self::Role,
        joint: &JointMove<Self::Role, Self::Move>,
    ) -> anyhow::Result<Percept<Self::Role, Self::Term>>;

    /// whether `state` ends the game.
    fn is_terminal(&self, state: &Self::State) -> anyhow::Result<bool>;

    /// `role`'s payoff in a terminal `state`.
    fn goal_value(&self, state: &Self::State, role: Self::Role) -> anyhow::Result<crate::Utility>;

    /// the set of true fluents (state propositions) holding in `state`,
    /// used by the Population Manager's diversity filter (§4.5) to measure
    /// how much two hypergames' current states disagree. Implementations
    /// backed by a declarative (GDL-style) interpreter can return the
    /// state's proposition set directly; others may project whatever
    /// atomic facts best characterise the state.
    fn state_fluents(&self, state: &Self::State) -> anyhow::Result<Vec<Self::Term>>;

    /// convenience: the joint moves reachable from `state`, i.e. the
    /// cartesian product of each role's legal moves. Implementations may
    /// override this if the engine can enumerate joint moves more directly
    /// than the cartesian product of per-role legal moves (e.g. when some
    /// combinations are ruled out by simultaneity constraints the engine
    /// tracks itself); the default is correct for any game with no such
    /// constraints.
    fn joint_moves(
        &self,
        state: &Self::State,
    ) -> anyhow::Result<Vec<JointMove<Self::Role, Self::Move>>> {
        let roles = self.ordered_roles()?;
        let mut per_role = Vec::with_capacity(roles.len());
        for role in &roles {
            per_role.push(self.legal_moves(state, *role)?);
        }
        let mut joints = vec![Vec::new()];
        for (role, moves) in roles.iter().zip(per_role.iter()) {
            let mut next = Vec::with_capacity(joints.len() * moves.len().max(1));
            for prefix in &joints {
                for m in moves {
                    let mut extended = prefix.clone();
                    extended.push((*role, m.clone()));
                    next.push(extended);
                }
            }
            joints = next;
        }
        Ok(joints.into_iter().map(JointMove::new).collect())
    }
}
