//! Roles, moves, joint moves, percepts, and action-path hashing (spec §3).

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// a player role in the game, e.g. one seat at the table. Implementations
/// are expected to be small, `Copy` tags (an enum or index), not the game
/// state itself.
pub trait Role: Clone + Copy + Eq + Ord + Hash + fmt::Debug {}
impl<T: Clone + Copy + Eq + Ord + Hash + fmt::Debug> Role for T {}

/// one role's action at one step.
pub trait Move: Clone + Eq + Hash + fmt::Debug {}
impl<T: Clone + Eq + Hash + fmt::Debug> Move for T {}

/// one atomic observation term, as handed back by `RulesEngine::sees_terms`.
pub trait Term: Clone + Eq + Hash + fmt::Debug {}
impl<T: Clone + Eq + Hash + fmt::Debug> Term for T {}

/// a mapping role -> move for one step, canonicalised by sorting on role so
/// that equal joint moves hash equal regardless of construction order.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct JointMove<R: Role, M: Move>(Vec<(R, M)>);

impl<R: Role, M: Move> JointMove<R, M> {
    pub fn new(mut moves: Vec<(R, M)>) -> Self {
        moves.sort_by(|a, b| a.0.cmp(&b.0));
        Self(moves)
    }

    pub fn get(&self, role: R) -> Option<&M> {
        self.0
            .iter()
            .find_map(|(r, m)| if *r == role { Some(m) } else { None })
    }

    pub fn roles(&self) -> impl Iterator<Item = R> + '_ {
        self.0.iter().map(|(r, _)| *r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(R, M)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<R: Role, M: Move> fmt::Debug for JointMove<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter().cloned()).finish()
    }
}

/// per-role ordered observation terms for one step, as handed back by
/// `RulesEngine::sees_terms`. Ordered so that equal observations hash equal.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Percept<R: Role, T: Term>(BTreeMap<R, Vec<T>>);

impl<R: Role, T: Term> Percept<R, T> {
    pub fn new(terms: BTreeMap<R, Vec<T>>) -> Self {
        Self(terms)
    }

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn for_role(&self, role: R) -> &[T] {
        self.0.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// node id used by every side-index (BadMoves, InUseMoves, the Likelihood
/// Tree): the hash of the action path from the root to a model's current
/// frame. Computed incrementally so push/pop is O(1) (spec §3, §4.2).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ActionPathHash(u64);

impl ActionPathHash {
    /// the hash of the empty action path, anchoring the initial state.
    pub const ROOT: Self = Self(0x524f4f545f484143); // "ROOT_HAC"-ish marker

    /// fold a joint move onto a parent hash to get the child node id.
    pub fn child<R: Role, M: Move>(self, joint: &JointMove<R, M>) -> Self {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        joint.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Debug for ActionPathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{:016x}", self.0)
    }
}

impl fmt::Display for ActionPathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
    struct R(u8);
    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct M(u8);

    #[test]
    fn joint_move_canonicalises_order() {
        let a = JointMove::new(vec![(R(1), M(9)), (R(0), M(1))]);
        let b = JointMove::new(vec![(R(0), M(1)), (R(1), M(9))]);
        assert_eq!(a, b);
        assert_eq!(ActionPathHash::ROOT.child(&a), ActionPathHash::ROOT.child(&b));
    }

    #[test]
    fn child_hash_is_deterministic_and_path_sensitive() {
        let j1 = JointMove::new(vec![(R(0), M(1))]);
        let j2 = JointMove::new(vec![(R(0), M(2))]);
        let h1 = ActionPathHash::ROOT.child(&j1);
        let h2 = ActionPathHash::ROOT.child(&j1);
        let h3 = ActionPathHash::ROOT.child(&j2);
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn joint_move_get_finds_role_move() {
        let j = JointMove::new(vec![(R(0), M(1)), (R(2), M(3))]);
        assert_eq!(j.get(R(2)), Some(&M(3)));
        assert_eq!(j.get(R(9)), None);
    }
}
