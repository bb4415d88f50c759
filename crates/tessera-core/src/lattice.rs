//! Join-semilattice used to fold order positions.
//!
//! The store folds the order of every applied change set into its visible
//! maximum with `join`. Because join is commutative, associative and
//! idempotent, replaying history in any interleaving, or more than once,
//! yields the same maximum.

pub trait Lattice: Clone + PartialEq {
    /// Identity for join.
    fn bottom() -> Self;

    /// Least upper bound.
    fn join(&self, other: &Self) -> Self;

    /// `self ≤ other` iff `self ⊔ other = other`.
    fn leq(&self, other: &Self) -> bool {
        self.join(other) == *other
    }

    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}
