//! Equivalence store for rule-head equality
//!
//! A binary relation over terms. Membership is symmetric and reflexive, but
//! the stored pairs are not transitively closed: transitivity is derived by
//! rules over the equality predicate.

use crate::datalog::types::{Term, Tuple};
use crate::error::StorageError;
use crate::storage::Relation;

#[derive(Clone, Debug)]
pub struct EquivalenceStore {
    pairs: Relation,
}

impl Default for EquivalenceStore {
    fn default() -> Self {
        EquivalenceStore::new()
    }
}

impl EquivalenceStore {
    pub fn new() -> Self {
        EquivalenceStore {
            pairs: Relation::new(2),
        }
    }

    /// Whether `a` and `b` are asserted equal, in either order
    pub fn are_equivalent(&self, a: &Term, b: &Term) -> bool {
        a == b
            || self.pairs.contains(&Tuple::new(vec![a.clone(), b.clone()]))
            || self.pairs.contains(&Tuple::new(vec![b.clone(), a.clone()]))
    }

    /// Record `a = b`. Returns whether the pair was new.
    pub fn set_equivalent(&mut self, a: &Term, b: &Term) -> Result<bool, StorageError> {
        if self.are_equivalent(a, b) {
            return Ok(false);
        }
        self.pairs.add(Tuple::new(vec![a.clone(), b.clone()]))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Term, &Term)> {
        self.pairs.iter().map(|t| (&t[0], &t[1]))
    }
}
