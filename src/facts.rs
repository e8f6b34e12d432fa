//! Facts - predicate to relation store
//!
//! Holds the extensional facts a knowledge base was loaded with and
//! accumulates every tuple derived during evaluation. Relations only grow.
//! The built-in `true/0` predicate resolves to a relation with one row that
//! belongs to this instance.

use std::collections::HashMap;

use crate::datalog::types::{Predicate, Tuple};
use crate::error::StorageError;
use crate::storage::Relation;

#[derive(Clone, Debug)]
pub struct Facts {
    relations: HashMap<Predicate, Relation>,
    truth: Relation,
    max_relation_size: Option<usize>,
}

impl Default for Facts {
    fn default() -> Self {
        Facts::new()
    }
}

impl Facts {
    pub fn new() -> Self {
        Facts {
            relations: HashMap::new(),
            truth: Relation::unit(),
            max_relation_size: None,
        }
    }

    /// Facts whose relations refuse to grow past `limit` tuples
    pub fn with_limit(limit: Option<usize>) -> Self {
        Facts {
            max_relation_size: limit,
            ..Facts::new()
        }
    }

    pub fn max_relation_size(&self) -> Option<usize> {
        self.max_relation_size
    }

    /// Relation of a predicate, if it has one
    pub fn relation(&self, predicate: &Predicate) -> Option<&Relation> {
        if *predicate == Predicate::truth() {
            return Some(&self.truth);
        }
        self.relations.get(predicate)
    }

    /// Relation of a predicate, created empty if missing
    pub fn ensure(&mut self, predicate: &Predicate) -> &Relation {
        if *predicate == Predicate::truth() {
            return &self.truth;
        }
        self.relations
            .entry(predicate.clone())
            .or_insert_with(|| Relation::new(predicate.arity()))
    }

    /// Add one ground tuple. Returns whether it was new.
    pub fn add(&mut self, predicate: &Predicate, tuple: Tuple) -> Result<bool, StorageError> {
        if *predicate == Predicate::truth() {
            return Ok(false);
        }
        let limit = self.max_relation_size;
        let relation = self
            .relations
            .entry(predicate.clone())
            .or_insert_with(|| Relation::new(predicate.arity()));
        if relation.contains(&tuple) {
            return Ok(false);
        }
        if let Some(limit) = limit {
            if relation.len() >= limit {
                return Err(StorageError::CapacityExceeded { limit });
            }
        }
        relation.add(tuple)
    }

    /// Union `derived` into the predicate's relation, returning the tuples that were new
    pub fn merge(&mut self, predicate: &Predicate, derived: &Relation) -> Result<Relation, StorageError> {
        let mut fresh = Relation::new(predicate.arity());
        for tuple in derived {
            if self.add(predicate, tuple.clone())? {
                fresh.insert(tuple.clone());
            }
        }
        Ok(fresh)
    }

    /// Merge every relation of `other` into `self`
    pub fn absorb(&mut self, other: &Facts) -> Result<usize, StorageError> {
        let mut added = 0;
        for (predicate, relation) in &other.relations {
            added += self.merge(predicate, relation)?.len();
        }
        Ok(added)
    }

    pub fn contains(&self, predicate: &Predicate, tuple: &Tuple) -> bool {
        self.relation(predicate).is_some_and(|r| r.contains(tuple))
    }

    /// Predicates with a relation, excluding `true/0`
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.relations.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Predicate, &Relation)> {
        self.relations.iter()
    }

    /// Total number of stored tuples
    pub fn tuple_count(&self) -> usize {
        self.relations.values().map(Relation::len).sum()
    }

    /// True when no relation holds a tuple
    pub fn is_empty(&self) -> bool {
        self.relations.values().all(Relation::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::Value;

    fn t(values: &[&str]) -> Tuple {
        Tuple::ground(values.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_true_predicate_has_one_row() {
        let facts = Facts::new();
        let truth = facts.relation(&Predicate::truth()).unwrap();
        assert_eq!(truth.len(), 1);
        assert_eq!(truth.arity(), 0);
    }

    #[test]
    fn test_ensure_creates_empty_relation() {
        let mut facts = Facts::new();
        let p = Predicate::new("p", 2);
        assert!(facts.relation(&p).is_none());
        assert!(facts.ensure(&p).is_empty());
        assert!(facts.relation(&p).is_some());
    }

    #[test]
    fn test_merge_returns_only_new_tuples() {
        let mut facts = Facts::new();
        let p = Predicate::new("p", 1);
        facts.add(&p, t(&["a"])).unwrap();

        let mut derived = Relation::bag(1);
        derived.add(t(&["a"])).unwrap();
        derived.add(t(&["b"])).unwrap();
        derived.add(t(&["b"])).unwrap();

        let fresh = facts.merge(&p, &derived).unwrap();
        assert_eq!(fresh.len(), 1);
        assert!(fresh.contains(&t(&["b"])));
        assert_eq!(facts.relation(&p).unwrap().len(), 2);
    }

    #[test]
    fn test_capacity_limit() {
        let mut facts = Facts::with_limit(Some(2));
        let p = Predicate::new("p", 1);
        facts.add(&p, t(&["a"])).unwrap();
        facts.add(&p, t(&["b"])).unwrap();
        // duplicates do not count against the limit
        assert!(!facts.add(&p, t(&["b"])).unwrap());
        let err = facts.add(&p, t(&["c"])).unwrap_err();
        assert_eq!(err, StorageError::CapacityExceeded { limit: 2 });
    }

    #[test]
    fn test_same_name_different_arity_are_distinct() {
        let mut facts = Facts::new();
        facts.add(&Predicate::new("p", 1), t(&["a"])).unwrap();
        facts.add(&Predicate::new("p", 2), t(&["a", "b"])).unwrap();
        assert_eq!(facts.predicates().count(), 2);
        assert_eq!(facts.tuple_count(), 2);
    }
}
