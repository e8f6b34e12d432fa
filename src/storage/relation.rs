//! In-memory relation

use std::collections::HashSet;

use crate::datalog::types::Tuple;
use crate::error::StorageError;

/// A fixed-arity collection of ground tuples.
///
/// A relation is either distinct (set semantics, the default for stored
/// relations, selections and projections) or a bag that keeps duplicate rows
/// (joins, anti-joins, unions and builtin outputs). Rows keep insertion
/// order, so `get(i)` is stable.
#[derive(Clone, Debug)]
pub struct Relation {
    arity: usize,
    tuples: Vec<Tuple>,
    index: HashSet<Tuple>,
    distinct: bool,
}

impl Relation {
    /// Empty relation with set semantics
    pub fn new(arity: usize) -> Self {
        Relation {
            arity,
            tuples: Vec::new(),
            index: HashSet::new(),
            distinct: true,
        }
    }

    /// Empty relation that keeps duplicate rows
    pub fn bag(arity: usize) -> Self {
        Relation {
            distinct: false,
            ..Relation::new(arity)
        }
    }

    /// One zero-arity row: the relation of a condition that holds
    pub fn unit() -> Self {
        let mut rel = Relation::new(0);
        rel.insert(Tuple::empty());
        rel
    }

    /// Relation holding a single ground tuple
    pub fn single(tuple: Tuple) -> Result<Self, StorageError> {
        let mut rel = Relation::new(tuple.arity());
        rel.add(tuple)?;
        Ok(rel)
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Add a ground tuple of the right arity.
    ///
    /// Returns `false` when a distinct relation already holds the tuple.
    pub fn add(&mut self, tuple: Tuple) -> Result<bool, StorageError> {
        if tuple.arity() != self.arity {
            return Err(StorageError::ArityMismatch {
                expected: self.arity,
                actual: tuple.arity(),
            });
        }
        if !tuple.is_ground() || tuple.has_constructed() {
            return Err(StorageError::NonGroundTuple(tuple.to_string()));
        }
        Ok(self.insert(tuple))
    }

    /// Insert a tuple the caller already knows to be ground and of the right arity
    pub(crate) fn insert(&mut self, tuple: Tuple) -> bool {
        debug_assert_eq!(tuple.arity(), self.arity);
        if self.index.contains(&tuple) {
            if self.distinct {
                return false;
            }
        } else {
            self.index.insert(tuple.clone());
        }
        self.tuples.push(tuple);
        true
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.index.contains(tuple)
    }

    pub fn get(&self, i: usize) -> Option<&Tuple> {
        self.tuples.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    /// Same rows, duplicates removed
    pub fn distinct(&self) -> Relation {
        let mut out = Relation::new(self.arity);
        for tuple in &self.tuples {
            out.insert(tuple.clone());
        }
        out
    }
}

impl<'a> IntoIterator for &'a Relation {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::{Term, Value};

    fn row(values: &[i64]) -> Tuple {
        Tuple::ground(values.iter().map(|v| Value::Integer(*v)).collect())
    }

    #[test]
    fn test_set_relation_ignores_duplicates() {
        let mut rel = Relation::new(2);
        assert!(rel.add(row(&[1, 2])).unwrap());
        assert!(!rel.add(row(&[1, 2])).unwrap());
        assert_eq!(rel.len(), 1);
        assert!(rel.contains(&row(&[1, 2])));
    }

    #[test]
    fn test_bag_relation_keeps_duplicates() {
        let mut rel = Relation::bag(1);
        rel.add(row(&[7])).unwrap();
        rel.add(row(&[7])).unwrap();
        assert_eq!(rel.len(), 2);
        assert_eq!(rel.distinct().len(), 1);
    }

    #[test]
    fn test_add_rejects_wrong_arity() {
        let mut rel = Relation::new(2);
        let err = rel.add(row(&[1])).unwrap_err();
        assert_eq!(err, StorageError::ArityMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_add_rejects_variables() {
        let mut rel = Relation::new(1);
        let err = rel.add(Tuple::new(vec![Term::var("X")])).unwrap_err();
        assert!(matches!(err, StorageError::NonGroundTuple(_)));
        assert!(rel.is_empty());
    }

    #[test]
    fn test_unit_relation() {
        let unit = Relation::unit();
        assert_eq!(unit.arity(), 0);
        assert_eq!(unit.len(), 1);
        assert!(unit.contains(&Tuple::empty()));
    }

    #[test]
    fn test_get_preserves_insertion_order() {
        let mut rel = Relation::new(1);
        rel.add(row(&[3])).unwrap();
        rel.add(row(&[1])).unwrap();
        rel.add(row(&[2])).unwrap();
        assert_eq!(rel.get(0), Some(&row(&[3])));
        assert_eq!(rel.get(2), Some(&row(&[2])));
        assert_eq!(rel.get(3), None);
    }
}
