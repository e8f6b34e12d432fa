//! Relational operators over [`Relation`]s
//!
//! Every operator takes the symbolic tuple describing each input (the
//! variables bound by each column) and produces a new, owned relation.
//! Selections and projections return distinct relations, joins, anti-joins
//! and unions return bags.

use std::collections::{HashMap, HashSet};

use super::relation::Relation;
use crate::datalog::types::{Term, Tuple};
use crate::error::StorageError;

/// Rows of `rel` that match `pattern`: constants equal, repeated variables consistent
pub fn select(rel: &Relation, pattern: &Tuple) -> Relation {
    let mut out = Relation::new(rel.arity());
    for row in rel {
        if matches_pattern(row, pattern) {
            out.insert(row.clone());
        }
    }
    out
}

fn matches_pattern(row: &Tuple, pattern: &Tuple) -> bool {
    pattern.iter().enumerate().all(|(i, term)| match term {
        Term::Var(name) => match pattern.index_of(name) {
            Some(first) if first < i => row[first] == row[i],
            _ => true,
        },
        constant => &row[i] == constant,
    })
}

/// Pairs of column positions (left, right) sharing a variable
fn shared_columns(left: &Tuple, right: &Tuple) -> Vec<(usize, usize)> {
    right
        .variables()
        .into_iter()
        .filter_map(|var| Some((left.index_of(var)?, right.index_of(var)?)))
        .collect()
}

fn key(row: &Tuple, columns: impl Iterator<Item = usize>) -> Vec<Term> {
    columns.map(|c| row[c].clone()).collect()
}

/// Natural join on shared variables. Output rows are left ++ right.
pub fn join(left: &Relation, left_tuple: &Tuple, right: &Relation, right_tuple: &Tuple) -> Relation {
    let shared = shared_columns(left_tuple, right_tuple);
    let mut out = Relation::bag(left.arity() + right.arity());

    let mut buckets: HashMap<Vec<Term>, Vec<&Tuple>> = HashMap::new();
    for row in right {
        buckets
            .entry(key(row, shared.iter().map(|&(_, r)| r)))
            .or_default()
            .push(row);
    }

    for l in left {
        if let Some(matches) = buckets.get(&key(l, shared.iter().map(|&(c, _)| c))) {
            for r in matches {
                out.insert(l.concat(r));
            }
        }
    }
    out
}

/// Rows of `left` with no match in `right` under shared-variable equality.
/// Left multiplicity is preserved.
pub fn anti_join(left: &Relation, left_tuple: &Tuple, right: &Relation, right_tuple: &Tuple) -> Relation {
    let shared = shared_columns(left_tuple, right_tuple);
    let keys: HashSet<Vec<Term>> = right
        .iter()
        .map(|row| key(row, shared.iter().map(|&(_, r)| r)))
        .collect();

    let mut out = Relation::bag(left.arity());
    for row in left {
        if !keys.contains(&key(row, shared.iter().map(|&(c, _)| c))) {
            out.insert(row.clone());
        }
    }
    out
}

/// Project `rel`, described by `from`, onto the term pattern `onto`.
/// Variables are looked up in `from`, constants are copied. Duplicates are removed.
pub fn project(rel: &Relation, from: &Tuple, onto: &Tuple) -> Result<Relation, StorageError> {
    enum Column<'a> {
        Position(usize),
        Constant(&'a Term),
    }

    let columns = onto
        .iter()
        .map(|term| match term {
            Term::Var(name) => from
                .index_of(name)
                .map(Column::Position)
                .ok_or_else(|| StorageError::NonGroundTuple(onto.to_string())),
            Term::Const(_) => Ok(Column::Constant(term)),
            Term::Constructed { .. } => Err(StorageError::NonGroundTuple(onto.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Relation::new(onto.arity());
    for row in rel {
        let projected = columns
            .iter()
            .map(|c| match c {
                Column::Position(i) => row[*i].clone(),
                Column::Constant(t) => (*t).clone(),
            })
            .collect();
        out.insert(projected);
    }
    Ok(out)
}

/// Bag union
pub fn union(mut left: Relation, right: &Relation) -> Result<Relation, StorageError> {
    if left.arity() != right.arity() {
        return Err(StorageError::ArityMismatch {
            expected: left.arity(),
            actual: right.arity(),
        });
    }
    if left.is_distinct() {
        let mut bag = Relation::bag(left.arity());
        for row in left.into_tuples() {
            bag.insert(row);
        }
        left = bag;
    }
    for row in right {
        left.insert(row.clone());
    }
    Ok(left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::Value;

    fn rel(arity: usize, rows: &[&[&str]]) -> Relation {
        let mut r = Relation::new(arity);
        for row in rows {
            r.add(Tuple::ground(row.iter().map(|s| Value::from(*s)).collect()))
                .unwrap();
        }
        r
    }

    fn pat(terms: &[&str]) -> Tuple {
        terms
            .iter()
            .map(|t| match t.strip_prefix('?') {
                Some(v) => Term::var(v),
                None => Term::constant(*t),
            })
            .collect()
    }

    fn ground(values: &[&str]) -> Tuple {
        Tuple::ground(values.iter().map(|s| Value::from(*s)).collect())
    }

    // ============================================================================
    // select
    // ============================================================================

    #[test]
    fn test_select_filters_constants() {
        let edges = rel(2, &[&["a", "b"], &["a", "c"], &["b", "c"]]);
        let out = select(&edges, &pat(&["a", "?Y"]));
        assert_eq!(out.len(), 2);
        assert_eq!(out.arity(), 2);
        assert!(out.contains(&ground(&["a", "c"])));
    }

    #[test]
    fn test_select_repeated_variable() {
        let edges = rel(2, &[&["a", "a"], &["a", "b"], &["c", "c"]]);
        let out = select(&edges, &pat(&["?X", "?X"]));
        assert_eq!(out.len(), 2);
        assert!(!out.contains(&ground(&["a", "b"])));
    }

    // ============================================================================
    // join / anti_join
    // ============================================================================

    #[test]
    fn test_join_on_shared_variable() {
        let edges = rel(2, &[&["a", "b"], &["b", "c"], &["b", "d"]]);
        let out = join(&edges, &pat(&["?X", "?Y"]), &edges, &pat(&["?Y", "?Z"]));
        assert_eq!(out.arity(), 4);
        assert_eq!(out.len(), 2);
        assert!(out.contains(&ground(&["a", "b", "b", "c"])));
        assert!(out.contains(&ground(&["a", "b", "b", "d"])));
    }

    #[test]
    fn test_join_without_shared_variables_is_cross_product() {
        let left = rel(1, &[&["a"], &["b"]]);
        let right = rel(1, &[&["x"], &["y"], &["z"]]);
        let out = join(&left, &pat(&["?X"]), &right, &pat(&["?Y"]));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_join_keeps_duplicate_rows() {
        let mut left = Relation::bag(1);
        left.add(ground(&["a"])).unwrap();
        left.add(ground(&["a"])).unwrap();
        let right = rel(1, &[&["a"]]);
        let out = join(&left, &pat(&["?X"]), &right, &pat(&["?X"]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_anti_join_removes_matches() {
        let q = rel(1, &[&["a"], &["b"]]);
        let p = rel(1, &[&["a"]]);
        let out = anti_join(&q, &pat(&["?X"]), &p, &pat(&["?X"]));
        assert_eq!(out.len(), 1);
        assert!(out.contains(&ground(&["b"])));
    }

    #[test]
    fn test_anti_join_without_shared_variables() {
        let q = rel(1, &[&["a"], &["b"]]);
        let empty = Relation::new(1);
        let nonempty = rel(1, &[&["z"]]);
        assert_eq!(anti_join(&q, &pat(&["?X"]), &empty, &pat(&["?Y"])).len(), 2);
        assert!(anti_join(&q, &pat(&["?X"]), &nonempty, &pat(&["?Y"])).is_empty());
    }

    // ============================================================================
    // project / union
    // ============================================================================

    #[test]
    fn test_project_deduplicates() {
        let rows = rel(2, &[&["a", "x"], &["a", "y"], &["b", "x"]]);
        let out = project(&rows, &pat(&["?X", "?Y"]), &pat(&["?X"])).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.is_distinct());
    }

    #[test]
    fn test_project_with_constants() {
        let rows = rel(1, &[&["a"]]);
        let out = project(&rows, &pat(&["?X"]), &pat(&["k", "?X"])).unwrap();
        assert!(out.contains(&ground(&["k", "a"])));
    }

    #[test]
    fn test_project_missing_variable_fails() {
        let rows = rel(1, &[&["a"]]);
        assert!(project(&rows, &pat(&["?X"]), &pat(&["?Z"])).is_err());
    }

    #[test]
    fn test_union_is_bag() {
        let a = rel(1, &[&["a"]]);
        let b = rel(1, &[&["a"], &["b"]]);
        let out = union(a, &b).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_union_arity_mismatch() {
        let a = rel(1, &[&["a"]]);
        let b = rel(2, &[&["a", "b"]]);
        assert!(union(a, &b).is_err());
    }
}
