//! Stratification of rules with negation
//!
//! Each predicate gets a stratum: at least the stratum of every predicate it
//! depends on positively, and strictly above every predicate it depends on
//! through negation. A negative dependency inside a cycle makes the program
//! unstratifiable.

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{Predicate, Rule};
use crate::error::{KbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dependency {
    Positive,
    Negative,
}

/// Predicate dependency graph: head predicate -> body predicates
#[derive(Debug, Default)]
struct DependencyGraph {
    edges: HashMap<Predicate, Vec<(Predicate, Dependency)>>,
    predicates: HashSet<Predicate>,
}

impl DependencyGraph {
    fn build(rules: &[Rule]) -> Self {
        let mut graph = DependencyGraph::default();
        for rule in rules {
            let head = rule.head().predicate();
            graph.predicates.insert(head.clone());
            for (body, positive) in rule.body_predicates() {
                let kind = if positive {
                    Dependency::Positive
                } else {
                    Dependency::Negative
                };
                graph.predicates.insert(body.clone());
                graph.edges.entry(head.clone()).or_default().push((body.clone(), kind));
            }
        }
        graph
    }

    fn dependencies(&self, predicate: &Predicate) -> &[(Predicate, Dependency)] {
        self.edges.get(predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Shortest dependency path from `from` to `to`, both included
    fn path(&self, from: &Predicate, to: &Predicate) -> Option<Vec<Predicate>> {
        let mut parent: HashMap<&Predicate, &Predicate> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen: HashSet<&Predicate> = HashSet::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut node = current;
                while let Some(&prev) = parent.get(node) {
                    path.push(prev.clone());
                    node = prev;
                }
                path.reverse();
                return Some(path);
            }
            for (next, _) in self.dependencies(current) {
                if seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// A cycle that passes through a negative edge, as `[p, q, ...]`
    fn negative_cycle(&self) -> Option<Vec<Predicate>> {
        let mut heads: Vec<&Predicate> = self.edges.keys().collect();
        heads.sort();
        for head in heads {
            for (body, kind) in self.dependencies(head) {
                if *kind != Dependency::Negative {
                    continue;
                }
                if body == head {
                    return Some(vec![head.clone()]);
                }
                if let Some(back) = self.path(body, head) {
                    let mut cycle = vec![head.clone()];
                    cycle.extend(back.into_iter().take_while(|p| p != head));
                    return Some(cycle);
                }
            }
        }
        None
    }
}

/// Rules grouped by stratum, lowest first
#[derive(Debug, Clone)]
pub struct Stratification {
    pub strata: Vec<Vec<Rule>>,
    pub predicate_strata: HashMap<Predicate, usize>,
}

impl Stratification {
    pub fn stratum_of(&self, predicate: &Predicate) -> usize {
        self.predicate_strata.get(predicate).copied().unwrap_or(0)
    }
}

pub fn stratify(rules: &[Rule]) -> Result<Stratification> {
    let graph = DependencyGraph::build(rules);
    let limit = graph.predicates.len();

    let mut strata: HashMap<Predicate, usize> =
        graph.predicates.iter().map(|p| (p.clone(), 0)).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (head, deps) in &graph.edges {
            let current = strata.get(head).copied().unwrap_or(0);
            let required = deps
                .iter()
                .map(|(dep, kind)| {
                    let s = strata.get(dep).copied().unwrap_or(0);
                    match kind {
                        Dependency::Positive => s,
                        Dependency::Negative => s + 1,
                    }
                })
                .max()
                .unwrap_or(0);

            if required > current {
                // strata only climb past the predicate count around a negative cycle
                if required > limit {
                    let cycle = graph.negative_cycle().unwrap_or_else(|| vec![head.clone()]);
                    return Err(KbError::ProgramNotStratified {
                        predicates: cycle.iter().map(Predicate::to_string).collect(),
                    });
                }
                strata.insert(head.clone(), required);
                changed = true;
            }
        }
    }

    let count = strata.values().max().map_or(0, |m| m + 1);
    let mut grouped: Vec<Vec<Rule>> = vec![Vec::new(); count];
    for rule in rules {
        let s = strata.get(&rule.head().predicate()).copied().unwrap_or(0);
        grouped[s].push(rule.clone());
    }
    grouped.retain(|rules| !rules.is_empty());

    tracing::debug!("stratified {} rules into {} strata", rules.len(), grouped.len());

    Ok(Stratification {
        strata: grouped,
        predicate_strata: strata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::{Atom, Head, Literal, Term};

    fn head(name: &str) -> Head {
        Head::atom(name, vec![Term::var("X")])
    }

    fn pos(name: &str) -> Literal {
        Literal::positive(Atom::new(name, vec![Term::var("X")]))
    }

    fn neg(name: &str) -> Literal {
        Literal::negative(Atom::new(name, vec![Term::var("X")]))
    }

    #[test]
    fn test_positive_recursion_single_stratum() {
        let rules = vec![
            Rule::new(head("p"), vec![pos("q")]),
            Rule::new(head("p"), vec![pos("p")]),
        ];
        let s = stratify(&rules).unwrap();
        assert_eq!(s.strata.len(), 1);
    }

    #[test]
    fn test_negation_raises_stratum() {
        let rules = vec![
            Rule::new(head("r"), vec![pos("q"), neg("p")]),
            Rule::new(head("p"), vec![pos("s")]),
        ];
        let s = stratify(&rules).unwrap();
        assert_eq!(s.strata.len(), 2);
        assert_eq!(s.strata[0][0].head().predicate().name(), "p");
        assert_eq!(s.strata[1][0].head().predicate().name(), "r");
        assert!(s.stratum_of(&Predicate::new("r", 1)) > s.stratum_of(&Predicate::new("p", 1)));
    }

    #[test]
    fn test_negative_self_cycle_rejected() {
        let rules = vec![Rule::new(head("p"), vec![neg("p")])];
        let err = stratify(&rules).unwrap_err();
        assert_eq!(
            err,
            KbError::ProgramNotStratified {
                predicates: vec!["p/1".to_string()],
            }
        );
    }

    #[test]
    fn test_negative_cycle_reports_path() {
        let rules = vec![
            Rule::new(head("p"), vec![pos("s"), neg("q")]),
            Rule::new(head("q"), vec![pos("p")]),
        ];
        match stratify(&rules).unwrap_err() {
            KbError::ProgramNotStratified { predicates } => {
                assert_eq!(predicates, vec!["p/1".to_string(), "q/1".to_string()]);
            }
            other => panic!("expected ProgramNotStratified, got {:?}", other),
        }
    }

    #[test]
    fn test_no_rules() {
        let s = stratify(&[]).unwrap();
        assert!(s.strata.is_empty());
    }
}
