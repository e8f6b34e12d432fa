//! Program optimizers
//!
//! An optimizer rewrites the rules of a program for one query. The knowledge
//! base evaluates an optimized program on a copy of its facts; when no
//! optimizer applies, it falls back to computing the full model.

use std::collections::{HashMap, HashSet};

use super::equality;
use super::types::{Predicate, Query, Rule};

pub trait ProgramOptimizer: Send + Sync {
    fn name(&self) -> &str;

    /// Rewritten rules and query, or `None` when this optimizer does not apply
    fn optimize(&self, rules: &[Rule], query: &Query) -> Option<(Vec<Rule>, Query)>;
}

/// Drops the rules the query cannot depend on
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleFilter;

impl ProgramOptimizer for RuleFilter {
    fn name(&self) -> &str {
        "rule-filter"
    }

    fn optimize(&self, rules: &[Rule], query: &Query) -> Option<(Vec<Rule>, Query)> {
        let mut by_head: HashMap<Predicate, Vec<&Rule>> = HashMap::new();
        for rule in rules {
            by_head.entry(rule.head().predicate()).or_default().push(rule);
        }

        let mut stack: Vec<Predicate> = query
            .literals()
            .iter()
            .filter_map(|lit| lit.atom().predicate().cloned())
            .collect();
        // asserted equalities can reach every predicate
        if equality::has_equality(rules) {
            stack.push(Predicate::equality());
        }

        let mut relevant: HashSet<Predicate> = HashSet::new();
        while let Some(predicate) = stack.pop() {
            if !relevant.insert(predicate.clone()) {
                continue;
            }
            for rule in by_head.get(&predicate).into_iter().flatten() {
                stack.extend(rule.body_predicates().map(|(p, _)| p.clone()));
            }
        }

        let kept: Vec<Rule> = rules
            .iter()
            .filter(|r| relevant.contains(&r.head().predicate()))
            .cloned()
            .collect();

        if kept.len() == rules.len() {
            return None;
        }
        tracing::debug!(
            "rule filter kept {} of {} rules for {}",
            kept.len(),
            rules.len(),
            query
        );
        Some((kept, query.clone()))
    }
}
