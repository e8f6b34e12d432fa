//! Compiled rule: an element pipeline plus its head

use super::elements::{Env, RuleElement};
use super::types::{Head, Predicate, Tuple};
use crate::error::Result;
use crate::facts::Facts;
use crate::storage::{ops, Relation};

#[derive(Clone, Debug)]
pub struct CompiledRule {
    elements: Vec<RuleElement>,
    head: Option<Head>,
    source: String,
}

impl CompiledRule {
    pub fn new(elements: Vec<RuleElement>, head: Option<Head>, source: String) -> Self {
        CompiledRule {
            elements,
            head,
            source,
        }
    }

    pub fn elements(&self) -> &[RuleElement] {
        &self.elements
    }

    /// Predicate the rule derives tuples for; `None` for queries
    pub fn head_predicate(&self) -> Option<Predicate> {
        self.head.as_ref().map(Head::predicate)
    }

    /// Tuple describing the rows `evaluate` returns
    pub fn output_tuple(&self) -> &Tuple {
        static EMPTY: Tuple = Tuple::EMPTY;
        self.elements.last().map(RuleElement::output_tuple).unwrap_or(&EMPTY)
    }

    /// Rule or query text this was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the whole pipeline. Each intermediate relation is moved into the
    /// next stage and dropped there.
    pub fn evaluate(&self, env: &mut Env<'_>) -> Result<Relation> {
        let mut current: Option<Relation> = None;
        for element in &self.elements {
            current = Some(element.process(current, env)?);
        }
        Ok(current.unwrap_or_else(|| Relation::new(self.output_tuple().arity())))
    }

    /// Semi-naive step: for every element with a non-empty delta, evaluate
    /// the pipeline with that element reading only the delta, and union the
    /// results. The original element is restored before any error is returned.
    pub fn evaluate_iteratively(&mut self, deltas: &Facts, env: &mut Env<'_>) -> Result<Relation> {
        let mut accumulated: Option<Relation> = None;

        for i in 0..self.elements.len() {
            let Some(substitute) = self.elements[i].delta_substitution(deltas) else {
                continue;
            };
            let original = std::mem::replace(&mut self.elements[i], substitute);
            let outcome = self.evaluate(env);
            drop(std::mem::replace(&mut self.elements[i], original));

            let derived = outcome?;
            accumulated = Some(match accumulated {
                Some(acc) => ops::union(acc, &derived)?,
                None => derived,
            });
        }

        Ok(accumulated.unwrap_or_else(|| Relation::bag(self.output_tuple().arity())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::compiler::RuleCompiler;
    use crate::datalog::types::{Atom, Literal, Rule, Term, Value};
    use crate::equivalence::EquivalenceStore;

    fn t(values: &[&str]) -> Tuple {
        Tuple::ground(values.iter().map(|s| Value::from(*s)).collect())
    }

    fn transitive_rule() -> Rule {
        Rule::new(
            Head::atom("path", vec![Term::var("X"), Term::var("Z")]),
            vec![
                Literal::positive(Atom::new("path", vec![Term::var("X"), Term::var("Y")])),
                Literal::positive(Atom::new("edge", vec![Term::var("Y"), Term::var("Z")])),
            ],
        )
    }

    #[test]
    fn test_evaluate_joins_and_projects() {
        let mut facts = Facts::new();
        let edge = Predicate::new("edge", 2);
        let path = Predicate::new("path", 2);
        facts.add(&edge, t(&["b", "c"])).unwrap();
        facts.add(&path, t(&["a", "b"])).unwrap();

        let compiled = RuleCompiler::new(&mut facts).compile_rule(&transitive_rule()).unwrap();
        let mut eq = EquivalenceStore::new();
        let out = compiled.evaluate(&mut Env::new(&facts, &mut eq)).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out.contains(&t(&["a", "c"])));
    }

    #[test]
    fn test_evaluate_iteratively_uses_only_deltas() {
        let mut facts = Facts::new();
        let edge = Predicate::new("edge", 2);
        let path = Predicate::new("path", 2);
        facts.add(&edge, t(&["b", "c"])).unwrap();
        facts.add(&edge, t(&["c", "d"])).unwrap();
        facts.add(&path, t(&["a", "b"])).unwrap();
        facts.add(&path, t(&["x", "c"])).unwrap();

        let mut compiled = RuleCompiler::new(&mut facts).compile_rule(&transitive_rule()).unwrap();

        // only path(a, b) is new this round
        let mut deltas = Facts::new();
        deltas.add(&path, t(&["a", "b"])).unwrap();

        let mut eq = EquivalenceStore::new();
        let out = compiled
            .evaluate_iteratively(&deltas, &mut Env::new(&facts, &mut eq))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.contains(&t(&["a", "c"])));

        // the pipeline reads the full relations again afterwards
        let full = compiled.evaluate(&mut Env::new(&facts, &mut eq)).unwrap();
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn test_evaluate_iteratively_without_deltas_is_empty() {
        let mut facts = Facts::new();
        facts.add(&Predicate::new("path", 2), t(&["a", "b"])).unwrap();
        facts.add(&Predicate::new("edge", 2), t(&["b", "c"])).unwrap();
        let mut compiled = RuleCompiler::new(&mut facts).compile_rule(&transitive_rule()).unwrap();

        let deltas = Facts::new();
        let mut eq = EquivalenceStore::new();
        let out = compiled
            .evaluate_iteratively(&deltas, &mut Env::new(&facts, &mut eq))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.arity(), 2);
    }
}
