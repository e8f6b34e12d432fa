//! Stratified bottom-up evaluator
//!
//! Evaluates a program to its stratified minimal model and answers queries
//! against the result.
//!
//! # Evaluation
//!
//! 1. Rules with an equality head pull in equality propagation rules
//! 2. Every rule passes the safety check
//! 3. Rules are stratified; a negative cycle fails the evaluation
//! 4. Per stratum, rules are reordered, compiled and run to a fixpoint,
//!    naive or semi-naive. Lower strata are frozen by the time a higher
//!    stratum reads them through negation.
//!
//! In semi-naive mode the first round evaluates every rule in full and the
//! tuples it adds seed the delta. Later rounds only evaluate each rule with
//! one of its literals restricted to the previous round's delta.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::compiled::CompiledRule;
use super::compiler::RuleCompiler;
use super::elements::Env;
use super::equality;
use super::safety::{RuleSafety, StandardSafety};
use super::stratify::{stratify, Stratification};
use super::types::{Predicate, Query, Rule, Term, Tuple, Value};
use crate::config::{EvaluationMode, KbConfig};
use crate::equivalence::EquivalenceStore;
use crate::error::{KbError, Result, StorageError};
use crate::facts::Facts;
use crate::storage::{ops, Relation};

/// Counters from one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationStats {
    pub strata: usize,
    pub rounds: usize,
    pub rule_applications: usize,
    pub tuples_derived: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluatorState {
    Idle,
    Stratifying,
    Fixpoint { stratum: usize },
    Done,
    Failed(KbError),
}

/// Answer to a query: the query's variables and one row per binding
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub variables: Vec<String>,
    pub relation: Relation,
}

impl QueryAnswer {
    pub fn len(&self) -> usize {
        self.relation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relation.is_empty()
    }

    /// Rows as values, sorted
    pub fn rows(&self) -> Vec<Vec<Value>> {
        let mut rows: Vec<Vec<Value>> = self
            .relation
            .iter()
            .map(|t| t.iter().filter_map(|term| term.const_value().cloned()).collect())
            .collect();
        rows.sort();
        rows
    }

    pub fn contains(&self, values: Vec<Value>) -> bool {
        self.relation.contains(&Tuple::ground(values))
    }
}

pub struct StratifiedEvaluator {
    mode: EvaluationMode,
    max_rounds: Option<usize>,
    safety: Box<dyn RuleSafety>,
    cancel: Arc<AtomicBool>,
    state: EvaluatorState,
}

impl StratifiedEvaluator {
    pub fn new(config: &KbConfig) -> Self {
        StratifiedEvaluator {
            mode: config.evaluation,
            max_rounds: config.max_rounds,
            safety: Box::new(StandardSafety::new(config.allow_unbound_negated_variables)),
            cancel: Arc::new(AtomicBool::new(false)),
            state: EvaluatorState::Idle,
        }
    }

    pub fn with_safety(mut self, safety: Box<dyn RuleSafety>) -> Self {
        self.safety = safety;
        self
    }

    /// Share a cancellation flag; evaluation stops between rounds once it is set
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &EvaluatorState {
        &self.state
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Compute the stratified minimal model of `rules` into `facts`
    pub fn evaluate(
        &mut self,
        rules: &[Rule],
        facts: &mut Facts,
        equivalences: &mut EquivalenceStore,
    ) -> Result<EvaluationStats> {
        let start = Instant::now();
        match self.run(rules, facts, equivalences, start) {
            Ok(mut stats) => {
                stats.duration = start.elapsed();
                self.state = EvaluatorState::Done;
                tracing::info!(
                    "evaluation finished: {} strata, {} rounds, {} tuples derived in {:?}",
                    stats.strata,
                    stats.rounds,
                    stats.tuples_derived,
                    stats.duration
                );
                Ok(stats)
            }
            Err(e) => {
                self.state = EvaluatorState::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        rules: &[Rule],
        facts: &mut Facts,
        equivalences: &mut EquivalenceStore,
        start: Instant,
    ) -> Result<EvaluationStats> {
        self.state = EvaluatorState::Stratifying;

        let fact_predicates: Vec<Predicate> = facts.predicates().cloned().collect();
        let rules = equality::rewrite(rules, &fact_predicates);
        for rule in &rules {
            self.safety.check(rule)?;
        }
        let stratification = stratify(&rules)?;

        let mut stats = EvaluationStats {
            strata: stratification.strata.len(),
            ..EvaluationStats::default()
        };

        for (i, stratum) in stratification.strata.iter().enumerate() {
            self.state = EvaluatorState::Fixpoint { stratum: i };
            let ordered = reorder_rules(stratum, &stratification);

            let mut compiled = {
                let mut compiler = RuleCompiler::new(facts);
                ordered
                    .iter()
                    .map(|rule| compiler.compile_rule(rule))
                    .collect::<Result<Vec<_>>>()?
            };

            let rounds_before = stats.rounds;
            match self.mode {
                EvaluationMode::Naive => {
                    self.naive(&compiled, facts, equivalences, &mut stats, start)?
                }
                EvaluationMode::SemiNaive => {
                    self.semi_naive(&mut compiled, facts, equivalences, &mut stats, start)?
                }
            }
            tracing::debug!(
                "stratum {}: {} rules reached fixpoint after {} rounds",
                i,
                compiled.len(),
                stats.rounds - rounds_before
            );
        }
        Ok(stats)
    }

    fn check_round(&self, round: usize, start: Instant) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(KbError::EvaluationTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
        if let Some(limit) = self.max_rounds {
            if round > limit {
                return Err(StorageError::RoundLimit(limit).into());
            }
        }
        Ok(())
    }

    /// Evaluate every rule against all facts until a pass adds nothing
    fn naive(
        &self,
        compiled: &[CompiledRule],
        facts: &mut Facts,
        equivalences: &mut EquivalenceStore,
        stats: &mut EvaluationStats,
        start: Instant,
    ) -> Result<()> {
        let mut round = 0;
        loop {
            round += 1;
            self.check_round(round, start)?;
            stats.rounds += 1;

            let mut added = 0;
            for rule in compiled {
                let derived = rule.evaluate(&mut Env::new(facts, equivalences))?;
                stats.rule_applications += 1;
                added += merge_derived(rule, &derived, facts, None)?;
            }
            stats.tuples_derived += added;
            if added == 0 {
                return Ok(());
            }
        }
    }

    /// Full first round, then rounds driven by the previous round's delta
    fn semi_naive(
        &self,
        compiled: &mut [CompiledRule],
        facts: &mut Facts,
        equivalences: &mut EquivalenceStore,
        stats: &mut EvaluationStats,
        start: Instant,
    ) -> Result<()> {
        let mut round = 1;
        self.check_round(round, start)?;
        stats.rounds += 1;

        let mut deltas = Facts::new();
        for rule in compiled.iter() {
            let derived = rule.evaluate(&mut Env::new(facts, equivalences))?;
            stats.rule_applications += 1;
            stats.tuples_derived += merge_derived(rule, &derived, facts, Some(&mut deltas))?;
        }

        while !deltas.is_empty() {
            round += 1;
            self.check_round(round, start)?;
            stats.rounds += 1;

            let mut next = Facts::new();
            for rule in compiled.iter_mut() {
                let derived = rule.evaluate_iteratively(&deltas, &mut Env::new(facts, equivalences))?;
                stats.rule_applications += 1;
                stats.tuples_derived += merge_derived(rule, &derived, facts, Some(&mut next))?;
            }
            deltas = next;
        }
        Ok(())
    }

    /// Compile and run a query against `facts`
    pub fn evaluate_query(
        &self,
        query: &Query,
        facts: &mut Facts,
        equivalences: &mut EquivalenceStore,
    ) -> Result<QueryAnswer> {
        let compiled = RuleCompiler::new(facts).compile_query(query)?;
        let body = compiled.evaluate(&mut Env::new(facts, equivalences))?;
        let output = compiled.output_tuple();

        let variables: Vec<String> = query
            .variables()
            .into_iter()
            .filter(|v| output.contains_var(v))
            .map(str::to_string)
            .collect();

        let relation = if variables.is_empty() {
            // ground query: one empty row per matching derivation
            let mut rows = Relation::bag(0);
            for _ in 0..body.len() {
                rows.insert(Tuple::empty());
            }
            rows
        } else {
            let onto: Tuple = variables.iter().map(Term::var).collect();
            ops::project(&body, output, &onto)?
        };

        Ok(QueryAnswer { variables, relation })
    }
}

/// Merge a rule's derived rows into the facts; new tuples also go to `delta`
fn merge_derived(
    rule: &CompiledRule,
    derived: &Relation,
    facts: &mut Facts,
    delta: Option<&mut Facts>,
) -> Result<usize> {
    let Some(head) = rule.head_predicate() else {
        return Ok(0);
    };
    let fresh = facts.merge(&head, derived)?;
    if let Some(delta) = delta {
        delta.merge(&head, &fresh)?;
    }
    Ok(fresh.len())
}

/// Rules with fewer recursive literals first, then shorter bodies
fn reorder_rules(rules: &[Rule], stratification: &Stratification) -> Vec<Rule> {
    let mut ordered = rules.to_vec();
    ordered.sort_by_key(|rule| {
        let stratum = stratification.stratum_of(&rule.head().predicate());
        let recursive = rule
            .body_predicates()
            .filter(|(p, _)| stratification.stratum_of(p) == stratum)
            .count();
        (recursive, rule.body().len())
    });
    ordered
}
