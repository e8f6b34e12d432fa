//! KnowledgeBase - one evaluation session over a program
//!
//! Lifecycle: load → evaluate → execute → dispose.
//!
//! A query first tries the registered optimizers. The first one that applies
//! rewrites the program for that query, and the rewritten program runs on a
//! copy of the facts so the stored model stays untouched. When no optimizer
//! applies the full model is computed once and every later query reads it
//! directly.
//!
//! A stratification, safety or compilation failure is permanent: it is
//! returned again by every later call until the knowledge base is disposed.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;

use crate::config::{KbConfig, StorageMode};
use crate::datalog::eval::{EvaluationStats, QueryAnswer, StratifiedEvaluator};
use crate::datalog::optimizer::ProgramOptimizer;
use crate::datalog::safety::RuleSafety;
use crate::datalog::types::{Predicate, Program, Query, Rule};
use crate::equivalence::EquivalenceStore;
use crate::error::{KbError, Result, StorageError};
use crate::facts::Facts;
use crate::metrics::{duration_ms, Metrics};
use crate::storage::{snapshot, Relation};

/// File name of the model snapshot inside a session directory
pub const MODEL_FILE: &str = "model.bin";

pub struct KnowledgeBase {
    config: KbConfig,
    rules: Vec<Rule>,
    queries: Vec<Query>,
    facts: Facts,
    equivalences: EquivalenceStore,
    evaluator: StratifiedEvaluator,
    optimizers: Vec<Box<dyn ProgramOptimizer>>,
    metrics: Option<Arc<Metrics>>,
    cancel: Arc<AtomicBool>,
    /// Session directory of a persistent knowledge base
    session: Option<TempDir>,
    last_stats: Option<EvaluationStats>,
    /// No optimizer applied to some query; never try them again
    optimization_failed: bool,
    failure: Option<KbError>,
    disposed: bool,
}

impl KnowledgeBase {
    /// Load the program's facts; nothing is evaluated yet
    pub fn new(program: Program, config: KbConfig) -> Result<Self> {
        config.validate()?;

        let mut facts = Facts::with_limit(config.max_relation_size);
        for (predicate, tuple) in program.facts() {
            facts.add(predicate, tuple.clone())?;
        }

        let session = match config.storage {
            StorageMode::InMemory => None,
            StorageMode::Persistent => Some(
                tempfile::Builder::new()
                    .prefix("stratalog-")
                    .tempdir()?,
            ),
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let evaluator = StratifiedEvaluator::new(&config).with_cancel_flag(Arc::clone(&cancel));

        tracing::debug!(
            "knowledge base loaded: {} facts, {} rules, {} queries",
            facts.tuple_count(),
            program.rules().len(),
            program.queries().len()
        );

        Ok(KnowledgeBase {
            config,
            rules: program.rules().to_vec(),
            queries: program.queries().to_vec(),
            facts,
            equivalences: EquivalenceStore::new(),
            evaluator,
            optimizers: Vec::new(),
            metrics: None,
            cancel,
            session,
            last_stats: None,
            optimization_failed: false,
            failure: None,
            disposed: false,
        })
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn ProgramOptimizer>) -> Self {
        self.optimizers.push(optimizer);
        self
    }

    pub fn with_safety(mut self, safety: Box<dyn RuleSafety>) -> Self {
        self.evaluator = StratifiedEvaluator::new(&self.config)
            .with_cancel_flag(Arc::clone(&self.cancel))
            .with_safety(safety);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag that stops a running evaluation between rounds
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &KbConfig {
        &self.config
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    pub fn equivalences(&self) -> &EquivalenceStore {
        &self.equivalences
    }

    pub fn relation(&self, predicate: &Predicate) -> Result<&Relation> {
        self.facts
            .relation(predicate)
            .ok_or_else(|| StorageError::UnknownRelation(predicate.to_string()).into())
    }

    /// Whether the full model has been computed
    pub fn is_evaluated(&self) -> bool {
        self.last_stats.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn session_path(&self) -> Option<&Path> {
        self.session.as_ref().map(TempDir::path)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.disposed {
            return Err(KbError::Disposed);
        }
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn remember<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_permanent() || matches!(e, KbError::EvaluationTimeout { .. }) {
                self.failure = Some(e.clone());
            }
        }
        result
    }

    /// Compute the full model; later calls return the first run's stats
    pub fn evaluate(&mut self) -> Result<EvaluationStats> {
        self.ensure_usable()?;
        if let Some(stats) = &self.last_stats {
            return Ok(stats.clone());
        }

        let result =
            self.evaluator
                .evaluate(&self.rules, &mut self.facts, &mut self.equivalences);
        let stats = self.remember(result)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_evaluation(&stats);
        }
        if let Some(dir) = &self.session {
            snapshot::save(&self.facts, &dir.path().join(MODEL_FILE))?;
        }
        self.last_stats = Some(stats.clone());
        Ok(stats)
    }

    /// Answer a query
    pub fn execute(&mut self, query: &Query) -> Result<QueryAnswer> {
        self.ensure_usable()?;
        let start = Instant::now();

        let result = self.answer(query);
        let answer = self.remember(result)?;

        let elapsed = duration_ms(start.elapsed());
        let text = query.to_string();
        tracing::debug!("{} answered with {} rows in {}ms", text, answer.len(), elapsed);
        if elapsed >= self.config.slow_query_threshold_ms {
            tracing::warn!("slow query ({}ms): {}", elapsed, text);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_query(&text, elapsed);
        }
        Ok(answer)
    }

    /// Answer every query the program came with, in order
    pub fn execute_all(&mut self) -> Result<Vec<QueryAnswer>> {
        let queries = self.queries.clone();
        queries.iter().map(|q| self.execute(q)).collect()
    }

    fn answer(&mut self, query: &Query) -> Result<QueryAnswer> {
        if !self.is_evaluated() && !self.optimization_failed {
            if let Some((rules, optimized)) = self.optimize(query) {
                let mut facts = self.facts.clone();
                let mut equivalences = self.equivalences.clone();
                self.evaluator.evaluate(&rules, &mut facts, &mut equivalences)?;
                return self
                    .evaluator
                    .evaluate_query(&optimized, &mut facts, &mut equivalences);
            }
            if !self.optimizers.is_empty() {
                tracing::warn!("no optimizer applies to {}, computing the full model", query);
            }
            self.optimization_failed = true;
        }

        self.evaluate()?;
        self.evaluator
            .evaluate_query(query, &mut self.facts, &mut self.equivalences)
    }

    fn optimize(&self, query: &Query) -> Option<(Vec<Rule>, Query)> {
        self.optimizers.iter().find_map(|optimizer| {
            let optimized = optimizer.optimize(&self.rules, query)?;
            tracing::debug!("optimizer {} applied to {}", optimizer.name(), query);
            Some(optimized)
        })
    }

    /// Write the current facts to a snapshot file
    pub fn persist(&self, path: &Path) -> Result<()> {
        if self.disposed {
            return Err(KbError::Disposed);
        }
        snapshot::save(&self.facts, path)
    }

    /// Release the facts and remove the session directory.
    ///
    /// Every later call returns `Disposed`; disposing twice is a no-op.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.facts = Facts::new();
        self.equivalences = EquivalenceStore::new();
        self.failure = None;

        if let Some(dir) = self.session.take() {
            let path: PathBuf = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove session directory {}: {}", path.display(), e);
                return Err(e.into());
            }
            tracing::debug!("removed session directory {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::optimizer::RuleFilter;
    use crate::datalog::types::{Atom, Head, Literal, Term, Tuple, Value};
    use std::sync::atomic::Ordering;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn lit(name: &str, args: &[&str]) -> Literal {
        Literal::positive(Atom::new(name, args.iter().map(|a| Term::var(*a)).collect()))
    }

    fn rule(head: &str, head_args: &[&str], body: Vec<Literal>) -> Rule {
        Rule::new(
            Head::atom(head, head_args.iter().map(|a| Term::var(*a)).collect()),
            body,
        )
    }

    fn query(name: &str, args: &[&str]) -> Query {
        Query::new(vec![lit(name, args)])
    }

    fn closure_program() -> Program {
        Program::new()
            .fact("edge", vec![s("a"), s("b")])
            .fact("edge", vec![s("b"), s("c")])
            .rule(rule("path", &["X", "Y"], vec![lit("edge", &["X", "Y"])]))
            .rule(rule(
                "path",
                &["X", "Z"],
                vec![lit("path", &["X", "Y"]), lit("edge", &["Y", "Z"])],
            ))
            .rule(rule("node", &["X"], vec![lit("edge", &["X", "Y"])]))
            .query(query("path", &["X", "Y"]))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[test]
    fn test_evaluate_then_query() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        kb.evaluate().unwrap();
        assert!(kb.is_evaluated());
        let answers = kb.execute_all().unwrap();
        assert_eq!(answers[0].len(), 3);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        let first = kb.evaluate().unwrap();
        let count = kb.facts().tuple_count();
        let second = kb.evaluate().unwrap();
        assert_eq!(first, second);
        assert_eq!(kb.facts().tuple_count(), count);
    }

    #[test]
    fn test_disposed_rejects_calls() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        kb.dispose().unwrap();
        assert!(kb.is_disposed());
        assert_eq!(kb.evaluate().unwrap_err(), KbError::Disposed);
        assert_eq!(
            kb.execute(&query("path", &["X", "Y"])).unwrap_err(),
            KbError::Disposed
        );
        kb.dispose().unwrap();
    }

    #[test]
    fn test_unknown_relation() {
        let kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        let err = kb.relation(&Predicate::new("missing", 1)).unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_fact_capacity_checked_on_load() {
        let config = KbConfig::default().max_relation_size(1);
        let err = KnowledgeBase::new(closure_program(), config).err().unwrap();
        assert_eq!(err, KbError::Storage(StorageError::CapacityExceeded { limit: 1 }));
    }

    // ========================================================================
    // Optimizer
    // ========================================================================

    #[test]
    fn test_optimized_query_leaves_model_untouched() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default())
            .unwrap()
            .with_optimizer(Box::new(RuleFilter));
        let answer = kb.execute(&query("path", &["X", "Y"])).unwrap();
        assert_eq!(answer.len(), 3);
        assert!(!kb.is_evaluated());
        assert!(kb.facts().relation(&Predicate::new("path", 2)).is_none());
    }

    #[test]
    fn test_optimizer_fallback_is_remembered() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default())
            .unwrap()
            .with_optimizer(Box::new(RuleFilter));
        // needs every rule, so the filter does not apply
        let all = Query::new(vec![lit("path", &["X", "Y"]), lit("node", &["X"])]);
        kb.execute(&all).unwrap();
        assert!(kb.is_evaluated());

        // afterwards even filterable queries read the full model
        let answer = kb.execute(&query("node", &["X"])).unwrap();
        assert_eq!(answer.rows(), vec![vec![s("a")], vec![s("b")]]);
        assert!(kb.facts().relation(&Predicate::new("path", 2)).is_some());
    }

    // ========================================================================
    // Error Memory
    // ========================================================================

    #[test]
    fn test_stratification_failure_is_remembered() {
        let program = Program::new()
            .fact("q", vec![s("a")])
            .rule(rule(
                "p",
                &["X"],
                vec![lit("q", &["X"]), Literal::negative(Atom::new("p", vec![Term::var("X")]))],
            ));
        let mut kb = KnowledgeBase::new(program, KbConfig::default()).unwrap();
        let err = kb.evaluate().unwrap_err();
        assert_eq!(err.code(), "PROGRAM_NOT_STRATIFIED");
        assert_eq!(kb.execute(&query("q", &["X"])).unwrap_err(), err);
        assert_eq!(kb.evaluate().unwrap_err(), err);
    }

    #[test]
    fn test_cancelled_evaluation() {
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        kb.cancel_flag().store(true, Ordering::Relaxed);
        let err = kb.evaluate().unwrap_err();
        assert_eq!(err.code(), "EVALUATION_TIMEOUT");
        assert!(!kb.is_evaluated());
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    #[test]
    fn test_persistent_session_removed_on_dispose() {
        let config = KbConfig::default().storage(StorageMode::Persistent);
        let mut kb = KnowledgeBase::new(closure_program(), config).unwrap();
        kb.evaluate().unwrap();

        let session = kb.session_path().unwrap().to_path_buf();
        let model = snapshot::load(&session.join(MODEL_FILE)).unwrap();
        assert!(model.contains(
            &Predicate::new("path", 2),
            &Tuple::ground(vec![s("a"), s("c")])
        ));

        kb.dispose().unwrap();
        assert!(!session.exists());
    }

    #[test]
    fn test_persist_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.bin");
        let mut kb = KnowledgeBase::new(closure_program(), KbConfig::default()).unwrap();
        kb.evaluate().unwrap();
        kb.persist(&path).unwrap();
        assert_eq!(snapshot::load(&path).unwrap().tuple_count(), kb.facts().tuple_count());
    }
}
