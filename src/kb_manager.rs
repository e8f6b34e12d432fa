//! KnowledgeBaseManager - thread-safe registry of knowledge bases
//!
//! # Architecture
//!
//! - `KnowledgeBaseManager` holds a thread-safe HashMap of knowledge bases
//! - Each entry wraps a `KnowledgeBase` in a `Mutex`; evaluation of one
//!   knowledge base is single-threaded, different ones run in parallel
//! - One `Metrics` collector is shared by every knowledge base it creates
//!
//! Programs can also be run without registering them: `run_with_timeout`
//! evaluates on a worker thread and gives up after a deadline, and
//! `evaluate_all` evaluates independent programs in parallel.
//!
//! # Usage
//!
//! ```
//! use stratalog::kb_manager::KnowledgeBaseManager;
//! use stratalog::{KbConfig, Program, Value};
//!
//! let manager = KnowledgeBaseManager::new();
//! let program = Program::new().fact("edge", vec![Value::from("a"), Value::from("b")]);
//! manager.create("graph-1", program, KbConfig::default()).unwrap();
//!
//! assert!(manager.exists("graph-1"));
//! manager.drop_knowledge_base("graph-1").unwrap();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use rayon::prelude::*;

use crate::config::KbConfig;
use crate::datalog::eval::QueryAnswer;
use crate::datalog::optimizer::ProgramOptimizer;
use crate::datalog::types::{Program, Query};
use crate::error::{KbError, Result};
use crate::knowledge_base::KnowledgeBase;
use crate::metrics::{duration_ms, Metrics};

/// Knowledge base information for listings
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseInfo {
    pub name: String,
    pub rule_count: usize,
    pub tuple_count: usize,
    pub evaluated: bool,
}

fn lock(kb: &Mutex<KnowledgeBase>) -> MutexGuard<'_, KnowledgeBase> {
    kb.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Load, evaluate and answer every query of a program
fn run_program(program: Program, config: KbConfig, metrics: Arc<Metrics>) -> Result<Vec<QueryAnswer>> {
    let mut kb = KnowledgeBase::new(program, config)?.with_metrics(metrics);
    let result = kb.evaluate().and_then(|_| kb.execute_all());
    kb.dispose()?;
    result
}

pub struct KnowledgeBaseManager {
    bases: RwLock<HashMap<String, Arc<Mutex<KnowledgeBase>>>>,
    metrics: Arc<Metrics>,
}

impl KnowledgeBaseManager {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            bases: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Validate knowledge base name
    ///
    /// Allowed characters: [a-zA-Z0-9_-]
    /// Length: 1-128 characters
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > 128 {
            return Err(KbError::InvalidName("Name must be 1-128 characters".to_string()));
        }

        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if !valid {
            return Err(KbError::InvalidName(
                "Name can only contain a-z, A-Z, 0-9, _, -".to_string(),
            ));
        }

        Ok(())
    }

    /// Load a program into a new named knowledge base
    pub fn create(&self, name: &str, program: Program, config: KbConfig) -> Result<()> {
        self.create_with_optimizers(name, program, config, Vec::new())
    }

    pub fn create_with_optimizers(
        &self,
        name: &str,
        program: Program,
        config: KbConfig,
        optimizers: Vec<Box<dyn ProgramOptimizer>>,
    ) -> Result<()> {
        Self::validate_name(name)?;

        let mut bases = self.bases.write().unwrap_or_else(PoisonError::into_inner);
        if bases.contains_key(name) {
            return Err(KbError::KnowledgeBaseExists(name.to_string()));
        }

        let mut kb = KnowledgeBase::new(program, config)?.with_metrics(Arc::clone(&self.metrics));
        for optimizer in optimizers {
            kb = kb.with_optimizer(optimizer);
        }
        bases.insert(name.to_string(), Arc::new(Mutex::new(kb)));
        tracing::debug!("created knowledge base {}", name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Mutex<KnowledgeBase>>> {
        let bases = self.bases.read().unwrap_or_else(PoisonError::into_inner);
        bases
            .get(name)
            .cloned()
            .ok_or_else(|| KbError::KnowledgeBaseNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.bases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Remove a knowledge base and dispose it
    pub fn drop_knowledge_base(&self, name: &str) -> Result<()> {
        let kb = {
            let mut bases = self.bases.write().unwrap_or_else(PoisonError::into_inner);
            bases
                .remove(name)
                .ok_or_else(|| KbError::KnowledgeBaseNotFound(name.to_string()))?
        };
        let result = lock(&kb).dispose();
        tracing::debug!("dropped knowledge base {}", name);
        result
    }

    pub fn list(&self) -> Vec<KnowledgeBaseInfo> {
        let bases = self.bases.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<KnowledgeBaseInfo> = bases
            .iter()
            .map(|(name, kb)| {
                let kb = lock(kb);
                KnowledgeBaseInfo {
                    name: name.clone(),
                    rule_count: kb.rules().len(),
                    tuple_count: kb.facts().tuple_count(),
                    evaluated: kb.is_evaluated(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Answer a query against a registered knowledge base
    pub fn execute(&self, name: &str, query: &Query) -> Result<QueryAnswer> {
        let kb = self.get(name)?;
        let mut kb = lock(&kb);
        kb.execute(query)
    }

    /// Evaluate a program and answer its queries, bounded by the configured timeout
    pub fn run(&self, program: Program, config: KbConfig) -> Result<Vec<QueryAnswer>> {
        match config.timeout_duration() {
            Some(timeout) => self.run_with_timeout(program, config, timeout),
            None => run_program(program, config, Arc::clone(&self.metrics)),
        }
    }

    /// Evaluate a program and its queries on a worker thread.
    ///
    /// When `timeout` passes first, the knowledge base is cancelled: the
    /// worker stops at the next round boundary and drops it.
    pub fn run_with_timeout(
        &self,
        program: Program,
        config: KbConfig,
        timeout: Duration,
    ) -> Result<Vec<QueryAnswer>> {
        let start = Instant::now();
        let mut kb = KnowledgeBase::new(program, config)?.with_metrics(Arc::clone(&self.metrics));
        let cancel = kb.cancel_flag();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let worker = thread::Builder::new()
            .name("stratalog-eval".to_string())
            .spawn(move || {
                let result = kb.evaluate().and_then(|_| kb.execute_all());
                if let Err(e) = kb.dispose() {
                    tracing::warn!("dispose after evaluation failed: {}", e);
                }
                // the receiver is gone after a timeout
                let _ = tx.send(result);
            })
            .map_err(|e| KbError::Worker(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => {
                if worker.join().is_err() {
                    tracing::warn!("evaluation worker panicked after sending its result");
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, std::sync::atomic::Ordering::Relaxed);
                let elapsed_ms = duration_ms(start.elapsed());
                tracing::warn!("evaluation timed out after {}ms, cancelling", elapsed_ms);
                Err(KbError::EvaluationTimeout { elapsed_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(KbError::Worker(
                "evaluation worker exited without a result".to_string(),
            )),
        }
    }

    /// Evaluate independent programs in parallel; results keep input order
    pub fn evaluate_all(&self, programs: Vec<(Program, KbConfig)>) -> Vec<Result<Vec<QueryAnswer>>> {
        programs
            .into_par_iter()
            .map(|(program, config)| run_program(program, config, Arc::clone(&self.metrics)))
            .collect()
    }
}

impl Default for KnowledgeBaseManager {
    fn default() -> Self {
        Self::new()
    }
}
