//! Stratalog - stratified Datalog knowledge bases
//!
//! A deductive database core: programs of facts and rules are evaluated
//! bottom-up to their stratified minimal model, then queried.
//!
//! - `datalog` - terms, rule compilation, stratification and evaluation
//! - `storage` - relations and the relational operators over them
//! - `knowledge_base` - a program with its facts, evaluated on demand
//! - `kb_manager` - named knowledge bases, timeouts and batch evaluation

pub mod config;
pub mod datalog;
pub mod equivalence;
pub mod error;
pub mod facts;
pub mod kb_manager;
pub mod knowledge_base;
pub mod metrics;
pub mod storage;

pub use config::{EvaluationMode, KbConfig, StorageMode};
pub use datalog::{
    Atom, Head, Literal, Predicate, Program, Query, QueryAnswer, Rule, Term, Tuple, Value,
};
pub use equivalence::EquivalenceStore;
pub use error::{KbError, Result};
pub use facts::Facts;
pub use kb_manager::KnowledgeBaseManager;
pub use knowledge_base::KnowledgeBase;
pub use metrics::Metrics;
pub use storage::Relation;
