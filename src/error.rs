//! Error types for the knowledge base
//!
//! All errors are `Clone` so that a knowledge base which failed to
//! stratify, check or compile its program can report the same error on
//! every later call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KbError {
    #[error("Program is not stratified: negative cycle through {}", cycle_display(.predicates))]
    ProgramNotStratified { predicates: Vec<String> },

    #[error("Rule is unsafe: {rule} (unlimited variables: {})", .variables.join(", "))]
    RuleUnsafe { rule: String, variables: Vec<String> },

    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    #[error("Builtin {builtin}: {reason}")]
    BuiltinBinding { builtin: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Evaluation timed out after {elapsed_ms}ms")]
    EvaluationTimeout { elapsed_ms: u64 },

    #[error("Knowledge base has already been disposed")]
    Disposed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Knowledge base '{0}' already exists")]
    KnowledgeBaseExists(String),

    #[error("Knowledge base '{0}' not found")]
    KnowledgeBaseNotFound(String),

    #[error("Invalid knowledge base name: {0}")]
    InvalidName(String),

    #[error("Evaluation worker failed: {0}")]
    Worker(String),
}

/// Failures while turning a rule body into a pipeline of rule elements.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilationError {
    #[error("no literal could be placed, first failure at {literal}: {cause}")]
    Unplaceable { literal: String, cause: Box<KbError> },

    #[error("constructed terms are not supported: {literal}")]
    UnsupportedConstructedTerm { literal: String },

    #[error("head {head} is not ground but the body binds no variables")]
    UngroundHead { head: String },

    #[error("{literal} needs {} to be bound first", .variables.join(", "))]
    UnboundVariables { literal: String, variables: Vec<String> },
}

/// Failures of the relation layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("tuple {0} is not ground")]
    NonGroundTuple(String),

    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    #[error("relation capacity of {limit} tuples exceeded")]
    CapacityExceeded { limit: usize },

    #[error("fixpoint did not converge within {0} rounds")]
    RoundLimit(usize),

    #[error("snapshot: {0}")]
    Snapshot(String),
}

fn cycle_display(predicates: &[String]) -> String {
    let mut cycle = predicates.to_vec();
    if let Some(first) = predicates.first() {
        cycle.push(first.clone());
    }
    cycle.join(" -> ")
}

impl From<std::io::Error> for KbError {
    fn from(e: std::io::Error) -> Self {
        KbError::Storage(StorageError::Snapshot(e.to_string()))
    }
}

impl From<bincode::Error> for KbError {
    fn from(e: bincode::Error) -> Self {
        KbError::Storage(StorageError::Snapshot(e.to_string()))
    }
}

impl From<serde_json::Error> for KbError {
    fn from(e: serde_json::Error) -> Self {
        KbError::Config(e.to_string())
    }
}

impl KbError {
    /// Stable error code for callers that report errors across a process boundary
    pub fn code(&self) -> &'static str {
        match self {
            KbError::ProgramNotStratified { .. } => "PROGRAM_NOT_STRATIFIED",
            KbError::RuleUnsafe { .. } => "RULE_UNSAFE",
            KbError::Compilation(_) => "COMPILATION_FAILED",
            KbError::BuiltinBinding { .. } => "BUILTIN_BINDING",
            KbError::Storage(_) => "STORAGE_ERROR",
            KbError::EvaluationTimeout { .. } => "EVALUATION_TIMEOUT",
            KbError::Disposed => "DISPOSED",
            KbError::Config(_) => "INVALID_CONFIG",
            KbError::KnowledgeBaseExists(_) => "KNOWLEDGE_BASE_EXISTS",
            KbError::KnowledgeBaseNotFound(_) => "KNOWLEDGE_BASE_NOT_FOUND",
            KbError::InvalidName(_) => "INVALID_KNOWLEDGE_BASE_NAME",
            KbError::Worker(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors a knowledge base keeps reporting until disposed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            KbError::ProgramNotStratified { .. }
                | KbError::RuleUnsafe { .. }
                | KbError::Compilation(_)
                | KbError::BuiltinBinding { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_stratified_display_closes_cycle() {
        let err = KbError::ProgramNotStratified {
            predicates: vec!["p/1".to_string(), "q/1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Program is not stratified: negative cycle through p/1 -> q/1 -> p/1"
        );
        assert_eq!(err.code(), "PROGRAM_NOT_STRATIFIED");
    }

    #[test]
    fn test_unplaceable_carries_cause() {
        let cause = KbError::BuiltinBinding {
            builtin: "ADD".to_string(),
            reason: "2 unknown variables, at most 1 allowed".to_string(),
        };
        let err: KbError = CompilationError::Unplaceable {
            literal: "ADD(?X, ?Y, 3)".to_string(),
            cause: Box::new(cause),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("ADD(?X, ?Y, 3)"));
        assert!(text.contains("at most 1 allowed"));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: KbError = io.into();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(!err.is_permanent());
    }
}
