//! Knowledge base configuration
//!
//! Plain serde struct; every field has a default so a partial JSON document
//! is a valid configuration.
//!
//! ```
//! use stratalog::config::{KbConfig, EvaluationMode};
//!
//! let config = KbConfig::from_json(r#"{ "evaluation": "naive", "max_rounds": 50 }"#).unwrap();
//! assert_eq!(config.evaluation, EvaluationMode::Naive);
//! assert_eq!(config.max_rounds, Some(50));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KbError, Result};

/// Fixpoint strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Re-evaluate every rule against all facts each round
    Naive,
    /// Re-evaluate rules only against the tuples derived in the previous round
    #[default]
    SemiNaive,
}

/// Where a knowledge base keeps its evaluated model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    InMemory,
    /// Snapshot the model into a session directory removed on dispose
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    pub evaluation: EvaluationMode,
    /// Variables that occur only in one negated literal do not make a rule unsafe
    pub allow_unbound_negated_variables: bool,
    /// Upper bound on the tuples of any single relation
    pub max_relation_size: Option<usize>,
    /// Upper bound on fixpoint rounds per stratum
    pub max_rounds: Option<usize>,
    /// Timeout for evaluation plus queries when run through the manager
    pub timeout_ms: Option<u64>,
    /// Queries slower than this are reported as slow
    pub slow_query_threshold_ms: u64,
    pub storage: StorageMode,
}

impl Default for KbConfig {
    fn default() -> Self {
        KbConfig {
            evaluation: EvaluationMode::SemiNaive,
            allow_unbound_negated_variables: true,
            max_relation_size: None,
            max_rounds: None,
            timeout_ms: None,
            slow_query_threshold_ms: 100,
            storage: StorageMode::InMemory,
        }
    }
}

impl KbConfig {
    pub fn new() -> Self {
        KbConfig::default()
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: KbConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == Some(0) {
            return Err(KbError::Config("max_rounds must be at least 1".to_string()));
        }
        if self.max_relation_size == Some(0) {
            return Err(KbError::Config("max_relation_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn evaluation(mut self, mode: EvaluationMode) -> Self {
        self.evaluation = mode;
        self
    }

    pub fn allow_unbound_negated_variables(mut self, allow: bool) -> Self {
        self.allow_unbound_negated_variables = allow;
        self
    }

    pub fn max_relation_size(mut self, limit: usize) -> Self {
        self.max_relation_size = Some(limit);
        self
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn storage(mut self, mode: StorageMode) -> Self {
        self.storage = mode;
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
