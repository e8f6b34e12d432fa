//! Datalog engine
//!
//! Rules are compiled into chains of relational operators and evaluated
//! bottom-up, stratum by stratum, to the stratified minimal model.

pub mod builtins;
pub mod compiled;
pub mod compiler;
pub mod elements;
pub mod equality;
pub mod eval;
pub mod optimizer;
pub mod safety;
pub mod stratify;
pub mod types;


pub use builtins::{Builtin, BuiltinRegistry};
pub use compiled::CompiledRule;
pub use compiler::RuleCompiler;
pub use elements::{Env, RuleElement};
pub use eval::{EvaluationStats, EvaluatorState, QueryAnswer, StratifiedEvaluator};
pub use optimizer::{ProgramOptimizer, RuleFilter};
pub use safety::{RuleSafety, StandardSafety};
pub use stratify::{stratify, Stratification};
pub use types::{Atom, Head, Literal, Predicate, Program, Query, Rule, Term, Tuple, Value};
