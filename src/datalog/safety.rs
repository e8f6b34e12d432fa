//! Rule safety
//!
//! A variable is limited when a positive stored literal binds it, or when a
//! positive builtin can compute it from variables that are already limited.
//! A rule is safe when every head variable is limited, every variable of a
//! negated builtin is limited, and every variable of a negated stored literal
//! is limited, or (when allowed) occurs in that one literal only.

use std::collections::HashSet;

use super::types::{Atom, Rule};
use crate::error::{KbError, Result};

pub trait RuleSafety: Send + Sync {
    /// `Ok(())` for a safe rule, `RuleUnsafe` naming the unlimited variables otherwise
    fn check(&self, rule: &Rule) -> Result<()>;

    fn is_safe(&self, rule: &Rule) -> bool {
        self.check(rule).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StandardSafety {
    pub allow_unbound_negated_variables: bool,
}

impl Default for StandardSafety {
    fn default() -> Self {
        StandardSafety {
            allow_unbound_negated_variables: true,
        }
    }
}

impl StandardSafety {
    pub fn new(allow_unbound_negated_variables: bool) -> Self {
        StandardSafety {
            allow_unbound_negated_variables,
        }
    }

    fn limited_variables<'r>(rule: &'r Rule) -> HashSet<&'r str> {
        let mut limited: HashSet<&str> = rule
            .body()
            .iter()
            .filter(|lit| lit.is_positive() && !lit.atom().is_builtin())
            .flat_map(|lit| lit.variables())
            .collect();

        // builtins may extend the limited set, possibly enabling each other
        let mut changed = true;
        while changed {
            changed = false;
            for lit in rule.body().iter().filter(|l| l.is_positive()) {
                let Atom::Builtin(atom) = lit.atom() else { continue };
                let vars = atom.tuple().variables();
                let unknown = vars.iter().filter(|v| !limited.contains(*v)).count();
                if unknown > 0 && unknown <= atom.builtin().max_unknown_variables() {
                    limited.extend(vars);
                    changed = true;
                }
            }
        }
        limited
    }
}

impl RuleSafety for StandardSafety {
    fn check(&self, rule: &Rule) -> Result<()> {
        let limited = Self::limited_variables(rule);
        let mut unsafe_vars: Vec<String> = Vec::new();
        let mut flag = |var: &str| {
            if !unsafe_vars.iter().any(|v| v == var) {
                unsafe_vars.push(var.to_string());
            }
        };

        for var in rule.head().tuple().variables() {
            if !limited.contains(var) {
                flag(var);
            }
        }

        for (i, lit) in rule.body().iter().enumerate() {
            if lit.is_positive() {
                continue;
            }
            for var in lit.variables() {
                if limited.contains(var) {
                    continue;
                }
                let local_only = !lit.atom().is_builtin()
                    && self.allow_unbound_negated_variables
                    && !rule.head().tuple().contains_var(var)
                    && rule
                        .body()
                        .iter()
                        .enumerate()
                        .all(|(j, other)| j == i || !other.atom().tuple().contains_var(var));
                if !local_only {
                    flag(var);
                }
            }
        }

        if unsafe_vars.is_empty() {
            Ok(())
        } else {
            Err(KbError::RuleUnsafe {
                rule: rule.to_string(),
                variables: unsafe_vars,
            })
        }
    }
}
