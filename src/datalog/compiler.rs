//! Rule compiler
//!
//! Turns a rule or query body into an ordered pipeline of [`RuleElement`]s.
//!
//! # Literal placement
//!
//! The body is an unordered set of literals. The compiler keeps the literals
//! not placed yet and the variables bound so far (the output tuple of the
//! last placed element). Each pass scans the remaining literals in order and
//! places the first one that can run with the current bindings:
//!
//! - positive stored literal: always; a first subgoal or a join
//! - negated stored literal: once every variable it shares with another
//!   remaining non-negated literal is bound; variables that occur nowhere
//!   else do not constrain the anti-join
//! - builtin: once at most `max_unknown_variables()` of its variables are
//!   unbound (negated builtins also wait like negated stored literals)
//!
//! A pass that places nothing fails the compilation with the first failure
//! recorded in that pass.

use std::collections::HashSet;

use super::compiled::CompiledRule;
use super::elements::RuleElement;
use super::types::{Atom, Head, Literal, Query, Rule, Tuple};
use crate::error::{CompilationError, KbError, Result};
use crate::facts::Facts;

pub struct RuleCompiler<'f> {
    facts: &'f mut Facts,
}

impl<'f> RuleCompiler<'f> {
    pub fn new(facts: &'f mut Facts) -> Self {
        RuleCompiler { facts }
    }

    /// Compile a rule: body pipeline followed by a head substituter
    pub fn compile_rule(&mut self, rule: &Rule) -> Result<CompiledRule> {
        let head = rule.head();
        if head.tuple().has_constructed() {
            tracing::warn!("constructed term in rule head: {}", rule);
            return Err(CompilationError::UnsupportedConstructedTerm {
                literal: head.to_string(),
            }
            .into());
        }

        let mut elements = self.compile_body(rule.body())?;
        let bound = last_output(&elements).clone();

        let missing: Vec<String> = head
            .tuple()
            .variables()
            .into_iter()
            .filter(|v| !bound.contains_var(v))
            .map(str::to_string)
            .collect();
        // With nothing bound the head substituter reports the unground head itself
        if !missing.is_empty() && !bound.is_empty() {
            return Err(KbError::RuleUnsafe {
                rule: rule.to_string(),
                variables: missing,
            });
        }

        if let Head::Atom { predicate, .. } = head {
            self.facts.ensure(predicate);
        }
        elements.push(RuleElement::head_substituter(head.clone(), bound));

        tracing::debug!(
            "compiled {} as [{}]",
            rule,
            elements.iter().map(RuleElement::kind).collect::<Vec<_>>().join(", ")
        );
        Ok(CompiledRule::new(elements, Some(head.clone()), rule.to_string()))
    }

    /// Compile a query: body pipeline only
    pub fn compile_query(&mut self, query: &Query) -> Result<CompiledRule> {
        let elements = self.compile_body(query.literals())?;
        Ok(CompiledRule::new(elements, None, query.to_string()))
    }

    /// Order and compile body literals. An empty body compiles to `True`.
    pub fn compile_body(&mut self, literals: &[Literal]) -> Result<Vec<RuleElement>> {
        for literal in literals {
            if literal.atom().tuple().has_constructed() {
                tracing::warn!("constructed term in literal {}", literal);
                return Err(CompilationError::UnsupportedConstructedTerm {
                    literal: literal.to_string(),
                }
                .into());
            }
            check_builtin_arity(literal)?;
        }

        let mut remaining: Vec<&Literal> = literals.iter().collect();
        let mut elements: Vec<RuleElement> = Vec::with_capacity(literals.len() + 1);

        while !remaining.is_empty() {
            let bound = last_output(&elements).clone();
            let mut first_failure: Option<(String, KbError)> = None;
            let mut placed = None;

            for (pos, literal) in remaining.iter().enumerate() {
                match self.place(literal, pos, &remaining, &bound, elements.is_empty()) {
                    Ok(element) => {
                        placed = Some((pos, element));
                        break;
                    }
                    Err(e) => {
                        if first_failure.is_none() {
                            first_failure = Some((literal.to_string(), e));
                        }
                    }
                }
            }

            match (placed, first_failure) {
                (Some((pos, element)), _) => {
                    elements.push(element);
                    remaining.remove(pos);
                }
                (None, Some((literal, cause))) => {
                    return Err(CompilationError::Unplaceable {
                        literal,
                        cause: Box::new(cause),
                    }
                    .into());
                }
                (None, None) => break,
            }
        }

        if elements.is_empty() {
            elements.push(RuleElement::True);
        }
        Ok(elements)
    }

    /// Element for `literal` given the current bindings, or why it cannot run yet
    fn place(
        &mut self,
        literal: &Literal,
        pos: usize,
        remaining: &[&Literal],
        bound: &Tuple,
        first: bool,
    ) -> Result<RuleElement> {
        match literal.atom() {
            Atom::Stored { predicate, tuple } if literal.is_positive() => {
                self.facts.ensure(predicate);
                if first {
                    Ok(RuleElement::first_subgoal(predicate.clone(), tuple.clone()))
                } else {
                    Ok(RuleElement::joiner(predicate.clone(), tuple.clone(), bound.clone()))
                }
            }
            Atom::Stored { predicate, tuple } => {
                wait_for_shared_variables(literal, pos, remaining, bound)?;
                self.facts.ensure(predicate);
                Ok(RuleElement::differ(predicate.clone(), tuple.clone(), bound.clone()))
            }
            Atom::Builtin(atom) => {
                let builtin = atom.builtin();
                let unknowns: Vec<&str> = atom
                    .tuple()
                    .variables()
                    .into_iter()
                    .filter(|v| !bound.contains_var(v))
                    .collect();
                if unknowns.len() > builtin.max_unknown_variables() {
                    return Err(KbError::BuiltinBinding {
                        builtin: builtin.name().to_string(),
                        reason: format!(
                            "{} unknown variables ({}), at most {} allowed",
                            unknowns.len(),
                            unknowns.join(", "),
                            builtin.max_unknown_variables()
                        ),
                    });
                }
                if literal.is_negative() {
                    wait_for_shared_variables(literal, pos, remaining, bound)?;
                }
                Ok(RuleElement::builtin(atom.clone(), literal.is_positive(), bound.clone()))
            }
        }
    }
}

fn last_output(elements: &[RuleElement]) -> &Tuple {
    static EMPTY: Tuple = Tuple::EMPTY;
    elements.last().map(RuleElement::output_tuple).unwrap_or(&EMPTY)
}

fn check_builtin_arity(literal: &Literal) -> Result<()> {
    if let Atom::Builtin(atom) = literal.atom() {
        let expected = atom.builtin().arity();
        if atom.tuple().arity() != expected {
            return Err(KbError::BuiltinBinding {
                builtin: atom.builtin().name().to_string(),
                reason: format!("expects {} arguments, got {}", expected, atom.tuple().arity()),
            });
        }
    }
    Ok(())
}

/// A negated literal may run once the variables it shares with other
/// remaining non-negated literals are bound
fn wait_for_shared_variables(
    literal: &Literal,
    pos: usize,
    remaining: &[&Literal],
    bound: &Tuple,
) -> Result<()> {
    let elsewhere: HashSet<&str> = remaining
        .iter()
        .enumerate()
        .filter(|(i, other)| *i != pos && other.is_positive())
        .flat_map(|(_, other)| other.variables())
        .collect();

    let pending: Vec<String> = literal
        .variables()
        .into_iter()
        .filter(|v| !bound.contains_var(v) && elsewhere.contains(v))
        .map(str::to_string)
        .collect();

    if pending.is_empty() {
        Ok(())
    } else {
        Err(CompilationError::UnboundVariables {
            literal: literal.to_string(),
            variables: pending,
        }
        .into())
    }
}
