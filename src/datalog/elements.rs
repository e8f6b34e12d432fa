//! Rule elements - the stages of a compiled rule pipeline
//!
//! Each element consumes the relation produced by the previous stage (or
//! nothing, for the first one) and produces the next. Alongside the rows it
//! carries an output tuple: the symbolic tuple whose variables name the
//! columns of the rows it produces.

use std::borrow::Cow;

use super::types::{BuiltinAtom, Head, Predicate, Term, Tuple, Value};
use crate::equivalence::EquivalenceStore;
use crate::error::{CompilationError, KbError, Result};
use crate::facts::Facts;
use crate::storage::{normalize, ops, Relation};

/// Evaluation context shared by the elements of one rule evaluation
pub struct Env<'a> {
    pub facts: &'a Facts,
    pub equivalences: &'a mut EquivalenceStore,
}

impl<'a> Env<'a> {
    pub fn new(facts: &'a Facts, equivalences: &'a mut EquivalenceStore) -> Self {
        Env { facts, equivalences }
    }
}

/// Where a literal's rows come from
#[derive(Clone, Debug)]
pub enum Source {
    /// The predicate's current relation in the facts
    Facts(Predicate),
    /// A delta relation substituted for semi-naive evaluation
    Delta(Relation),
}

impl Source {
    fn resolve<'r>(&'r self, facts: &'r Facts) -> Cow<'r, Relation> {
        match self {
            Source::Facts(predicate) => match facts.relation(predicate) {
                Some(rel) => Cow::Borrowed(rel),
                None => Cow::Owned(Relation::new(predicate.arity())),
            },
            Source::Delta(rel) => Cow::Borrowed(rel),
        }
    }

    fn predicate(&self) -> Option<&Predicate> {
        match self {
            Source::Facts(p) => Some(p),
            Source::Delta(_) => None,
        }
    }

    /// Non-empty delta for the predicate this source reads.
    ///
    /// `true/0` never changes, so it never has a delta.
    fn delta(&self, deltas: &Facts) -> Option<Source> {
        let predicate = self.predicate()?;
        if *predicate == Predicate::truth() {
            return None;
        }
        let rel = deltas.relation(predicate)?;
        if rel.is_empty() {
            return None;
        }
        Some(Source::Delta(rel.clone()))
    }
}

/// A stored literal: the relation it reads and its argument pattern
#[derive(Clone, Debug)]
pub struct Subgoal {
    predicate: Predicate,
    pattern: Tuple,
    source: Source,
}

impl Subgoal {
    pub fn new(predicate: Predicate, pattern: Tuple) -> Self {
        Subgoal {
            source: Source::Facts(predicate.clone()),
            predicate,
            pattern,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn pattern(&self) -> &Tuple {
        &self.pattern
    }

    pub fn is_delta(&self) -> bool {
        matches!(self.source, Source::Delta(_))
    }

    /// Rows of the source matching the pattern
    fn view(&self, facts: &Facts) -> Relation {
        ops::select(&self.source.resolve(facts), &self.pattern)
    }

    fn with_delta(&self, deltas: &Facts) -> Option<Subgoal> {
        Some(Subgoal {
            source: self.source.delta(deltas)?,
            ..self.clone()
        })
    }
}

// ============================================================================
// Elements
// ============================================================================

#[derive(Clone, Debug)]
pub struct FirstSubgoal {
    subgoal: Subgoal,
}

#[derive(Clone, Debug)]
pub struct Joiner {
    subgoal: Subgoal,
    input_tuple: Tuple,
    output_tuple: Tuple,
}

#[derive(Clone, Debug)]
pub struct Differ {
    subgoal: Subgoal,
    input_tuple: Tuple,
}

#[derive(Clone, Debug)]
pub struct BuiltinElement {
    atom: BuiltinAtom,
    positive: bool,
    input_tuple: Tuple,
    output_tuple: Tuple,
}

#[derive(Clone, Debug)]
pub struct HeadSubstituter {
    head: Head,
    input_tuple: Tuple,
}

#[derive(Clone, Debug)]
pub enum RuleElement {
    FirstSubgoal(FirstSubgoal),
    Joiner(Joiner),
    Differ(Differ),
    Builtin(BuiltinElement),
    HeadSubstituter(HeadSubstituter),
    True,
}

impl RuleElement {
    pub fn first_subgoal(predicate: Predicate, pattern: Tuple) -> Self {
        RuleElement::FirstSubgoal(FirstSubgoal {
            subgoal: Subgoal::new(predicate, pattern),
        })
    }

    pub fn joiner(predicate: Predicate, pattern: Tuple, input_tuple: Tuple) -> Self {
        let output_tuple = input_tuple.concat(&pattern);
        RuleElement::Joiner(Joiner {
            subgoal: Subgoal::new(predicate, pattern),
            input_tuple,
            output_tuple,
        })
    }

    pub fn differ(predicate: Predicate, pattern: Tuple, input_tuple: Tuple) -> Self {
        RuleElement::Differ(Differ {
            subgoal: Subgoal::new(predicate, pattern),
            input_tuple,
        })
    }

    pub fn builtin(atom: BuiltinAtom, positive: bool, input_tuple: Tuple) -> Self {
        let output_tuple = if positive {
            input_tuple.concat(atom.tuple())
        } else {
            input_tuple.clone()
        };
        RuleElement::Builtin(BuiltinElement {
            atom,
            positive,
            input_tuple,
            output_tuple,
        })
    }

    pub fn head_substituter(head: Head, input_tuple: Tuple) -> Self {
        RuleElement::HeadSubstituter(HeadSubstituter { head, input_tuple })
    }

    /// Symbolic tuple naming the columns this element produces
    pub fn output_tuple(&self) -> &Tuple {
        static EMPTY: Tuple = Tuple::EMPTY;
        match self {
            RuleElement::FirstSubgoal(e) => &e.subgoal.pattern,
            RuleElement::Joiner(e) => &e.output_tuple,
            RuleElement::Differ(e) => &e.input_tuple,
            RuleElement::Builtin(e) => &e.output_tuple,
            RuleElement::HeadSubstituter(e) => e.head.tuple(),
            RuleElement::True => &EMPTY,
        }
    }

    /// Short name of the element kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RuleElement::FirstSubgoal(_) => "first-subgoal",
            RuleElement::Joiner(_) => "joiner",
            RuleElement::Differ(_) => "differ",
            RuleElement::Builtin(_) => "builtin",
            RuleElement::HeadSubstituter(_) => "head",
            RuleElement::True => "true",
        }
    }

    /// Run this stage. `input` is `None` only for the first element.
    pub fn process(&self, input: Option<Relation>, env: &mut Env<'_>) -> Result<Relation> {
        match self {
            RuleElement::FirstSubgoal(e) => Ok(e.process(env)),
            RuleElement::Joiner(e) => Ok(e.process(input.unwrap_or_else(Relation::unit), env)),
            RuleElement::Differ(e) => Ok(e.process(input.unwrap_or_else(Relation::unit), env)),
            RuleElement::Builtin(e) => e.process(input.unwrap_or_else(Relation::unit), env),
            RuleElement::HeadSubstituter(e) => e.process(input.unwrap_or_else(Relation::unit), env),
            RuleElement::True => Ok(Relation::unit()),
        }
    }

    /// Copy of this element reading only the delta of its predicate, if that
    /// delta is non-empty. Builtins, heads and `True` read no relation.
    pub fn delta_substitution(&self, deltas: &Facts) -> Option<RuleElement> {
        match self {
            RuleElement::FirstSubgoal(e) => Some(RuleElement::FirstSubgoal(FirstSubgoal {
                subgoal: e.subgoal.with_delta(deltas)?,
            })),
            RuleElement::Joiner(e) => Some(RuleElement::Joiner(Joiner {
                subgoal: e.subgoal.with_delta(deltas)?,
                ..e.clone()
            })),
            RuleElement::Differ(e) => Some(RuleElement::Differ(Differ {
                subgoal: e.subgoal.with_delta(deltas)?,
                ..e.clone()
            })),
            RuleElement::Builtin(_) | RuleElement::HeadSubstituter(_) | RuleElement::True => None,
        }
    }
}

impl FirstSubgoal {
    fn process(&self, env: &Env<'_>) -> Relation {
        if self.subgoal.pattern.is_empty() {
            return self.subgoal.source.resolve(env.facts).into_owned();
        }
        self.subgoal.view(env.facts)
    }
}

impl Joiner {
    fn process(&self, input: Relation, env: &Env<'_>) -> Relation {
        let view = self.subgoal.view(env.facts);
        ops::join(&input, &self.input_tuple, &view, &self.subgoal.pattern)
    }
}

impl Differ {
    fn process(&self, input: Relation, env: &Env<'_>) -> Relation {
        let view = self.subgoal.view(env.facts);
        ops::anti_join(&input, &self.input_tuple, &view, &self.subgoal.pattern)
    }
}

impl BuiltinElement {
    fn process(&self, input: Relation, env: &Env<'_>) -> Result<Relation> {
        let builtin = self.atom.builtin();
        let pattern = self.atom.tuple();
        let mut out = Relation::bag(self.output_tuple.arity());

        for row in &input {
            let args: Tuple = pattern
                .iter()
                .map(|term| match term {
                    Term::Var(name) => match self.input_tuple.index_of(name) {
                        Some(i) => row[i].clone(),
                        None => term.clone(),
                    },
                    other => other.clone(),
                })
                .collect();

            let unknowns = args.variables();
            if unknowns.len() > builtin.max_unknown_variables() {
                return Err(KbError::BuiltinBinding {
                    builtin: builtin.name().to_string(),
                    reason: format!(
                        "{} unknown variables at runtime, at most {} allowed",
                        unknowns.len(),
                        builtin.max_unknown_variables()
                    ),
                });
            }

            let answer = builtin.evaluate_with_equivalences(&args, &*env.equivalences);
            match (answer, self.positive) {
                (Some(values), true) => {
                    if values.len() != unknowns.len() {
                        return Err(KbError::BuiltinBinding {
                            builtin: builtin.name().to_string(),
                            reason: format!(
                                "returned {} values for {} unknown variables",
                                values.len(),
                                unknowns.len()
                            ),
                        });
                    }
                    let computed = bind_unknowns(&args, &unknowns, values);
                    out.insert(row.concat(&computed));
                }
                (None, false) => {
                    out.insert(row.clone());
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Replace each unknown variable in `args` by its computed value
fn bind_unknowns(args: &Tuple, unknowns: &[&str], values: Vec<Value>) -> Tuple {
    let terms: Vec<Term> = values.into_iter().map(Term::constant).collect();
    args.iter()
        .map(|term| match term.var_name().and_then(|v| unknowns.iter().position(|u| *u == v)) {
            Some(i) => terms[i].clone(),
            None => term.clone(),
        })
        .collect()
}

impl HeadSubstituter {
    fn process(&self, input: Relation, env: &mut Env<'_>) -> Result<Relation> {
        let head_tuple = self.head.tuple();
        let projected = if input.arity() == 0 {
            if input.is_empty() {
                Relation::new(head_tuple.arity())
            } else if head_tuple.is_ground() {
                Relation::single(head_tuple.clone())?
            } else {
                return Err(CompilationError::UngroundHead {
                    head: self.head.to_string(),
                }
                .into());
            }
        } else {
            ops::project(&input, &self.input_tuple, head_tuple)?
        };

        match self.head {
            Head::Atom { .. } => Ok(projected),
            Head::Equality { .. } => record_equalities(projected, env.equivalences),
        }
    }
}

/// Record every projected pair that may legally be equal, dropping the rest
fn record_equalities(pairs: Relation, equivalences: &mut EquivalenceStore) -> Result<Relation> {
    let mut out = Relation::new(2);
    for pair in pairs.into_tuples() {
        let (Some(a), Some(b)) = (pair[0].const_value(), pair[1].const_value()) else {
            continue;
        };
        if !normalize::may_be_equal(a, b) {
            tracing::debug!("equality {} = {} rejected: values cannot be equal", a, b);
            continue;
        }
        record_pair(a, b, equivalences)?;
        out.insert(pair);
    }
    Ok(out)
}

/// Record `a = b` and, for lists of equal length, every element pair
fn record_pair(a: &Value, b: &Value, equivalences: &mut EquivalenceStore) -> Result<()> {
    equivalences.set_equivalent(&Term::Const(a.clone()), &Term::Const(b.clone()))?;
    if let (Value::List(xs), Value::List(ys)) = (a, b) {
        if xs.len() == ys.len() {
            for (x, y) in xs.iter().zip(ys) {
                record_pair(x, y, equivalences)?;
            }
        }
    }
    Ok(())
}
