//! Core Datalog types
//!
//! Values, terms, tuples, predicates, atoms, literals, rules and programs.
//! Atoms are either stored (looked up in [`Facts`](crate::facts::Facts)) or
//! builtin (computed by a [`Builtin`]).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::builtins::Builtin;
use crate::storage::normalize;

/// Name of the predicate that rule-head equalities are written to
pub const EQUALITY_PREDICATE: &str = "$EQUALS$";

/// Name of the zero-arity predicate that always holds
pub const TRUE_PREDICATE: &str = "true";

// ============================================================================
// Value
// ============================================================================

/// A typed constant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Iri(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    List(Vec<Value>),
}

impl Value {
    pub fn iri(s: impl Into<String>) -> Self {
        Value::Iri(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(items)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Iri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) => 1,
            Value::Double(_) => 2,
            Value::Str(_) => 3,
            Value::Iri(_) => 4,
            Value::List(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Iri(a), Value::Iri(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => {
                normalize::double_bits(*a) == normalize::double_bits(*b)
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Str(s) | Value::Iri(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Double(d) => normalize::double_bits(*d).hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) | (Value::Iri(a), Value::Iri(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => {
                normalize::canonical_double(*a).total_cmp(&normalize::canonical_double(*b))
            }
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Iri(s) => write!(f, "<{}>", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

// ============================================================================
// Term
// ============================================================================

/// A term: variable, constant, or constructed (function) term
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Var(String),
    Const(Value),
    /// Function symbol applied to arguments. Parsed but not evaluable.
    Constructed { functor: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Term::Const(normalize::canonical(value.into()))
    }

    pub fn constructed(functor: impl Into<String>, args: Vec<Term>) -> Self {
        Term::Constructed {
            functor: functor.into(),
            args,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Term::Const(_))
    }

    pub fn is_constructed(&self) -> bool {
        matches!(self, Term::Constructed { .. })
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn const_value(&self) -> Option<&Value> {
        match self {
            Term::Const(value) => Some(value),
            _ => None,
        }
    }

    /// A ground term contains no variable
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Const(_) => true,
            Term::Constructed { args, .. } => args.iter().all(Term::is_ground),
        }
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Term::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Term::Const(_) => {}
            Term::Constructed { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => write!(f, "?{}", name),
            Term::Const(value) => write!(f, "{}", value),
            Term::Constructed { functor, args } => {
                write!(f, "{}(", functor)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Tuple
// ============================================================================

/// Fixed-length sequence of terms. Equality is positional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple(Vec<Term>);

impl Tuple {
    pub const EMPTY: Tuple = Tuple(Vec::new());

    pub fn new(terms: Vec<Term>) -> Self {
        Tuple(terms)
    }

    pub fn empty() -> Self {
        Tuple(Vec::new())
    }

    /// Tuple of constants
    pub fn ground(values: Vec<Value>) -> Self {
        Tuple(values.into_iter().map(Term::constant).collect())
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn terms(&self) -> &[Term] {
        &self.0
    }

    pub fn get(&self, i: usize) -> Option<&Term> {
        self.0.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.0.iter()
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.0
    }

    pub fn is_ground(&self) -> bool {
        self.0.iter().all(Term::is_ground)
    }

    pub fn has_constructed(&self) -> bool {
        self.0.iter().any(Term::is_constructed)
    }

    /// Distinct variables in first-occurrence order
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for term in &self.0 {
            term.collect_variables(&mut out);
        }
        out
    }

    /// Position of the first occurrence of a variable
    pub fn index_of(&self, var: &str) -> Option<usize> {
        self.0.iter().position(|t| t.var_name() == Some(var))
    }

    pub fn contains_var(&self, var: &str) -> bool {
        self.index_of(var).is_some()
    }

    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut terms = Vec::with_capacity(self.arity() + other.arity());
        terms.extend_from_slice(&self.0);
        terms.extend_from_slice(&other.0);
        Tuple(terms)
    }
}

impl std::ops::Index<usize> for Tuple {
    type Output = Term;

    fn index(&self, i: usize) -> &Term {
        &self.0[i]
    }
}

impl FromIterator<Term> for Tuple {
    fn from_iter<I: IntoIterator<Item = Term>>(iter: I) -> Self {
        Tuple(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Term;
    type IntoIter = std::slice::Iter<'a, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, term) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", term)?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Predicate
// ============================================================================

/// Predicate identity: two predicates are equal iff name and arity match
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Predicate {
    name: String,
    arity: usize,
}

impl Predicate {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Predicate {
            name: name.into(),
            arity,
        }
    }

    pub fn equality() -> Self {
        Predicate::new(EQUALITY_PREDICATE, 2)
    }

    pub fn truth() -> Self {
        Predicate::new(TRUE_PREDICATE, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_equality(&self) -> bool {
        self.name == EQUALITY_PREDICATE && self.arity == 2
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

// ============================================================================
// Atom
// ============================================================================

/// A builtin predicate applied to an argument tuple
#[derive(Clone, Debug)]
pub struct BuiltinAtom {
    builtin: Arc<dyn Builtin>,
    tuple: Tuple,
}

impl BuiltinAtom {
    pub fn new(builtin: Arc<dyn Builtin>, tuple: Tuple) -> Self {
        BuiltinAtom { builtin, tuple }
    }

    pub fn builtin(&self) -> &dyn Builtin {
        self.builtin.as_ref()
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }
}

impl PartialEq for BuiltinAtom {
    fn eq(&self, other: &Self) -> bool {
        self.builtin.name() == other.builtin.name() && self.tuple == other.tuple
    }
}

/// Atom: a stored predicate applied to a tuple, or a builtin
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Stored { predicate: Predicate, tuple: Tuple },
    Builtin(BuiltinAtom),
}

impl Atom {
    /// Stored atom; the arity is taken from the argument list
    pub fn new(name: impl Into<String>, args: Vec<Term>) -> Self {
        let predicate = Predicate::new(name, args.len());
        Atom::Stored {
            predicate,
            tuple: Tuple::new(args),
        }
    }

    pub fn builtin(builtin: Arc<dyn Builtin>, args: Vec<Term>) -> Self {
        Atom::Builtin(BuiltinAtom::new(builtin, Tuple::new(args)))
    }

    /// Name of the predicate or builtin
    pub fn name(&self) -> &str {
        match self {
            Atom::Stored { predicate, .. } => predicate.name(),
            Atom::Builtin(b) => b.builtin.name(),
        }
    }

    /// Stored predicate, `None` for builtins
    pub fn predicate(&self) -> Option<&Predicate> {
        match self {
            Atom::Stored { predicate, .. } => Some(predicate),
            Atom::Builtin(_) => None,
        }
    }

    pub fn tuple(&self) -> &Tuple {
        match self {
            Atom::Stored { tuple, .. } => tuple,
            Atom::Builtin(b) => &b.tuple,
        }
    }

    pub fn arity(&self) -> usize {
        self.tuple().arity()
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Atom::Builtin(_))
    }

    pub fn variables(&self) -> Vec<&str> {
        self.tuple().variables()
    }

    pub fn is_ground(&self) -> bool {
        self.tuple().is_ground()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arity() == 0 {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{}{}", self.name(), self.tuple())
        }
    }
}

// ============================================================================
// Literal
// ============================================================================

/// An atom with a polarity; negative literals are negation as failure
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    positive: bool,
    atom: Atom,
}

impl Literal {
    pub fn positive(atom: Atom) -> Self {
        Literal { positive: true, atom }
    }

    pub fn negative(atom: Atom) -> Self {
        Literal {
            positive: false,
            atom,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }

    pub fn is_negative(&self) -> bool {
        !self.positive
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    pub fn variables(&self) -> Vec<&str> {
        self.atom.variables()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.atom)
        } else {
            write!(f, "not {}", self.atom)
        }
    }
}

// ============================================================================
// Rule
// ============================================================================

/// Rule head: a stored atom or the equality form `X = Y`
#[derive(Clone, Debug, PartialEq)]
pub enum Head {
    Atom { predicate: Predicate, tuple: Tuple },
    Equality { tuple: Tuple },
}

impl Head {
    pub fn atom(name: impl Into<String>, args: Vec<Term>) -> Self {
        Head::Atom {
            predicate: Predicate::new(name, args.len()),
            tuple: Tuple::new(args),
        }
    }

    pub fn equality(left: Term, right: Term) -> Self {
        Head::Equality {
            tuple: Tuple::new(vec![left, right]),
        }
    }

    pub fn predicate(&self) -> Predicate {
        match self {
            Head::Atom { predicate, .. } => predicate.clone(),
            Head::Equality { .. } => Predicate::equality(),
        }
    }

    pub fn tuple(&self) -> &Tuple {
        match self {
            Head::Atom { tuple, .. } | Head::Equality { tuple } => tuple,
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Head::Equality { .. })
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Head::Atom { predicate, tuple } if tuple.is_empty() => write!(f, "{}", predicate.name()),
            Head::Atom { predicate, tuple } => write!(f, "{}{}", predicate.name(), tuple),
            Head::Equality { tuple } => write!(f, "{} = {}", tuple[0], tuple[1]),
        }
    }
}

/// A rule: head :- body. Body order carries no meaning.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    head: Head,
    body: Vec<Literal>,
}

impl Rule {
    pub fn new(head: Head, body: Vec<Literal>) -> Self {
        Rule { head, body }
    }

    /// Rule with an empty body
    pub fn fact(head: Head) -> Self {
        Rule {
            head,
            body: Vec::new(),
        }
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn body(&self) -> &[Literal] {
        &self.body
    }

    pub fn is_equality(&self) -> bool {
        self.head.is_equality()
    }

    /// Stored predicates the body refers to, with polarity
    pub fn body_predicates(&self) -> impl Iterator<Item = (&Predicate, bool)> {
        self.body
            .iter()
            .filter_map(|lit| lit.atom().predicate().map(|p| (p, lit.is_positive())))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, lit) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", lit)?;
            }
        }
        write!(f, ".")
    }
}

// ============================================================================
// Query & Program
// ============================================================================

/// A conjunctive query
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    literals: Vec<Literal>,
}

impl Query {
    pub fn new(literals: Vec<Literal>) -> Self {
        Query { literals }
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    /// Distinct variables in first-occurrence order across the literals
    pub fn variables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for lit in &self.literals {
            for var in lit.variables() {
                if !out.contains(&var) {
                    out.push(var);
                }
            }
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?- ")?;
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", lit)?;
        }
        write!(f, ".")
    }
}

/// Facts, rules and queries as a front end would hand them over
#[derive(Clone, Debug, Default)]
pub struct Program {
    facts: Vec<(Predicate, Tuple)>,
    rules: Vec<Rule>,
    queries: Vec<Query>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Add a ground fact
    pub fn fact(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        let tuple = Tuple::ground(values);
        self.facts.push((Predicate::new(name, tuple.arity()), tuple));
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    pub fn add_fact(&mut self, predicate: Predicate, tuple: Tuple) {
        self.facts.push((predicate, tuple));
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn facts(&self) -> &[(Predicate, Tuple)] {
        &self.facts
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }
}
