//! Builtin predicates
//!
//! A builtin is evaluated by a function instead of being looked up in the
//! facts. It receives its argument tuple with bound positions replaced by
//! constants; the remaining variables are the unknowns. On success it
//! returns one value per distinct unknown variable, in first-occurrence
//! order. A builtin declares how many unknowns it can compute, and the rule
//! compiler refuses to place a builtin literal with more.
//!
//! # Provided builtins
//!
//! | Name | Arity | Unknowns | Meaning |
//! |------|-------|----------|---------|
//! | `EQUAL` | 2 | 1 | `X = Y`, honours asserted equivalences |
//! | `NOT_EQUAL` | 2 | 0 | `X != Y` |
//! | `LESS`, `LESS_EQUAL`, `GREATER`, `GREATER_EQUAL` | 2 | 0 | ordering |
//! | `ADD`, `SUBTRACT`, `MULTIPLY` | 3 | 1 | `X op Y = Z`, solved for any one position |
//! | `STRING_TO_UPPER` | 2 | 1 | `Y` is `X` in upper case |
//! | `STRING_STARTS_WITH`, `STRING_CONTAINS` | 2 | 0 | substring tests |

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::types::{Term, Tuple, Value};
use crate::equivalence::EquivalenceStore;
use crate::storage::normalize;

pub trait Builtin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    /// Number of distinct unbound variables this builtin can compute
    fn max_unknown_variables(&self) -> usize {
        0
    }

    /// Values for the unknown variables, or `None` if the builtin does not hold
    fn evaluate(&self, tuple: &Tuple) -> Option<Vec<Value>>;

    /// Like [`Builtin::evaluate`], for builtins that take asserted term
    /// equalities into account
    fn evaluate_with_equivalences(
        &self,
        tuple: &Tuple,
        _equivalences: &EquivalenceStore,
    ) -> Option<Vec<Value>> {
        self.evaluate(tuple)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn bound(term: &Term) -> Option<&Value> {
    term.const_value()
}

/// Equality of constants, numbers compared by value
fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_numeric() && b.is_numeric() {
        return normalize::numeric_eq(a, b).unwrap_or(false);
    }
    a == b
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) | (Value::Iri(x), Value::Iri(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        _ => normalize::as_f64(a)?.partial_cmp(&normalize::as_f64(b)?),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Integer(i) => Some(Num::Int(*i)),
            Value::Double(d) => Some(Num::Float(*d)),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Integer(i),
            Num::Float(d) => normalize::canonical(Value::Double(d)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(d) => d,
        }
    }

    fn add(self, other: Num) -> Option<Num> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a.checked_add(b).map(Num::Int),
            (a, b) => Some(Num::Float(a.as_f64() + b.as_f64())),
        }
    }

    fn sub(self, other: Num) -> Option<Num> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a.checked_sub(b).map(Num::Int),
            (a, b) => Some(Num::Float(a.as_f64() - b.as_f64())),
        }
    }

    fn mul(self, other: Num) -> Option<Num> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a.checked_mul(b).map(Num::Int),
            (a, b) => Some(Num::Float(a.as_f64() * b.as_f64())),
        }
    }

    /// Exact division: integers must divide evenly, zero divisors fail
    fn div(self, other: Num) -> Option<Num> {
        match (self, other) {
            (_, Num::Int(0)) => None,
            (Num::Int(a), Num::Int(b)) if a.checked_rem(b) == Some(0) => {
                a.checked_div(b).map(Num::Int)
            }
            (Num::Int(_), Num::Int(_)) => None,
            (_, b) if b.as_f64() == 0.0 => None,
            (a, b) => Some(Num::Float(a.as_f64() / b.as_f64())),
        }
    }

    fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    fn equals(self, other: Num) -> bool {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

// ============================================================================
// Comparison builtins
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug)]
pub struct CompareBuiltin {
    op: Comparison,
}

impl CompareBuiltin {
    pub fn new(op: Comparison) -> Self {
        CompareBuiltin { op }
    }

    fn holds(&self, a: &Value, b: &Value) -> bool {
        match self.op {
            Comparison::Equal => values_equal(a, b),
            Comparison::NotEqual => !values_equal(a, b),
            Comparison::Less => compare_values(a, b) == Some(Ordering::Less),
            Comparison::LessEqual => {
                matches!(compare_values(a, b), Some(Ordering::Less | Ordering::Equal))
            }
            Comparison::Greater => compare_values(a, b) == Some(Ordering::Greater),
            Comparison::GreaterEqual => {
                matches!(compare_values(a, b), Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

impl Builtin for CompareBuiltin {
    fn name(&self) -> &str {
        match self.op {
            Comparison::Equal => "EQUAL",
            Comparison::NotEqual => "NOT_EQUAL",
            Comparison::Less => "LESS",
            Comparison::LessEqual => "LESS_EQUAL",
            Comparison::Greater => "GREATER",
            Comparison::GreaterEqual => "GREATER_EQUAL",
        }
    }

    fn arity(&self) -> usize {
        2
    }

    fn max_unknown_variables(&self) -> usize {
        match self.op {
            Comparison::Equal => 1,
            _ => 0,
        }
    }

    fn evaluate(&self, tuple: &Tuple) -> Option<Vec<Value>> {
        match (bound(&tuple[0]), bound(&tuple[1])) {
            (Some(a), Some(b)) => self.holds(a, b).then(Vec::new),
            // EQUAL binds its one unknown side to the other
            (Some(v), None) | (None, Some(v)) if self.op == Comparison::Equal => {
                Some(vec![v.clone()])
            }
            _ => None,
        }
    }

    fn evaluate_with_equivalences(
        &self,
        tuple: &Tuple,
        equivalences: &EquivalenceStore,
    ) -> Option<Vec<Value>> {
        let both_bound = tuple[0].is_const() && tuple[1].is_const();
        match self.op {
            Comparison::Equal if both_bound && equivalences.are_equivalent(&tuple[0], &tuple[1]) => {
                Some(Vec::new())
            }
            Comparison::NotEqual
                if both_bound && equivalences.are_equivalent(&tuple[0], &tuple[1]) =>
            {
                None
            }
            _ => self.evaluate(tuple),
        }
    }
}

// ============================================================================
// Arithmetic builtins
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// `X op Y = Z`, solved for whichever single position is unknown
#[derive(Debug)]
pub struct ArithmeticBuiltin {
    op: Arithmetic,
}

impl ArithmeticBuiltin {
    pub fn new(op: Arithmetic) -> Self {
        ArithmeticBuiltin { op }
    }

    fn apply(&self, x: Num, y: Num) -> Option<Num> {
        match self.op {
            Arithmetic::Add => x.add(y),
            Arithmetic::Subtract => x.sub(y),
            Arithmetic::Multiply => x.mul(y),
            Arithmetic::Divide => x.div(y),
        }
    }

    /// Solve `? op y = z`
    fn solve_left(&self, y: Num, z: Num) -> Option<Num> {
        match self.op {
            Arithmetic::Add => z.sub(y),
            Arithmetic::Subtract => z.add(y),
            Arithmetic::Multiply => z.div(y),
            Arithmetic::Divide if y.is_zero() => None,
            Arithmetic::Divide => z.mul(y),
        }
    }

    /// Solve `x op ? = z`
    fn solve_right(&self, x: Num, z: Num) -> Option<Num> {
        match self.op {
            Arithmetic::Add => z.sub(x),
            Arithmetic::Subtract => x.sub(z),
            Arithmetic::Multiply => z.div(x),
            Arithmetic::Divide => x.div(z),
        }
    }
}

impl Builtin for ArithmeticBuiltin {
    fn name(&self) -> &str {
        match self.op {
            Arithmetic::Add => "ADD",
            Arithmetic::Subtract => "SUBTRACT",
            Arithmetic::Multiply => "MULTIPLY",
            Arithmetic::Divide => "DIVIDE",
        }
    }

    fn arity(&self) -> usize {
        3
    }

    fn max_unknown_variables(&self) -> usize {
        1
    }

    fn evaluate(&self, tuple: &Tuple) -> Option<Vec<Value>> {
        let num = |i: usize| bound(&tuple[i]).map(Num::from_value);
        match (num(0), num(1), num(2)) {
            (Some(x), Some(y), Some(z)) => {
                let (x, y, z) = (x?, y?, z?);
                self.apply(x, y)?.equals(z).then(Vec::new)
            }
            (Some(x), Some(y), None) => Some(vec![self.apply(x?, y?)?.into_value()]),
            (None, Some(y), Some(z)) => Some(vec![self.solve_left(y?, z?)?.into_value()]),
            (Some(x), None, Some(z)) => Some(vec![self.solve_right(x?, z?)?.into_value()]),
            _ => None,
        }
    }
}

// ============================================================================
// String builtins
// ============================================================================

#[derive(Debug)]
pub struct StringToUpper;

impl Builtin for StringToUpper {
    fn name(&self) -> &str {
        "STRING_TO_UPPER"
    }

    fn arity(&self) -> usize {
        2
    }

    fn max_unknown_variables(&self) -> usize {
        1
    }

    fn evaluate(&self, tuple: &Tuple) -> Option<Vec<Value>> {
        let upper = match bound(&tuple[0])? {
            Value::Str(s) => Value::Str(s.to_uppercase()),
            _ => return None,
        };
        match bound(&tuple[1]) {
            Some(given) => (*given == upper).then(Vec::new),
            None => Some(vec![upper]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringTest {
    StartsWith,
    Contains,
}

#[derive(Debug)]
pub struct StringTestBuiltin {
    test: StringTest,
}

impl StringTestBuiltin {
    pub fn new(test: StringTest) -> Self {
        StringTestBuiltin { test }
    }
}

impl Builtin for StringTestBuiltin {
    fn name(&self) -> &str {
        match self.test {
            StringTest::StartsWith => "STRING_STARTS_WITH",
            StringTest::Contains => "STRING_CONTAINS",
        }
    }

    fn arity(&self) -> usize {
        2
    }

    fn evaluate(&self, tuple: &Tuple) -> Option<Vec<Value>> {
        let haystack = bound(&tuple[0])?.as_str()?;
        let needle = bound(&tuple[1])?.as_str()?;
        let holds = match self.test {
            StringTest::StartsWith => haystack.starts_with(needle),
            StringTest::Contains => haystack.contains(needle),
        };
        holds.then(Vec::new)
    }
}

// ============================================================================
// Registry
// ============================================================================

pub fn equal() -> Arc<dyn Builtin> {
    Arc::new(CompareBuiltin::new(Comparison::Equal))
}

pub fn not_equal() -> Arc<dyn Builtin> {
    Arc::new(CompareBuiltin::new(Comparison::NotEqual))
}

pub fn less() -> Arc<dyn Builtin> {
    Arc::new(CompareBuiltin::new(Comparison::Less))
}

pub fn add() -> Arc<dyn Builtin> {
    Arc::new(ArithmeticBuiltin::new(Arithmetic::Add))
}

pub fn string_to_upper() -> Arc<dyn Builtin> {
    Arc::new(StringToUpper)
}

/// Builtins by name
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        BuiltinRegistry::default()
    }

    /// Registry with every provided builtin
    pub fn standard() -> Self {
        let mut registry = BuiltinRegistry::new();
        for op in [
            Comparison::Equal,
            Comparison::NotEqual,
            Comparison::Less,
            Comparison::LessEqual,
            Comparison::Greater,
            Comparison::GreaterEqual,
        ] {
            registry.register(Arc::new(CompareBuiltin::new(op)));
        }
        for op in [
            Arithmetic::Add,
            Arithmetic::Subtract,
            Arithmetic::Multiply,
            Arithmetic::Divide,
        ] {
            registry.register(Arc::new(ArithmeticBuiltin::new(op)));
        }
        registry.register(Arc::new(StringToUpper));
        registry.register(Arc::new(StringTestBuiltin::new(StringTest::StartsWith)));
        registry.register(Arc::new(StringTestBuiltin::new(StringTest::Contains)));
        registry
    }

    pub fn register(&mut self, builtin: Arc<dyn Builtin>) {
        self.builtins.insert(builtin.name().to_string(), builtin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(terms: Vec<Term>) -> Tuple {
        Tuple::new(terms)
    }

    #[test]
    fn test_equal_binds_unknown_side() {
        let eq = equal();
        let out = eq.evaluate(&args(vec![Term::var("X"), Term::constant("a")]));
        assert_eq!(out, Some(vec![Value::from("a")]));
        assert_eq!(eq.max_unknown_variables(), 1);
    }

    #[test]
    fn test_equal_compares_numbers_by_value() {
        let eq = equal();
        let out = eq.evaluate(&args(vec![Term::constant(1i64), Term::constant(1.0)]));
        assert_eq!(out, Some(vec![]));
    }

    #[test]
    fn test_equal_uses_equivalences() {
        let eq = equal();
        let mut store = EquivalenceStore::new();
        let tuple = args(vec![Term::constant("A"), Term::constant("B")]);
        assert_eq!(eq.evaluate_with_equivalences(&tuple, &store), None);
        store
            .set_equivalent(&Term::constant("A"), &Term::constant("B"))
            .unwrap();
        assert_eq!(eq.evaluate_with_equivalences(&tuple, &store), Some(vec![]));
        assert_eq!(not_equal().evaluate_with_equivalences(&tuple, &store), None);
    }

    #[test]
    fn test_ordering_builtins() {
        let t = args(vec![Term::constant(1i64), Term::constant(2.5)]);
        assert!(less().evaluate(&t).is_some());
        let registry = BuiltinRegistry::standard();
        assert!(registry.get("GREATER").unwrap().evaluate(&t).is_none());
        assert!(registry.get("LESS_EQUAL").unwrap().evaluate(&t).is_some());
        // incomparable values never satisfy an ordering
        let mixed = args(vec![Term::constant("a"), Term::constant(1i64)]);
        assert!(less().evaluate(&mixed).is_none());
    }

    #[test]
    fn test_add_solves_any_position() {
        let add = add();
        let z = add.evaluate(&args(vec![Term::constant(2i64), Term::constant(3i64), Term::var("Z")]));
        assert_eq!(z, Some(vec![Value::Integer(5)]));
        let x = add.evaluate(&args(vec![Term::var("X"), Term::constant(3i64), Term::constant(5i64)]));
        assert_eq!(x, Some(vec![Value::Integer(2)]));
        let y = add.evaluate(&args(vec![Term::constant(2i64), Term::var("Y"), Term::constant(5i64)]));
        assert_eq!(y, Some(vec![Value::Integer(3)]));
        let check = add.evaluate(&args(vec![
            Term::constant(2i64),
            Term::constant(3i64),
            Term::constant(6i64),
        ]));
        assert_eq!(check, None);
    }

    #[test]
    fn test_subtract_and_multiply() {
        let registry = BuiltinRegistry::standard();
        let sub = registry.get("SUBTRACT").unwrap();
        let y = sub.evaluate(&args(vec![Term::constant(10i64), Term::var("Y"), Term::constant(4i64)]));
        assert_eq!(y, Some(vec![Value::Integer(6)]));

        let mul = registry.get("MULTIPLY").unwrap();
        let x = mul.evaluate(&args(vec![Term::var("X"), Term::constant(4i64), Term::constant(12i64)]));
        assert_eq!(x, Some(vec![Value::Integer(3)]));
        // no integer solution
        let none = mul.evaluate(&args(vec![Term::var("X"), Term::constant(5i64), Term::constant(12i64)]));
        assert_eq!(none, None);
        let by_zero = mul.evaluate(&args(vec![Term::var("X"), Term::constant(0i64), Term::constant(0i64)]));
        assert_eq!(by_zero, None);
    }

    #[test]
    fn test_multiply_solve_overflow_fails() {
        let mul = BuiltinRegistry::standard().get("MULTIPLY").unwrap();
        let x = mul.evaluate(&args(vec![
            Term::var("X"),
            Term::constant(-1i64),
            Term::constant(i64::MIN),
        ]));
        assert_eq!(x, None);
        let y = mul.evaluate(&args(vec![
            Term::constant(-1i64),
            Term::var("Y"),
            Term::constant(i64::MIN),
        ]));
        assert_eq!(y, None);
    }

    #[test]
    fn test_divide_is_exact() {
        let div = BuiltinRegistry::standard().get("DIVIDE").unwrap();
        let z = div.evaluate(&args(vec![Term::constant(12i64), Term::constant(4i64), Term::var("Z")]));
        assert_eq!(z, Some(vec![Value::Integer(3)]));
        let x = div.evaluate(&args(vec![Term::var("X"), Term::constant(4i64), Term::constant(3i64)]));
        assert_eq!(x, Some(vec![Value::Integer(12)]));
        let y = div.evaluate(&args(vec![Term::constant(12i64), Term::var("Y"), Term::constant(3i64)]));
        assert_eq!(y, Some(vec![Value::Integer(4)]));
        let uneven = div.evaluate(&args(vec![Term::constant(7i64), Term::constant(2i64), Term::var("Z")]));
        assert_eq!(uneven, None);
        let by_zero = div.evaluate(&args(vec![Term::var("X"), Term::constant(0i64), Term::constant(0i64)]));
        assert_eq!(by_zero, None);
        let float = div.evaluate(&args(vec![Term::constant(7.0), Term::constant(2i64), Term::var("Z")]));
        assert_eq!(float, Some(vec![Value::Double(3.5)]));
    }

    #[test]
    fn test_add_overflow_fails() {
        let out = add().evaluate(&args(vec![
            Term::constant(i64::MAX),
            Term::constant(1i64),
            Term::var("Z"),
        ]));
        assert_eq!(out, None);
    }

    #[test]
    fn test_string_to_upper() {
        let upper = string_to_upper();
        let out = upper.evaluate(&args(vec![Term::constant("foobar"), Term::var("Y")]));
        assert_eq!(out, Some(vec![Value::from("FOOBAR")]));
        let check = upper.evaluate(&args(vec![Term::constant("foobar"), Term::constant("FOOBAR")]));
        assert_eq!(check, Some(vec![]));
        assert_eq!(upper.evaluate(&args(vec![Term::var("X"), Term::constant("FOOBAR")])), None);
    }

    #[test]
    fn test_string_tests() {
        let registry = BuiltinRegistry::standard();
        let t = args(vec![Term::constant("http:route"), Term::constant("http")]);
        assert!(registry.get("STRING_STARTS_WITH").unwrap().evaluate(&t).is_some());
        assert!(registry.get("STRING_CONTAINS").unwrap().evaluate(&t).is_some());
        let miss = args(vec![Term::constant("db:query"), Term::constant("http")]);
        assert!(registry.get("STRING_CONTAINS").unwrap().evaluate(&miss).is_none());
    }

    #[test]
    fn test_registry_names() {
        let registry = BuiltinRegistry::standard();
        assert_eq!(registry.names().len(), 12);
        assert!(registry.get("NO_SUCH").is_none());
    }
}
