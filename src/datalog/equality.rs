//! Rule-head equality rewriting
//!
//! Rules with an equality head derive pairs of the equality predicate. When
//! a program has any such rule, it is extended with rules that make the
//! equality predicate symmetric and transitive, and that copy every stored
//! tuple to each term asserted equal to one of its arguments:
//!
//! ```text
//! ?Y = ?X :- $EQUALS$(?X, ?Y).
//! ?X = ?Z :- $EQUALS$(?X, ?Y), $EQUALS$(?Y, ?Z).
//! p(.., ?Y, ..) :- p(.., ?X, ..), $EQUALS$(?X, ?Y).      for every p/n and position
//! ```

use std::collections::BTreeSet;

use super::types::{Atom, Head, Literal, Predicate, Rule, Term};

fn equals(x: &str, y: &str) -> Literal {
    Literal::positive(Atom::new(
        Predicate::equality().name(),
        vec![Term::var(x), Term::var(y)],
    ))
}

/// Whether any rule needs equality propagation
pub fn has_equality(rules: &[Rule]) -> bool {
    rules.iter().any(Rule::is_equality)
}

/// Stored predicates a program mentions, besides the equality and `true` predicates
fn stored_predicates<'a>(
    rules: &'a [Rule],
    extra: impl IntoIterator<Item = &'a Predicate>,
) -> BTreeSet<Predicate> {
    let mut out: BTreeSet<Predicate> = extra.into_iter().cloned().collect();
    for rule in rules {
        out.insert(rule.head().predicate());
        out.extend(rule.body_predicates().map(|(p, _)| p.clone()));
    }
    out.retain(|p| !p.is_equality() && *p != Predicate::truth() && p.arity() > 0);
    out
}

/// Rules that propagate asserted equalities, for the predicates in `rules`
/// and `fact_predicates`
pub fn propagation_rules<'a>(
    rules: &'a [Rule],
    fact_predicates: impl IntoIterator<Item = &'a Predicate>,
) -> Vec<Rule> {
    let mut out = vec![
        Rule::new(Head::equality(Term::var("Y"), Term::var("X")), vec![equals("X", "Y")]),
        Rule::new(
            Head::equality(Term::var("X"), Term::var("Z")),
            vec![equals("X", "Y"), equals("Y", "Z")],
        ),
    ];

    for predicate in stored_predicates(rules, fact_predicates) {
        let args: Vec<Term> = (0..predicate.arity()).map(|i| Term::var(format!("A{}", i))).collect();
        for i in 0..predicate.arity() {
            let mut head_args = args.clone();
            head_args[i] = Term::var("EQ");
            out.push(Rule::new(
                Head::atom(predicate.name(), head_args),
                vec![
                    Literal::positive(Atom::new(predicate.name(), args.clone())),
                    equals(&format!("A{}", i), "EQ"),
                ],
            ));
        }
    }
    out
}

/// Program rules extended with equality propagation, if any rule needs it
pub fn rewrite<'a>(
    rules: &'a [Rule],
    fact_predicates: impl IntoIterator<Item = &'a Predicate>,
) -> Vec<Rule> {
    let mut out = rules.to_vec();
    if has_equality(rules) {
        let extra = propagation_rules(rules, fact_predicates);
        tracing::debug!("equality rewriting added {} rules", extra.len());
        out.extend(extra);
    }
    out
}
