//! The typed shape of spec.md §4.3's `conds`: a flat list of leaf triples
//! and nested one-level groups, interleaved with `AND`/`OR`. Grounded on
//! `SqlConverter.parse_conditions`/`parse_set_of_conditions`, which walk the
//! same shape as a stringly-typed Python list; here it's an enum so a
//! malformed condition list is a type error instead of a `ValueError` raised
//! mid-query.

use super::types::Op;
use crate::value::Value;

/// One `field op value` leaf.
#[derive(Debug, Clone)]
pub struct Compare {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Compare {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// A leaf comparison or a parenthesised group of terms, one level deep.
#[derive(Debug, Clone)]
pub enum Predicate {
    Leaf(Compare),
    Group(Vec<PredicateTerm>),
}

/// One slot of the flat predicate list: a predicate, or an explicit
/// connective between the previous and next predicate.
#[derive(Debug, Clone)]
pub enum PredicateTerm {
    Pred(Predicate),
    And,
    Or,
}

/// Builder assembling a `Vec<PredicateTerm>` without hand-rolling the enum
/// at call sites.
#[derive(Debug, Clone, Default)]
pub struct Conditions(Vec<PredicateTerm>);

impl Conditions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn leaf(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.0.push(PredicateTerm::Pred(Predicate::Leaf(Compare::new(field, op, value))));
        self
    }

    pub fn group(mut self, inner: Conditions) -> Self {
        self.0.push(PredicateTerm::Pred(Predicate::Group(inner.0)));
        self
    }

    pub fn and(mut self) -> Self {
        self.0.push(PredicateTerm::And);
        self
    }

    pub fn or(mut self) -> Self {
        self.0.push(PredicateTerm::Or);
        self
    }

    pub fn build(self) -> Vec<PredicateTerm> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Every field name a predicate list refers to, used by the compiler's join
/// set computation (rule 2: "for every field referenced in
/// fields/order/conds").
pub fn referenced_fields(terms: &[PredicateTerm]) -> Vec<String> {
    let mut out = Vec::new();
    collect_fields(terms, &mut out);
    out
}

fn collect_fields(terms: &[PredicateTerm], out: &mut Vec<String>) {
    for term in terms {
        if let PredicateTerm::Pred(pred) = term {
            match pred {
                Predicate::Leaf(cmp) => out.push(cmp.field.clone()),
                Predicate::Group(inner) => collect_fields(inner, out),
            }
        }
    }
}
