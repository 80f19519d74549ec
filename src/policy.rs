//! Input policy AST
//!
//! This is the external-collaborator boundary (§1): surface syntax, AST
//! construction, and topology-specific policy builders live outside this
//! crate. What crosses the boundary is the tree defined here — predicates
//! ([`Pred`]) and policies ([`Policy`]) — handed to [`crate::compiler`] and,
//! at the CLI, read as a JSON value alongside [`crate::options::Options`].

use serde::{Deserialize, Serialize};

use crate::field::{Field, Value};

/// A switch identifier, carried opaquely by [`Policy::Link`] and by
/// [`crate::compiler::specialize`].
pub type SwitchId = u64;

/// A packet predicate.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Pred {
    True,
    False,
    Test(Field, Value),
    Neg(Box<Pred>),
    And(Box<Pred>, Box<Pred>),
    Or(Box<Pred>, Box<Pred>),
}

impl Pred {
    #[must_use]
    pub fn test(field: Field, value: Value) -> Self {
        Pred::Test(field, value)
    }

    #[must_use]
    pub fn neg(p: Pred) -> Self {
        Pred::Neg(Box::new(p))
    }

    #[must_use]
    pub fn and(a: Pred, b: Pred) -> Self {
        Pred::And(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn or(a: Pred, b: Pred) -> Self {
        Pred::Or(Box::new(a), Box::new(b))
    }
}

/// A NetKAT policy: predicates lifted to filters, field modifications, and
/// the regular-expression-like combinators (union/seq/star), plus the
/// non-local `Link` construct (§1, §4.4).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Policy {
    Filter(Pred),
    Mod(Field, Value),
    Union(Box<Policy>, Box<Policy>),
    Seq(Box<Policy>, Box<Policy>),
    Star(Box<Policy>),
    /// `Link(s1, p1, s2, p2)`: ties together a location on switch `s1`/port
    /// `p1` with one on `s2`/`p2`. Only meaningful to `compile_global`'s
    /// (external) lowering pass; `compile_local` rejects it with `NonLocal`.
    Link(SwitchId, u32, SwitchId, u32),
}

impl Policy {
    #[must_use]
    pub fn filter(p: Pred) -> Self {
        Policy::Filter(p)
    }

    #[must_use]
    pub fn modify(field: Field, value: Value) -> Self {
        Policy::Mod(field, value)
    }

    #[must_use]
    pub fn union(a: Policy, b: Policy) -> Self {
        Policy::Union(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn seq(a: Policy, b: Policy) -> Self {
        Policy::Seq(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn star(p: Policy) -> Self {
        Policy::Star(Box::new(p))
    }

    /// True if this policy contains no `Link` term anywhere in its tree —
    /// the precondition `compile_local` requires and `compile_global`'s
    /// (external) lowering pass is expected to establish.
    #[must_use]
    pub fn is_local(&self) -> bool {
        match self {
            Policy::Link(..) => false,
            Policy::Filter(_) | Policy::Mod(..) => true,
            Policy::Union(a, b) | Policy::Seq(a, b) => a.is_local() && b.is_local(),
            Policy::Star(p) => p.is_local(),
        }
    }

    /// Count occurrences of each field as a test or modification target —
    /// the raw material for `FieldOrderOption::Heuristic`
    /// (see [`crate::field::FieldOrder::from_weights`]).
    pub fn field_occurrences(&self) -> Vec<(Field, u64)> {
        let mut counts = std::collections::HashMap::new();
        self.count_fields(&mut counts);
        counts.into_iter().collect()
    }

    fn count_fields(&self, counts: &mut std::collections::HashMap<Field, u64>) {
        match self {
            Policy::Filter(p) => p.count_fields(counts),
            Policy::Mod(f, _) => *counts.entry(*f).or_insert(0) += 1,
            Policy::Union(a, b) | Policy::Seq(a, b) => {
                a.count_fields(counts);
                b.count_fields(counts);
            }
            Policy::Star(p) => p.count_fields(counts),
            Policy::Link(..) => {}
        }
    }
}

impl Pred {
    fn count_fields(&self, counts: &mut std::collections::HashMap<Field, u64>) {
        match self {
            Pred::True | Pred::False => {}
            Pred::Test(f, _) => *counts.entry(*f).or_insert(0) += 1,
            Pred::Neg(p) => p.count_fields(counts),
            Pred::And(a, b) | Pred::Or(a, b) => {
                a.count_fields(counts);
                b.count_fields(counts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_makes_a_policy_non_local() {
        let p = Policy::seq(
            Policy::filter(Pred::True),
            Policy::Link(1, 0, 2, 0),
        );
        assert!(!p.is_local());
        assert!(Policy::filter(Pred::True).is_local());
    }

    #[test]
    fn field_occurrences_counts_tests_and_mods() {
        let p = Policy::seq(
            Policy::filter(Pred::and(
                Pred::test(Field::Vlan, Value::Const(1)),
                Pred::test(Field::Vlan, Value::Const(2)),
            )),
            Policy::modify(Field::VlanPcp, Value::Const(0)),
        );
        let counts: std::collections::HashMap<_, _> = p.field_occurrences().into_iter().collect();
        assert_eq!(counts.get(&Field::Vlan), Some(&2));
        assert_eq!(counts.get(&Field::VlanPcp), Some(&1));
    }
}
