//! Property-based checks of the algebra `fdd`/`compiler` are required to
//! satisfy, over small generated predicates and policies on a bounded
//! field/value universe. Complements the named unit-test scenarios kept
//! inline in `src/fdd.rs` and `src/compiler.rs` (S1-S6).
//!
//! The universe is deliberately small (two fields, three values each): wide
//! enough to exercise branching and sharing, narrow enough that proptest's
//! shrinker converges fast on a failure.

use proptest::prelude::*;

use netkat_fdd::action::{Action, ActionSet};
use netkat_fdd::cache::Cache;
use netkat_fdd::compiler::of_policy;
use netkat_fdd::field::{Field, FieldOrder, Modification, Value};
use netkat_fdd::fdd;
use netkat_fdd::interp::{eval, Packet};
use netkat_fdd::policy::{Policy, Pred};

fn arb_field() -> impl Strategy<Value = Field> {
    prop_oneof![Just(Field::Vlan), Just(Field::VlanPcp)]
}

fn arb_value() -> impl Strategy<Value = Value> {
    (0u64..3).prop_map(Value::Const)
}

fn arb_pred() -> impl Strategy<Value = Pred> {
    let leaf = prop_oneof![
        Just(Pred::True),
        Just(Pred::False),
        (arb_field(), arb_value()).prop_map(|(f, v)| Pred::Test(f, v)),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|p| Pred::Neg(Box::new(p))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Pred::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Pred::Or(Box::new(a), Box::new(b))),
        ]
    })
}

/// Policies without `Star`/`Link`: a denotational evaluator independent of
/// `compiler`/`fdd` is only straightforward to write for the star-free
/// fragment (`star`'s fixed point is checked separately, via the unfolding
/// law, rather than by reimplementing Kleene iteration here).
fn arb_policy() -> impl Strategy<Value = Policy> {
    let leaf = prop_oneof![
        arb_pred().prop_map(Policy::Filter),
        (arb_field(), arb_value()).prop_map(|(f, v)| Policy::Mod(f, v)),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Policy::Union(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Policy::Seq(Box::new(a), Box::new(b))),
        ]
    })
}

fn arb_packet() -> impl Strategy<Value = Packet> {
    (proptest::option::of(arb_value()), proptest::option::of(arb_value())).prop_map(|(vlan, pcp)| {
        let mut packet = Packet::new();
        if let Some(v) = vlan {
            packet.insert(Field::Vlan, v);
        }
        if let Some(v) = pcp {
            packet.insert(Field::VlanPcp, v);
        }
        packet
    })
}

fn denote_pred(pred: &Pred, packet: &Packet) -> bool {
    match pred {
        Pred::True => true,
        Pred::False => false,
        Pred::Test(f, v) => packet.get(f).is_some_and(|pv| pv.implies(v)),
        Pred::Neg(p) => !denote_pred(p, packet),
        Pred::And(a, b) => denote_pred(a, packet) && denote_pred(b, packet),
        Pred::Or(a, b) => denote_pred(a, packet) || denote_pred(b, packet),
    }
}

/// The packet-set denotational semantics directly on the AST: `Seq`
/// evaluates its right side under each left-side output's assignments, so a
/// `Test` after a `Mod` on the same field sees the updated value.
fn denote_policy(policy: &Policy, packet: &Packet) -> ActionSet {
    match policy {
        Policy::Filter(p) => {
            if denote_pred(p, packet) {
                ActionSet::id()
            } else {
                ActionSet::drop()
            }
        }
        Policy::Mod(f, v) => ActionSet::single(Action::from_mods([
            Modification::new(*f, v.clone()).expect("generator only emits field-legal values"),
        ])),
        Policy::Union(a, b) => ActionSet::par(&denote_policy(a, packet), &denote_policy(b, packet)),
        Policy::Seq(a, b) => {
            let mut acc = ActionSet::drop();
            for action in denote_policy(a, packet).actions() {
                let mut next = packet.clone();
                for (field, value) in action.iter() {
                    next.insert(*field, value.clone());
                }
                let tail = denote_policy(b, &next);
                acc = ActionSet::par(&acc, &ActionSet::seq_set(action, &tail));
            }
            acc
        }
        Policy::Star(_) | Policy::Link(..) => unreachable!("arb_policy excludes Star and Link"),
    }
}

proptest! {
    /// Law 7: `eval(pkt, of_policy(p)) = denotational_eval(pkt, p)`.
    #[test]
    fn round_trip_matches_denotational_semantics(policy in arb_policy(), packet in arb_packet()) {
        let cache = Cache::new(FieldOrder::default_order());
        let root = of_policy(&cache, &policy).expect("arb_policy never emits Link");
        prop_assert_eq!(eval(&cache, root, &packet), denote_policy(&policy, &packet));
    }

    /// Laws 1 (partial) and 2: union is idempotent and commutative at the
    /// handle level, not merely the semantic one (canonicalization, law 6).
    #[test]
    fn union_is_idempotent_and_commutative(a in arb_policy(), b in arb_policy()) {
        let cache = Cache::new(FieldOrder::default_order());
        let fa = of_policy(&cache, &a).unwrap();
        let fb = of_policy(&cache, &b).unwrap();
        prop_assert!(fdd::equal(fdd::union(&cache, fa, fa), fa));
        prop_assert!(fdd::equal(fdd::union(&cache, fa, fb), fdd::union(&cache, fb, fa)));
    }

    /// Law 3: associativity of `union` and `seq`.
    #[test]
    fn union_and_seq_are_associative(a in arb_policy(), b in arb_policy(), c in arb_policy()) {
        let cache = Cache::new(FieldOrder::default_order());
        let fa = of_policy(&cache, &a).unwrap();
        let fb = of_policy(&cache, &b).unwrap();
        let fc = of_policy(&cache, &c).unwrap();

        let lhs = fdd::union(&cache, fdd::union(&cache, fa, fb), fc);
        let rhs = fdd::union(&cache, fa, fdd::union(&cache, fb, fc));
        prop_assert!(fdd::equal(lhs, rhs));

        let lhs = fdd::seq(&cache, fdd::seq(&cache, fa, fb), fc);
        let rhs = fdd::seq(&cache, fa, fdd::seq(&cache, fb, fc));
        prop_assert!(fdd::equal(lhs, rhs));
    }

    /// Law 4: `seq` distributes over `union` on both sides.
    #[test]
    fn seq_distributes_over_union(a in arb_policy(), b in arb_policy(), c in arb_policy()) {
        let cache = Cache::new(FieldOrder::default_order());
        let fa = of_policy(&cache, &a).unwrap();
        let fb = of_policy(&cache, &b).unwrap();
        let fc = of_policy(&cache, &c).unwrap();

        let lhs = fdd::seq(&cache, fdd::union(&cache, fa, fb), fc);
        let rhs = fdd::union(&cache, fdd::seq(&cache, fa, fc), fdd::seq(&cache, fb, fc));
        prop_assert!(fdd::equal(lhs, rhs));

        let lhs = fdd::seq(&cache, fa, fdd::union(&cache, fb, fc));
        let rhs = fdd::union(&cache, fdd::seq(&cache, fa, fb), fdd::seq(&cache, fa, fc));
        prop_assert!(fdd::equal(lhs, rhs));
    }

    /// Law 5: `star(x) = union(id, seq(x, star(x))) = union(id, seq(star(x), x))`.
    #[test]
    fn star_unfolds_on_both_sides(p in arb_policy()) {
        let cache = Cache::new(FieldOrder::default_order());
        let x = of_policy(&cache, &p).unwrap();
        let starred = fdd::star(&cache, x);

        let right_unfold = fdd::union(&cache, cache.id_id(), fdd::seq(&cache, x, starred));
        prop_assert!(fdd::equal(starred, right_unfold));

        let left_unfold = fdd::union(&cache, cache.id_id(), fdd::seq(&cache, starred, x));
        prop_assert!(fdd::equal(starred, left_unfold));
    }

    /// Law 9: `eval(pkt, restrict(f, v, x)) = eval(pkt, x)` whenever `pkt[f] = v`.
    #[test]
    fn restrict_agrees_with_eval_under_its_own_assumption(
        p in arb_policy(),
        field in arb_field(),
        value in arb_value(),
    ) {
        let cache = Cache::new(FieldOrder::default_order());
        let x = of_policy(&cache, &p).unwrap();
        let restricted = fdd::restrict(&cache, field, value.clone(), x);

        let mut packet = Packet::new();
        packet.insert(field, value);
        prop_assert_eq!(eval(&cache, restricted, &packet), eval(&cache, x, &packet));
    }

    /// Law 10: `star` reaches its fixed point within as many iterations as
    /// there are reachable diagrams in the recursion — in practice, within a
    /// handful of `seq`/`union` rounds over this bounded universe. Checked by
    /// confirming one more manual unfold round no longer changes the handle.
    #[test]
    fn star_converges_quickly(p in arb_policy()) {
        let cache = Cache::new(FieldOrder::default_order());
        let x = of_policy(&cache, &p).unwrap();
        let starred = fdd::star(&cache, x);
        let one_more_round = fdd::union(&cache, cache.id_id(), fdd::seq(&cache, x, starred));
        prop_assert!(fdd::equal(starred, one_more_round));
    }
}
