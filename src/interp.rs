//! Reference interpreter
//!
//! A slow, direct evaluator used for testing and debugging (§4.7): `eval`
//! walks a diagram one concrete packet at a time rather than compiling to a
//! table, so it's easy to trust and cheap to check compiled output against.

use std::collections::BTreeMap;

use crate::action::ActionSet;
use crate::cache::{Cache, NodeId};
use crate::field::{Field, Value};
use crate::policy::Pred;

/// A concrete packet: total assignment isn't required, only the fields a
/// diagram actually tests need to be present — `eval` treats a missing
/// field as "never matches" for any concrete test on it.
pub type Packet = BTreeMap<Field, Value>;

/// Walk `root` against `packet`, returning the leaf [`ActionSet`] reached.
#[must_use]
pub fn eval(cache: &Cache, root: NodeId, packet: &Packet) -> ActionSet {
    let mut node = root;
    loop {
        match cache.top(node) {
            None => return cache.leaf(node).expect("non-branch node is a leaf"),
            Some(test) => {
                let (t, f) = cache.children(node).expect("branch has children");
                let matches = packet.get(&test.field).is_some_and(|v| v.implies(&test.value) || *v == test.value);
                node = if matches { t } else { f };
            }
        }
    }
}

/// The three ways a leaf action's output location classifies (§4.7).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionedOutputs {
    pub physical: Vec<crate::action::Action>,
    pub pipes: Vec<(String, crate::action::Action)>,
    pub queries: Vec<(String, crate::action::Action)>,
}

/// `eval_pipes`: evaluate, then partition the resulting actions by their
/// `Location` modification (if any) into physical/pipe/query buckets.
#[must_use]
pub fn eval_pipes(cache: &Cache, root: NodeId, packet: &Packet) -> PartitionedOutputs {
    let set = eval(cache, root, packet);
    let mut out = PartitionedOutputs::default();
    for action in set.actions() {
        match action.get(Field::Location) {
            Some(Value::Loc(crate::field::Location::Pipe(name))) => {
                out.pipes.push((name.clone(), action.clone()));
            }
            Some(Value::Loc(crate::field::Location::Query(name))) => {
                out.queries.push((name.clone(), action.clone()));
            }
            _ => out.physical.push(action.clone()),
        }
    }
    out
}

/// `pipes(FDD)`: the set of pipe names appearing in any reachable leaf.
#[must_use]
pub fn pipes(cache: &Cache, root: NodeId) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for node in crate::fdd::postorder(cache, root) {
        if let Some(set) = cache.leaf(node) {
            for action in set.actions() {
                if let Some(Value::Loc(crate::field::Location::Pipe(name))) = action.get(Field::Location) {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
    }
    names
}

/// `queries(FDD)`: for each query name appearing in a leaf, the disjunction
/// (as a [`Pred`]) of every root-to-leaf path predicate whose leaf contains
/// that query.
#[must_use]
pub fn queries(cache: &Cache, root: NodeId) -> Vec<(String, Pred)> {
    let mut acc: Vec<(String, Pred)> = Vec::new();
    let mut path: Vec<(Field, Value, bool)> = Vec::new();
    collect_queries(cache, root, &mut path, &mut acc);
    acc
}

fn path_predicate(path: &[(Field, Value, bool)]) -> Pred {
    path.iter().fold(Pred::True, |acc, (field, value, truth)| {
        let atom = Pred::test(*field, value.clone());
        let atom = if *truth { atom } else { Pred::neg(atom) };
        Pred::and(acc, atom)
    })
}

fn collect_queries(
    cache: &Cache,
    node: NodeId,
    path: &mut Vec<(Field, Value, bool)>,
    acc: &mut Vec<(String, Pred)>,
) {
    match cache.top(node) {
        None => {
            let set = cache.leaf(node).expect("leaf");
            for action in set.actions() {
                if let Some(Value::Loc(crate::field::Location::Query(name))) = action.get(Field::Location) {
                    let pred = path_predicate(path);
                    match acc.iter_mut().find(|(n, _)| n.as_str() == name.as_str()) {
                        Some((_, existing)) => *existing = Pred::or(existing.clone(), pred),
                        None => acc.push((name.clone(), pred)),
                    }
                }
            }
        }
        Some(test) => {
            let (t, f) = cache.children(node).expect("branch has children");
            path.push((test.field, test.value.clone(), true));
            collect_queries(cache, t, path, acc);
            path.pop();
            path.push((test.field, test.value.clone(), false));
            collect_queries(cache, f, path, acc);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::compiler::compile_local;
    use crate::field::FieldOrder;
    use crate::options::Options;
    use crate::policy::Policy;

    #[test]
    fn eval_follows_the_matching_branch() {
        let cache = Cache::new(FieldOrder::default_order());
        let p = Policy::union(
            Policy::seq(
                Policy::filter(Pred::test(Field::Vlan, Value::Const(1))),
                Policy::modify(Field::VlanPcp, Value::Const(9)),
            ),
            Policy::seq(
                Policy::filter(Pred::neg(Pred::test(Field::Vlan, Value::Const(1)))),
                Policy::modify(Field::VlanPcp, Value::Const(0)),
            ),
        );
        let fdd = compile_local(&cache, &p, None, &Options::default()).unwrap();

        let mut packet = Packet::new();
        packet.insert(Field::Vlan, Value::Const(1));
        let out = eval(&cache, fdd, &packet);
        assert_eq!(out, ActionSet::single(Action::from_mods([
            crate::field::Modification::new(Field::VlanPcp, Value::Const(9)).unwrap()
        ])));

        packet.insert(Field::Vlan, Value::Const(2));
        let out = eval(&cache, fdd, &packet);
        assert_eq!(out, ActionSet::single(Action::from_mods([
            crate::field::Modification::new(Field::VlanPcp, Value::Const(0)).unwrap()
        ])));
    }

    #[test]
    fn eval_pipes_buckets_by_location_kind() {
        let cache = Cache::new(FieldOrder::default_order());
        let p = Policy::modify(Field::Location, Value::Loc(crate::field::Location::Pipe("ctl".into())));
        let fdd = compile_local(&cache, &p, None, &Options::default()).unwrap();
        let out = eval_pipes(&cache, fdd, &Packet::new());
        assert_eq!(out.pipes.len(), 1);
        assert!(out.physical.is_empty());
        assert_eq!(pipes(&cache, fdd), vec!["ctl".to_string()]);
    }

    #[test]
    fn queries_collects_the_guarding_predicate() {
        let cache = Cache::new(FieldOrder::default_order());
        let p = Policy::seq(
            Policy::filter(Pred::test(Field::Vlan, Value::Const(7))),
            Policy::modify(Field::Location, Value::Loc(crate::field::Location::Query("counted".into()))),
        );
        let fdd = compile_local(&cache, &p, None, &Options::default()).unwrap();
        let qs = queries(&cache, fdd);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].0, "counted");
    }
}
