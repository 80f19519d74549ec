//! The Forwarding Decision Diagram engine
//!
//! This is the heart of the compiler: a hash-consed, canonical, ordered,
//! reduced multi-terminal decision diagram (§3) with a memoized binary
//! `apply` engine (§4.3) that lifts leaf-level [`ActionSet`] operations to
//! whole-diagram operations. Every function here takes an explicit
//! [`Cache`] — diagrams from two different caches must never be mixed.
//!
//! ## Cofactoring
//!
//! `union` uses the textbook simultaneous binary-apply recursion: cofactor
//! both operands on the minimal top test, recurse, recombine with `mk`.
//! `seq` cannot use that recursion unchanged, because an action assigns
//! concrete values rather than merely testing them — pushing `y` under an
//! `x`-leaf requires genuinely *substituting* each assignment into `y`
//! (`restrict_action`), not just cofactoring on a shared test. The branch
//! case of `seq` still cofactors `y` on `x`'s own test (a pure test commutes
//! with substitution the same way it does for `union`); only the leaf case
//! is special, exactly as §4.3 describes.

use hashbrown::HashMap as HHashMap;
use std::cmp::Ordering;

use crate::action::{Action, ActionSet};
use crate::cache::{Cache, MemoKey, NodeId, NodeRepr};
use crate::field::{relation, Field, Modification, Relation, Test, Value};

/// A diagram handle. An alias, not a newtype: FDDs are interned [`NodeId`]s
/// and carry no payload of their own.
pub type Fdd = NodeId;

/// Errors raised by the diagram engine itself (as opposed to compilation or
/// table emission).
#[derive(Debug, thiserror::Error)]
pub enum FddError {
    #[error("negate() requires a predicate diagram (every leaf must be `id` or `drop`)")]
    NonPredicateNegation,
}

/// `Filter(True)` → `id`.
#[must_use]
pub fn mk_true(cache: &Cache) -> Fdd {
    cache.id_id()
}

/// `Filter(False)` → `drop`.
#[must_use]
pub fn mk_false(cache: &Cache) -> Fdd {
    cache.drop_id()
}

/// `Filter(Test(f,v))` → branch on `(f,v)` with `id` on true, `drop` on false.
#[must_use]
pub fn mk_test(cache: &Cache, test: &Test) -> Fdd {
    cache.mk(test.clone(), cache.id_id(), cache.drop_id())
}

/// `Mod(f,v)` → leaf containing the singleton action set `{{(f,v)}}`.
#[must_use]
pub fn mk_mod(cache: &Cache, m: &Modification) -> Fdd {
    let action = Action::from_mods([m.clone()]);
    cache.mk_leaf(ActionSet::single(action))
}

fn test_order(cache: &Cache, a: &Test, b: &Test) -> Ordering {
    cache.order().compare(a.field, b.field).then_with(|| a.value.cmp(&b.value))
}

/// `min(top(x), top(y))` with `None` (a leaf, `⊤`) sorting last.
fn min_test(cache: &Cache, a: Option<Test>, b: Option<Test>) -> Option<Test> {
    match (a, b) {
        (None, None) => None,
        (Some(t), None) | (None, Some(t)) => Some(t),
        (Some(ta), Some(tb)) => {
            if test_order(cache, &ta, &tb) != Ordering::Greater {
                Some(ta)
            } else {
                Some(tb)
            }
        }
    }
}

/// Cofactor `node` on `test`: the subdiagram valid under the assumption that
/// `test` is `truth`. Leaves are unaffected; branches on a different field
/// pass through unchanged; branches on the same field with a different
/// value are resolved via [`relation`] when possible, otherwise left as-is
/// (the assumption doesn't determine them).
fn cofactor(cache: &Cache, node: NodeId, test: &Test, truth: bool) -> NodeId {
    let Some(t2) = cache.top(node) else { return node };
    if t2.field != test.field {
        return node;
    }
    let (tr, fl) = cache.children(node).expect("branch node has children");
    if t2 == *test {
        return if truth { tr } else { fl };
    }
    match relation(&test.value, &t2.value) {
        Relation::Same => unreachable!("equal values imply t2 == *test"),
        Relation::Disjoint => {
            if truth {
                fl
            } else {
                node
            }
        }
        Relation::ContainedBy => {
            if truth {
                tr
            } else {
                node
            }
        }
        Relation::Contains => {
            if truth {
                node
            } else {
                fl
            }
        }
    }
}

/// `union(x,y)` — leaf-combine is [`ActionSet::par`]. Identity `drop`;
/// idempotent, commutative, associative.
pub fn union(cache: &Cache, x: Fdd, y: Fdd) -> Fdd {
    if x == y {
        return x;
    }
    if x == cache.drop_id() {
        return y;
    }
    if y == cache.drop_id() {
        return x;
    }
    let key = MemoKey::Union(x.min(y), x.max(y));
    if let Some(r) = cache.memo_get(&key) {
        return r;
    }
    let result = match (cache.top(x), cache.top(y)) {
        (None, None) => {
            let sx = cache.leaf(x).expect("leaf");
            let sy = cache.leaf(y).expect("leaf");
            cache.mk_leaf(ActionSet::par(&sx, &sy))
        }
        _ => {
            let t = min_test(cache, cache.top(x), cache.top(y)).expect("at least one branch");
            let xt = cofactor(cache, x, &t, true);
            let xf = cofactor(cache, x, &t, false);
            let yt = cofactor(cache, y, &t, true);
            let yf = cofactor(cache, y, &t, false);
            let rt = union(cache, xt, yt);
            let rf = union(cache, xf, yf);
            cache.mk(t, rt, rf)
        }
    };
    cache.memo_put(key, result);
    result
}

/// `seq(x,y)` — push `y` under each leaf of `x`, substituting at leaves
/// (§4.3). See the module doc for why this differs from `union`'s recursion.
pub fn seq(cache: &Cache, x: Fdd, y: Fdd) -> Fdd {
    if x == cache.drop_id() {
        return cache.drop_id();
    }
    if x == cache.id_id() {
        return y;
    }
    if y == cache.id_id() {
        return x;
    }
    let key = MemoKey::Seq(x, y);
    if let Some(r) = cache.memo_get(&key) {
        return r;
    }
    let result = match cache.top(x) {
        None => {
            let s = cache.leaf(x).expect("leaf");
            seq_leaf(cache, &s, y)
        }
        Some(test) => {
            let (xt, xf) = cache.children(x).expect("branch");
            let yt = cofactor(cache, y, &test, true);
            let yf = cofactor(cache, y, &test, false);
            let rt = seq(cache, xt, yt);
            let rf = seq(cache, xf, yf);
            cache.mk(test, rt, rf)
        }
    };
    cache.memo_put(key, result);
    result
}

fn seq_leaf(cache: &Cache, s: &ActionSet, y: Fdd) -> Fdd {
    if s.is_drop() {
        return cache.drop_id();
    }
    let mut acc = cache.drop_id();
    for a in s.actions() {
        let restricted = restrict_action(cache, y, a);
        let pushed = push_action(cache, restricted, a);
        acc = union(cache, acc, pushed);
    }
    acc
}

/// Replace every leaf `T` of `node` with `seqSet(a, T)`.
fn push_action(cache: &Cache, node: NodeId, a: &Action) -> NodeId {
    let key = MemoKey::PushAction(a.clone(), node);
    if let Some(r) = cache.memo_get(&key) {
        return r;
    }
    let result = match cache.top(node) {
        None => {
            let t = cache.leaf(node).expect("leaf");
            cache.mk_leaf(ActionSet::seq_set(a, &t))
        }
        Some(test) => {
            let (t, f) = cache.children(node).expect("branch");
            let rt = push_action(cache, t, a);
            let rf = push_action(cache, f, a);
            cache.mk(test, rt, rf)
        }
    };
    cache.memo_put(key, result);
    result
}

/// `restrict(field, value, x)` — partial evaluation fixing `field` to
/// `value` throughout `x` (§4.3). Used directly by callers (multi-table
/// layout splitting, the property in §8.9) and internally by `seq`'s
/// leaf substitution (one call per field an action assigns).
pub fn restrict(cache: &Cache, field: Field, value: Value, x: Fdd) -> Fdd {
    let key = MemoKey::Restrict(field, value.clone(), x);
    if let Some(r) = cache.memo_get(&key) {
        return r;
    }
    let result = match cache.top(x) {
        None => x,
        Some(test) if test.field == field => {
            let (t, f) = cache.children(x).expect("branch");
            match relation(&value, &test.value) {
                Relation::Same | Relation::ContainedBy => t,
                // `Contains`: the fixed value's range straddles this narrower
                // test: neither branch is exactly right, so we conservatively
                // treat it as not matching (default-deny), documented here
                // rather than silently guessed.
                Relation::Disjoint | Relation::Contains => f,
            }
        }
        Some(test) => {
            let (t, f) = cache.children(x).expect("branch");
            let rt = restrict(cache, field, value.clone(), t);
            let rf = restrict(cache, field, value.clone(), f);
            cache.mk(test, rt, rf)
        }
    };
    cache.memo_put(key, result);
    result
}

/// Fold [`restrict`] over every field an action assigns — `restrict(y, a)`
/// in §4.3's notation.
fn restrict_action(cache: &Cache, x: Fdd, a: &Action) -> Fdd {
    let mut cur = x;
    for (field, value) in a.iter() {
        cur = restrict(cache, *field, value.clone(), cur);
    }
    cur
}

/// `negate(x)` — requires every leaf of `x` to be `id` or `drop` (a
/// predicate diagram); swaps them. Fails with [`FddError::NonPredicateNegation`]
/// otherwise.
pub fn negate(cache: &Cache, x: Fdd) -> Result<Fdd, FddError> {
    if let Some(r) = cache.memo_get(&MemoKey::Negate(x)) {
        return Ok(r);
    }
    let result = match cache.top(x) {
        None => {
            let s = cache.leaf(x).expect("leaf");
            if s.is_id() {
                cache.drop_id()
            } else if s.is_drop() {
                cache.id_id()
            } else {
                return Err(FddError::NonPredicateNegation);
            }
        }
        Some(test) => {
            let (t, f) = cache.children(x).expect("branch");
            let rt = negate(cache, t)?;
            let rf = negate(cache, f)?;
            cache.mk(test, rt, rf)
        }
    };
    cache.memo_put(MemoKey::Negate(x), result);
    Ok(result)
}

/// `star(x)` via Kleene iteration: `P0 = id`, `P(k+1) = union(id, seq(Pk, x))`,
/// stopping at handle equality. Terminates because the reachable-diagram
/// lattice for a fixed `x` is finite (§9).
pub fn star(cache: &Cache, x: Fdd) -> Fdd {
    if let Some(r) = cache.memo_get(&MemoKey::Star(x)) {
        return r;
    }
    let mut p = cache.id_id();
    loop {
        let next = union(cache, cache.id_id(), seq(cache, p, x));
        if next == p {
            break;
        }
        p = next;
    }
    cache.memo_put(MemoKey::Star(x), p);
    p
}

/// Canonicalize leaves: drop an assignment whose value is already guaranteed
/// by a positive test on the path leading to that leaf.
#[must_use]
pub fn dedup(cache: &Cache, x: Fdd) -> Fdd {
    let mut known = HHashMap::new();
    dedup_rec(cache, x, &mut known)
}

fn dedup_rec(cache: &Cache, x: Fdd, known: &mut HHashMap<Field, Value>) -> Fdd {
    match cache.top(x) {
        None => {
            let s = cache.leaf(x).expect("leaf");
            let pruned: Vec<Action> = s
                .actions()
                .map(|a| {
                    let mods = a
                        .iter()
                        .filter(|(f, v)| known.get(f) != Some(*v))
                        .map(|(f, v)| Modification { field: *f, value: v.clone() });
                    Action::from_mods(mods)
                })
                .collect();
            let mut out = ActionSet::drop();
            for a in pruned {
                out = ActionSet::par(&out, &ActionSet::single(a));
            }
            cache.mk_leaf(out)
        }
        Some(test) => {
            let (t, f) = cache.children(x).expect("branch");
            let previous = known.insert(test.field, test.value.clone());
            let rt = dedup_rec(cache, t, known);
            match previous {
                Some(v) => {
                    known.insert(test.field, v);
                }
                None => {
                    known.remove(&test.field);
                }
            }
            let rf = dedup_rec(cache, f, known);
            cache.mk(test, rt, rf)
        }
    }
}

/// Reachable node count (sharing counted once).
#[must_use]
pub fn size(cache: &Cache, x: Fdd) -> usize {
    cache.size(x)
}

/// `(reachable nodes, nodes if expanded without sharing)`.
#[must_use]
pub fn compression_ratio(cache: &Cache, x: Fdd) -> (usize, usize) {
    cache.compression_ratio(x)
}

/// Handle-identity equality — the only notion of equality exposed on FDDs.
#[must_use]
pub fn equal(x: Fdd, y: Fdd) -> bool {
    x == y
}

/// Render the canonical VLR-style textual form: one line per reachable node
/// (post-order, so every reference is already defined), then a `root:` line.
#[must_use]
pub fn to_string_repr(cache: &Cache, root: Fdd) -> String {
    let order = postorder(cache, root);
    let mut out = String::new();
    for n in &order {
        match cache.repr(*n) {
            NodeRepr::Leaf(s) => {
                out.push_str(&format!("{}: {}\n", n.as_u32(), s));
            }
            NodeRepr::Branch { test, t, f } => {
                out.push_str(&format!("{}: {} ? {} : {}\n", n.as_u32(), test, t.as_u32(), f.as_u32()));
            }
        }
    }
    out.push_str(&format!("root: {}\n", root.as_u32()));
    out
}

/// Render as GraphViz DOT.
#[must_use]
pub fn to_dotfile(cache: &Cache, root: Fdd) -> String {
    let order = postorder(cache, root);
    let mut out = String::from("digraph fdd {\n");
    for n in &order {
        match cache.repr(*n) {
            NodeRepr::Leaf(s) => {
                out.push_str(&format!(
                    "  n{} [shape=box,label=\"{}\"];\n",
                    n.as_u32(),
                    s.to_string().replace('"', "\\\"")
                ));
            }
            NodeRepr::Branch { test, t, f } => {
                out.push_str(&format!(
                    "  n{} [shape=diamond,label=\"{}\"];\n",
                    n.as_u32(),
                    test.to_string().replace('"', "\\\"")
                ));
                out.push_str(&format!("  n{} -> n{} [label=\"true\"];\n", n.as_u32(), t.as_u32()));
                out.push_str(&format!(
                    "  n{} -> n{} [label=\"false\",style=dashed];\n",
                    n.as_u32(),
                    f.as_u32()
                ));
            }
        }
    }
    out.push_str("}\n");
    out
}

pub(crate) fn postorder(cache: &Cache, root: Fdd) -> Vec<NodeId> {
    let mut seen = hashbrown::HashSet::new();
    let mut order = Vec::new();
    fn visit(cache: &Cache, n: NodeId, seen: &mut hashbrown::HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !seen.insert(n) {
            return;
        }
        if let Some((t, f)) = cache.children(n) {
            visit(cache, t, seen, order);
            visit(cache, f, seen, order);
        }
        order.push(n);
    }
    visit(cache, root, &mut seen, &mut order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldOrder, Value};

    fn test_atom(field: Field, v: u64) -> Test {
        Test::new(field, Value::Const(v)).unwrap()
    }

    fn md(field: Field, v: u64) -> Modification {
        Modification::new(field, Value::Const(v)).unwrap()
    }

    #[test]
    fn union_is_idempotent_commutative_identity() {
        let cache = Cache::new(FieldOrder::default_order());
        let x = mk_test(&cache, &test_atom(Field::Vlan, 1));
        assert_eq!(union(&cache, x, x), x);
        assert_eq!(union(&cache, x, cache.drop_id()), x);
        let y = mk_test(&cache, &test_atom(Field::VlanPcp, 2));
        assert_eq!(union(&cache, x, y), union(&cache, y, x));
    }

    #[test]
    fn union_is_associative() {
        let cache = Cache::new(FieldOrder::default_order());
        let x = mk_test(&cache, &test_atom(Field::Vlan, 1));
        let y = mk_test(&cache, &test_atom(Field::VlanPcp, 2));
        let z = mk_mod(&cache, &md(Field::EthType, 0x800));
        let lhs = union(&cache, union(&cache, x, y), z);
        let rhs = union(&cache, x, union(&cache, y, z));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn seq_identities() {
        let cache = Cache::new(FieldOrder::default_order());
        let x = mk_mod(&cache, &md(Field::Vlan, 9));
        assert_eq!(seq(&cache, cache.id_id(), x), x);
        assert_eq!(seq(&cache, x, cache.id_id()), x);
        assert_eq!(seq(&cache, cache.drop_id(), x), cache.drop_id());
    }

    #[test]
    fn seq_distributes_over_union_on_the_left() {
        let cache = Cache::new(FieldOrder::default_order());
        let x = mk_mod(&cache, &md(Field::Vlan, 1));
        let y = mk_mod(&cache, &md(Field::Vlan, 2));
        let z = mk_mod(&cache, &md(Field::VlanPcp, 3));
        let lhs = seq(&cache, union(&cache, x, y), z);
        let rhs = union(&cache, seq(&cache, x, z), seq(&cache, y, z));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn seq_pushes_assignment_through_a_dependent_test() {
        // Seq(Mod(EthType,0x800), Filter(Test(EthType,0x800))) should reduce
        // to Mod(EthType,0x800) itself: the test is guaranteed by the mod.
        let cache = Cache::new(FieldOrder::default_order());
        let set_type = mk_mod(&cache, &md(Field::EthType, 0x800));
        let test_type = mk_test(&cache, &test_atom(Field::EthType, 0x800));
        let composed = seq(&cache, set_type, test_type);
        assert_eq!(composed, set_type);
    }

    #[test]
    fn star_unfolds_and_terminates_quickly() {
        // S3: Star(Mod(Vlan,7)) == union(id, Mod(Vlan,7)); size <= 3.
        let cache = Cache::new(FieldOrder::default_order());
        let x = mk_mod(&cache, &md(Field::Vlan, 7));
        let starred = star(&cache, x);
        let expected = union(&cache, cache.id_id(), x);
        assert_eq!(starred, expected);
        assert!(size(&cache, starred) <= 3);
        // unfolding law: star(x) == union(id, seq(x, star(x)))
        let unfolded = union(&cache, cache.id_id(), seq(&cache, x, starred));
        assert_eq!(starred, unfolded);
    }

    #[test]
    fn restrict_eliminates_the_tested_field() {
        // S4: Seq(Filter(Test(EthType,0x800)), Mod(Vlan,100)) restricted at
        // EthType=0x800 equals compiling Mod(Vlan,100) alone.
        let cache = Cache::new(FieldOrder::default_order());
        let filt = mk_test(&cache, &test_atom(Field::EthType, 0x800));
        let set_vlan = mk_mod(&cache, &md(Field::Vlan, 100));
        let composed = seq(&cache, filt, set_vlan);
        let restricted = restrict(&cache, Field::EthType, Value::Const(0x800), composed);
        assert_eq!(restricted, set_vlan);
    }

    #[test]
    fn negate_requires_a_predicate() {
        let cache = Cache::new(FieldOrder::default_order());
        let not_a_pred = mk_mod(&cache, &md(Field::Vlan, 1));
        assert!(matches!(negate(&cache, not_a_pred), Err(FddError::NonPredicateNegation)));

        let pred = mk_test(&cache, &test_atom(Field::Vlan, 1));
        let negated = negate(&cache, pred).unwrap();
        assert_eq!(negate(&cache, negated).unwrap(), pred);
    }

    #[test]
    fn dedup_removes_redundant_same_value_assignment() {
        let cache = Cache::new(FieldOrder::default_order());
        let test_vlan = test_atom(Field::Vlan, 1);
        let redundant_mod = mk_mod(&cache, &md(Field::Vlan, 1));
        let composed = cache.mk(test_vlan, redundant_mod, cache.drop_id());
        let deduped = dedup(&cache, composed);
        let (t, _) = cache.children(deduped).unwrap();
        assert_eq!(cache.leaf(t), Some(ActionSet::id()));
    }

    #[test]
    fn prefix_cofactor_resolves_contained_ip_tests() {
        use crate::field::IpPrefix;
        let cache = Cache::new(FieldOrder::default_order());
        let coarse = Test::new(Field::IP4Src, Value::Ip(IpPrefix { value: 0x0a00_0000, mask_bits: 8 }))
            .unwrap();
        let fine = Test::new(Field::IP4Src, Value::Ip(IpPrefix { value: 0x0a01_0203, mask_bits: 32 }))
            .unwrap();
        let x = mk_test(&cache, &coarse);
        let y = mk_test(&cache, &fine);
        // fine => coarse, so Seq(Filter(fine), Filter(coarse)) == Filter(fine).
        assert_eq!(seq(&cache, y, x), y);
    }
}
