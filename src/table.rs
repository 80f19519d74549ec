//! Single-table flow-rule emission
//!
//! Turns an [`Fdd`] into an ordered list of concrete [`FlowRule`]s for one
//! physical table (§4.5): enumerate root-to-leaf paths, keep each path's
//! positive test set as the rule's match pattern, and order the rules so
//! that a more specific pattern is always tried before a less specific one
//! it would otherwise be shadowed by. A path's negative tests need no
//! explicit encoding — the sibling paths that *are* those tests already
//! exist as higher-priority rules once the ordering is correct.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::{Action, ActionSet};
use crate::cache::{Cache, NodeId};
use crate::field::{Field, FieldOrder, Value};
use crate::group_table::{GroupId, GroupTable};
use crate::options::Options;

/// A flow rule's match, one positive test per constrained field.
pub type Pattern = BTreeMap<Field, Value>;

/// What a rule does to a matched packet.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RuleAction {
    /// No action: the packet is discarded.
    Drop,
    /// Exactly one action; applied inline, no group table entry needed.
    Single(Action),
    /// Two or more actions (multicast) or a fast-failover location; hoisted
    /// into the shared [`GroupTable`].
    Group(GroupId),
}

/// One concrete flow-table entry.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FlowRule {
    pub pattern: Pattern,
    pub action: RuleAction,
    pub priority: u32,
    pub cookie: u64,
    pub idle_timeout: u32,
    pub hard_timeout: u32,
}

/// A complete single table: its rules (highest priority first) and the
/// group-table entries those rules reference.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowTable {
    pub rules: Vec<FlowRule>,
    pub groups: GroupTable,
}

/// Errors building a [`FlowTable`].
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("action {0} names a fast-failover group with no candidate ports and no default output; cannot be expressed as a concrete rule")]
    IndeterminatePort(Action),
    #[error("action set mixes fast-failover with multicast fan-out, which openflow_adherence=Strict cannot express as a single group: {0}")]
    UnsupportedAction(Action),
    #[error("FDD tests field {0}, which the given layout does not cover")]
    FieldOutOfLayout(Field),
    #[error("FDD tests field {0} after its layout slab has already passed; layout order must track the FDD's field order")]
    LayoutOrderMismatch(Field),
}

fn enumerate_paths(cache: &Cache, root: NodeId) -> Vec<(Pattern, ActionSet)> {
    fn rec(cache: &Cache, n: NodeId, pos: &mut Pattern, out: &mut Vec<(Pattern, ActionSet)>) {
        match cache.top(n) {
            None => out.push((pos.clone(), cache.leaf(n).expect("non-branch node is a leaf"))),
            Some(test) => {
                let (t, f) = cache.children(n).expect("branch node has children");
                let prior = pos.insert(test.field, test.value.clone());
                rec(cache, t, pos, out);
                match prior {
                    Some(v) => {
                        pos.insert(test.field, v);
                    }
                    None => {
                        pos.remove(&test.field);
                    }
                }
                rec(cache, f, pos, out);
            }
        }
    }
    let mut out = Vec::new();
    rec(cache, root, &mut Pattern::new(), &mut out);
    out
}

/// True if every packet matching `specific` also matches `general`: for
/// every field `general` constrains, `specific` constrains it to an implied
/// value. A field `general` leaves wildcard is trivially satisfied. A field
/// `specific` leaves wildcard but `general` constrains can never be implied
/// (wildcard matches values `general` would reject).
fn pattern_implies(specific: &Pattern, general: &Pattern) -> bool {
    general.iter().all(|(field, gv)| {
        specific.get(field).is_some_and(|sv| sv.implies(gv))
    })
}

fn cmp_key(order: &FieldOrder, pattern: &Pattern) -> Vec<(u8, Value)> {
    let mut key: Vec<(u8, Value)> =
        pattern.iter().map(|(f, v)| (order.rank(*f), v.clone())).collect();
    key.sort_by(|a, b| a.0.cmp(&b.0));
    key
}

pub(crate) fn rule_order(order: &FieldOrder, a: &Pattern, b: &Pattern) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let a_more_specific = pattern_implies(a, b);
    let b_more_specific = pattern_implies(b, a);
    match (a_more_specific, b_more_specific) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => cmp_key(order, a).cmp(&cmp_key(order, b)),
    }
}

/// Resolve a leaf's [`ActionSet`] to a concrete rule action (§4.5, §4.8).
///
/// A `FastFail` location naming no candidate ports is
/// [`TableError::IndeterminatePort`] under `Strict` adherence; under
/// `Sloppy` it's dropped from the bucket with a `warn!`. Mixing
/// fast-failover with ordinary multicast fan-out in one bucket list can't
/// be expressed as a single OpenFlow group type; `Strict` rejects it as
/// [`TableError::UnsupportedAction`], `Sloppy` lowers it best-effort (both
/// kinds share one group, losing the failover distinction).
pub(crate) fn action_set_to_rule_action(
    groups: &mut GroupTable,
    set: &ActionSet,
    adherence: crate::options::OpenflowAdherence,
) -> Result<RuleAction, TableError> {
    use crate::field::Location;
    use crate::options::OpenflowAdherence;

    let mut actions: Vec<Action> = Vec::with_capacity(set.len());
    for action in set.actions() {
        if let Some(Value::Loc(Location::FastFail(ports))) = action.get(Field::Location) {
            if ports.is_empty() {
                match adherence {
                    OpenflowAdherence::Strict => return Err(TableError::IndeterminatePort(action.clone())),
                    OpenflowAdherence::Sloppy => {
                        warn!(%action, "fast-failover action names no candidate ports; dropping it under Sloppy adherence");
                        continue;
                    }
                }
            }
        }
        actions.push(action.clone());
    }

    let has_fast_fail = actions
        .iter()
        .any(|a| matches!(a.get(Field::Location), Some(Value::Loc(Location::FastFail(_)))));
    if actions.len() > 1 && has_fast_fail {
        match adherence {
            OpenflowAdherence::Strict => return Err(TableError::UnsupportedAction(actions[0].clone())),
            OpenflowAdherence::Sloppy => warn!("mixing fast-failover with multicast fan-out in one bucket list; lowering to a single group under Sloppy adherence"),
        }
    }

    match actions.len() {
        0 => Ok(RuleAction::Drop),
        1 => Ok(RuleAction::Single(actions.into_iter().next().expect("len 1"))),
        _ => Ok(RuleAction::Group(groups.intern(actions))),
    }
}

/// Remove trailing drop rules (lowest priority, action = drop): a switch's
/// implicit table-miss behavior is already drop, so they add nothing.
fn remove_tail_drops(mut rules: Vec<FlowRule>) -> Vec<FlowRule> {
    while matches!(rules.last(), Some(r) if r.action == RuleAction::Drop) {
        rules.pop();
    }
    rules
}

/// Drop a rule when the next (strictly lower priority, more general) rule
/// produces the same action — packets that would have hit the dropped rule
/// fall through to an equivalent one anyway.
fn dedup_adjacent(order: &FieldOrder, rules: Vec<FlowRule>) -> Vec<FlowRule> {
    let mut out = Vec::with_capacity(rules.len());
    for i in 0..rules.len() {
        let redundant = rules.get(i + 1).is_some_and(|next| {
            rules[i].action == next.action && pattern_implies(&rules[i].pattern, &next.pattern)
        });
        if !redundant {
            out.push(rules[i].clone());
        }
    }
    let _ = order;
    out
}

/// Emit a single flow table from a compiled FDD (§4.5).
pub fn to_table(cache: &Cache, root: NodeId, options: &Options) -> Result<FlowTable, TableError> {
    let mut paths = enumerate_paths(cache, root);
    paths.sort_by(|(pa, _), (pb, _)| rule_order(cache.order(), pa, pb));

    let mut groups = GroupTable::new();
    let mut rules = Vec::with_capacity(paths.len());
    for (i, (pattern, leaf)) in paths.into_iter().enumerate() {
        let action = action_set_to_rule_action(&mut groups, &leaf, options.openflow_adherence)?;
        rules.push(FlowRule {
            pattern,
            action,
            priority: 0,
            cookie: i as u64,
            idle_timeout: 0,
            hard_timeout: 0,
        });
    }

    if options.dedup_flows {
        rules = dedup_adjacent(cache.order(), rules);
    }
    if options.remove_tail_drops {
        rules = remove_tail_drops(rules);
    }

    let total = rules.len();
    for (i, rule) in rules.iter_mut().enumerate() {
        rule.priority = (total - i) as u32;
    }

    debug!(rules = rules.len(), groups = groups.len(), "single-table emission finished");
    Ok(FlowTable { rules, groups })
}
