//! Multi-table flow-rule emission
//!
//! Given a **layout** — an ordered partition of fields into successive
//! tables — splits an [`Fdd`] horizontally and emits one [`FlowTable`]-like
//! rule set per table, stitched together with `GotoTable` instructions
//! carrying `metadata = (tableId, metaId)` (§4.6). `metaId` is the boundary
//! sub-diagram's own node id: stable, and already unique within a `Cache`.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::ActionSet;
use crate::cache::{Cache, NodeId};
use crate::field::Field;
use crate::group_table::GroupTable;
use crate::options::Options;
use crate::table::{self, Pattern, RuleAction, TableError};

/// An ordered partition of fields across successive tables.
pub type Layout = Vec<Vec<Field>>;

/// What a multi-table rule does once matched.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Instruction {
    /// Terminal: apply this action and stop the pipeline.
    Action(RuleAction),
    /// Continue to the next table, tagging `metadata` so it can pick the
    /// right sub-diagram's rules back up.
    GotoTable { table: u32, meta_id: u32 },
}

/// One rule in a multi-table pipeline. `meta` is the `(tableId, metaId)`
/// this rule requires the incoming packet's metadata to carry; `None` only
/// for table 0, whose rules are unconditional on metadata.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MultiTableRule {
    pub meta: Option<(u32, u32)>,
    pub pattern: Pattern,
    pub instruction: Instruction,
    pub priority: u32,
    pub cookie: u64,
}

/// The full pipeline: one rule list per table plus the shared group table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MultiTable {
    pub tables: Vec<Vec<MultiTableRule>>,
    pub groups: GroupTable,
}

fn slab_of(layout: &Layout, field: Field) -> Option<usize> {
    layout.iter().position(|slab| slab.contains(&field))
}

fn fields_in_fdd(cache: &Cache, root: NodeId) -> HashSet<Field> {
    let mut seen_nodes = HashSet::new();
    let mut fields = HashSet::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if !seen_nodes.insert(n) {
            continue;
        }
        if let Some(test) = cache.top(n) {
            fields.insert(test.field);
            let (t, f) = cache.children(n).expect("branch has children");
            stack.push(t);
            stack.push(f);
        }
    }
    fields
}

enum SlabOutcome {
    Terminal(ActionSet),
    Boundary(NodeId),
}

#[allow(clippy::too_many_arguments)]
fn enumerate_slab(
    cache: &Cache,
    node: NodeId,
    layout: &Layout,
    table_idx: usize,
    pos: &mut Pattern,
    out: &mut Vec<(Pattern, SlabOutcome)>,
) -> Result<(), TableError> {
    match cache.top(node) {
        None => {
            out.push((pos.clone(), SlabOutcome::Terminal(cache.leaf(node).expect("leaf"))));
            Ok(())
        }
        Some(test) => match slab_of(layout, test.field) {
            None => Err(TableError::FieldOutOfLayout(test.field)),
            Some(idx) if idx < table_idx => Err(TableError::LayoutOrderMismatch(test.field)),
            Some(idx) if idx > table_idx => {
                out.push((pos.clone(), SlabOutcome::Boundary(node)));
                Ok(())
            }
            Some(_) => {
                let (t, f) = cache.children(node).expect("branch has children");
                let prior = pos.insert(test.field, test.value.clone());
                enumerate_slab(cache, t, layout, table_idx, pos, out)?;
                match prior {
                    Some(v) => {
                        pos.insert(test.field, v);
                    }
                    None => {
                        pos.remove(&test.field);
                    }
                }
                enumerate_slab(cache, f, layout, table_idx, pos, out)
            }
        },
    }
}

/// Emit a multi-table pipeline from a compiled FDD under `layout` (§4.6).
///
/// Fails with [`TableError::FieldOutOfLayout`] if the FDD tests a field the
/// layout doesn't cover.
pub fn to_multitable(
    cache: &Cache,
    root: NodeId,
    layout: &Layout,
    options: &Options,
) -> Result<MultiTable, TableError> {
    let tested = fields_in_fdd(cache, root);
    for field in &tested {
        if slab_of(layout, *field).is_none() {
            return Err(TableError::FieldOutOfLayout(*field));
        }
    }

    let mut groups = GroupTable::new();
    let mut tables: Vec<Vec<MultiTableRule>> = vec![Vec::new(); layout.len()];
    let mut frontier: Vec<(NodeId, Option<(u32, u32)>)> = vec![(root, None)];
    let mut cookie: u64 = 0;

    for table_idx in 0..layout.len() {
        let mut next_frontier: Vec<(NodeId, Option<(u32, u32)>)> = Vec::new();
        let mut emitted_for: HashSet<NodeId> = HashSet::new();

        for (entry_root, meta) in std::mem::take(&mut frontier) {
            if !emitted_for.insert(entry_root) {
                continue;
            }
            let mut local: Vec<(Pattern, SlabOutcome)> = Vec::new();
            enumerate_slab(cache, entry_root, layout, table_idx, &mut Pattern::new(), &mut local)?;
            local.sort_by(|(pa, _), (pb, _)| table::rule_order(cache.order(), pa, pb));

            let n = local.len();
            for (i, (pattern, outcome)) in local.into_iter().enumerate() {
                let instruction = match outcome {
                    SlabOutcome::Terminal(set) => {
                        let action =
                            crate::table::action_set_to_rule_action(&mut groups, &set, options.openflow_adherence)?;
                        Instruction::Action(action)
                    }
                    SlabOutcome::Boundary(sub_root) => {
                        let meta_id = sub_root.as_u32();
                        next_frontier.push((sub_root, Some((table_idx as u32, meta_id))));
                        Instruction::GotoTable { table: (table_idx + 1) as u32, meta_id }
                    }
                };
                tables[table_idx].push(MultiTableRule {
                    meta,
                    pattern,
                    instruction,
                    priority: (n - i) as u32,
                    cookie,
                });
                cookie += 1;
            }
        }
        frontier = next_frontier;
    }

    debug!(
        tables = tables.len(),
        rules = tables.iter().map(Vec::len).sum::<usize>(),
        groups = groups.len(),
        "multi-table emission finished"
    );
    Ok(MultiTable { tables, groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_local;
    use crate::field::{FieldOrder, Value};
    use crate::policy::{Policy, Pred};

    fn opts() -> Options {
        Options::default()
    }

    #[test]
    fn s6_three_field_layout_yields_three_tables() {
        let cache = Cache::new(FieldOrder::default_order());
        let p = Policy::seq(
            Policy::seq(
                Policy::filter(Pred::test(Field::EthSrc, Value::Mac(1))),
                Policy::filter(Pred::test(Field::Vlan, Value::Const(1))),
            ),
            Policy::filter(Pred::test(Field::Location, Value::Loc(crate::field::Location::Physical(1)))),
        );
        let fdd = compile_local(&cache, &p, None, &opts()).unwrap();
        let layout: Layout = vec![vec![Field::EthSrc], vec![Field::Vlan], vec![Field::Location]];
        let mt = to_multitable(&cache, fdd, &layout, &opts()).unwrap();
        assert_eq!(mt.tables.len(), 3);
        assert!(mt.tables[0].iter().all(|r| matches!(r.instruction, Instruction::GotoTable { table: 1, .. })
            || matches!(r.instruction, Instruction::Action(RuleAction::Drop))));
    }

    #[test]
    fn field_outside_layout_is_rejected() {
        let cache = Cache::new(FieldOrder::default_order());
        let p = Policy::filter(Pred::test(Field::Vlan, Value::Const(1)));
        let fdd = compile_local(&cache, &p, None, &opts()).unwrap();
        let layout: Layout = vec![vec![Field::EthSrc]];
        assert!(matches!(
            to_multitable(&cache, fdd, &layout, &opts()),
            Err(TableError::FieldOutOfLayout(Field::Vlan))
        ));
    }
}
