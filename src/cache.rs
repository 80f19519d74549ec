//! Hash-consed node table and per-operator memoization
//!
//! Every [`crate::fdd`] node lives in a [`Cache`]: a node table mapping the
//! structural triple `(Test, true_child, false_child)` (or a leaf
//! `ActionSet`) to a stable [`NodeId`] handle, plus one memo table per
//! operator keyed by `(op, args...)`. Two nodes are the same diagram iff
//! they carry the same handle — no structural comparison is ever exposed to
//! callers outside this module.
//!
//! A process-wide default `Cache` is reachable through [`global`] for
//! callers who don't care about isolation; callers who do (parallel,
//! independent compilations) construct their own with [`Cache::new`].

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::action::ActionSet;
use crate::field::{Field, FieldOrder, Test, Value};

/// A hash-consed FDD node handle. Two handles are equal iff they denote the
/// same diagram (extensional equality = handle equality, §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// The handle's raw index, stable for the lifetime of its `Cache`. Used
    /// as the multi-table `metaId` and in textual/DOT rendering.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum NodeRepr {
    Leaf(ActionSet),
    Branch { test: Test, t: NodeId, f: NodeId },
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum MemoKey {
    Union(NodeId, NodeId),
    Seq(NodeId, NodeId),
    Negate(NodeId),
    Star(NodeId),
    Restrict(Field, Value, NodeId),
    PushAction(crate::action::Action, NodeId),
}

struct CacheInner {
    node_table: HashMap<NodeRepr, NodeId>,
    arena: Vec<NodeRepr>,
    memo: HashMap<MemoKey, NodeId>,
}

impl CacheInner {
    fn new() -> Self {
        Self { node_table: HashMap::new(), arena: Vec::new(), memo: HashMap::new() }
    }

    fn intern(&mut self, repr: NodeRepr) -> NodeId {
        if let Some(id) = self.node_table.get(&repr) {
            return *id;
        }
        let id = NodeId(self.arena.len() as u32);
        self.arena.push(repr.clone());
        self.node_table.insert(repr, id);
        id
    }
}

/// The hash-consed node table and memo tables for one compilation session
/// (or the process-wide default, see [`global`]).
///
/// All diagrams combined with one another must come from the *same*
/// `Cache`: mixing handles from two different `Cache`s is a logic error (an
/// apparent handle equality would be coincidental, not meaningful).
pub struct Cache {
    order: FieldOrder,
    inner: RwLock<CacheInner>,
    drop_id: NodeId,
    id_id: NodeId,
}

impl Cache {
    /// Build a fresh, empty cache under the given field order.
    #[must_use]
    pub fn new(order: FieldOrder) -> Self {
        let mut inner = CacheInner::new();
        let drop_id = inner.intern(NodeRepr::Leaf(ActionSet::drop()));
        let id_id = inner.intern(NodeRepr::Leaf(ActionSet::id()));
        Self { order, inner: RwLock::new(inner), drop_id, id_id }
    }

    /// The field order this cache's diagrams are built against.
    #[must_use]
    pub fn order(&self) -> &FieldOrder {
        &self.order
    }

    /// The `drop` leaf handle (empty action set).
    #[must_use]
    pub fn drop_id(&self) -> NodeId {
        self.drop_id
    }

    /// The `id` leaf handle (singleton identity action set).
    #[must_use]
    pub fn id_id(&self) -> NodeId {
        self.id_id
    }

    pub(crate) fn repr(&self, id: NodeId) -> NodeRepr {
        self.inner.read().arena[id.0 as usize].clone()
    }

    /// The root test of `id`, or `None` if it is a leaf.
    #[must_use]
    pub fn top(&self, id: NodeId) -> Option<Test> {
        match self.repr(id) {
            NodeRepr::Leaf(_) => None,
            NodeRepr::Branch { test, .. } => Some(test),
        }
    }

    /// `(true_child, false_child)` of a branch node, or `None` for a leaf.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        match self.repr(id) {
            NodeRepr::Leaf(_) => None,
            NodeRepr::Branch { t, f, .. } => Some((t, f)),
        }
    }

    /// The leaf's action set, or `None` if `id` is a branch.
    #[must_use]
    pub fn leaf(&self, id: NodeId) -> Option<ActionSet> {
        match self.repr(id) {
            NodeRepr::Leaf(s) => Some(s),
            NodeRepr::Branch { .. } => None,
        }
    }

    /// Intern a leaf node.
    pub fn mk_leaf(&self, set: ActionSet) -> NodeId {
        self.inner.write().intern(NodeRepr::Leaf(set))
    }

    /// `mk(test, t, f)` per §4.2: reduces if `t == f`, otherwise interns.
    ///
    /// Debug builds assert the ordering invariant (both children's root
    /// tests strictly greater than `test`); callers that might violate it
    /// must cofactor-lift first (see [`crate::fdd::apply`]).
    pub fn mk(&self, test: Test, t: NodeId, f: NodeId) -> NodeId {
        if t == f {
            return t;
        }
        debug_assert!(
            self.top(t).map_or(true, |tt| self.order.compare(test.field, tt.field)
                == std::cmp::Ordering::Less),
            "mk: true child's field must be strictly greater than the new test's field"
        );
        debug_assert!(
            self.top(f).map_or(true, |tf| self.order.compare(test.field, tf.field)
                == std::cmp::Ordering::Less),
            "mk: false child's field must be strictly greater than the new test's field"
        );
        self.inner.write().intern(NodeRepr::Branch { test, t, f })
    }

    pub(crate) fn memo_get(&self, key: &MemoKey) -> Option<NodeId> {
        self.inner.read().memo.get(key).copied()
    }

    pub(crate) fn memo_put(&self, key: MemoKey, value: NodeId) {
        self.inner.write().memo.insert(key, value);
    }

    /// Number of distinct reachable nodes from `root` (sharing counted once).
    #[must_use]
    pub fn size(&self, root: NodeId) -> usize {
        let mut seen = hashbrown::HashSet::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            if let Some((t, f)) = self.children(n) {
                stack.push(t);
                stack.push(f);
            }
        }
        seen.len()
    }

    /// `(reachable nodes, nodes if expanded without sharing)` — the second
    /// count can be exponentially larger for heavily shared diagrams.
    #[must_use]
    pub fn compression_ratio(&self, root: NodeId) -> (usize, usize) {
        fn expanded_count(cache: &Cache, n: NodeId) -> usize {
            match cache.children(n) {
                None => 1,
                Some((t, f)) => 1 + expanded_count(cache, t) + expanded_count(cache, f),
            }
        }
        (self.size(root), expanded_count(self, root))
    }

    /// Apply a [`crate::options::CachePrepare`] retention policy before a
    /// compile. `Keep` is a no-op; `Empty` clears everything (constants are
    /// re-interned lazily); `Preserve` is not yet supported and currently
    /// behaves like `Keep` — the full mark-and-sweep from an explicit root
    /// set is tracked as future work.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        *inner = CacheInner::new();
        inner.intern(NodeRepr::Leaf(ActionSet::drop()));
        inner.intern(NodeRepr::Leaf(ActionSet::id()));
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(FieldOrder::default_order())
    }
}

static GLOBAL: Lazy<Cache> = Lazy::new(Cache::default);

/// The process-wide default cache, built against the default field order.
#[must_use]
pub fn global() -> &'static Cache {
    &GLOBAL
}
