//! Action algebra
//!
//! An [`Action`] is one simultaneous assignment to a packet: a map from
//! [`Field`](crate::field::Field) to [`Value`](crate::field::Value). An
//! [`ActionSet`] is an unordered set of actions, read as "emit one copy of the
//! packet per action" (multicast). Both types are pure values — composing
//! them never touches a [`Cache`](crate::cache::Cache) or a diagram.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::{Field, Modification, Value};

/// One simultaneous assignment to a packet.
///
/// Represented as an ordered map so that `Eq`/`Hash`/`Ord` are structural:
/// two actions are equal iff they assign the same fields to the same values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Action(BTreeMap<Field, Value>);

impl Action {
    /// The identity action: assigns nothing, packet passes through unchanged.
    #[must_use]
    pub fn id() -> Self {
        Self::default()
    }

    /// Build an action from a list of modifications. Later entries win on
    /// conflicting fields, matching [`Action::seq`]'s overwrite semantics.
    #[must_use]
    pub fn from_mods(mods: impl IntoIterator<Item = Modification>) -> Self {
        let mut map = BTreeMap::new();
        for m in mods {
            map.insert(m.field, m.value);
        }
        Self(map)
    }

    /// The value this action assigns to `field`, if any.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&Value> {
        self.0.get(&field)
    }

    /// True if this action assigns `field`.
    #[must_use]
    pub fn assigns(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    /// True if this is the identity action (assigns nothing).
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the (field, value) assignments in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.0.iter()
    }

    /// Sequential composition: `(a ; b)[f] = b[f]` if `b` assigns `f`, else `a[f]`.
    #[must_use]
    pub fn seq(a: &Action, b: &Action) -> Action {
        let mut out = a.0.clone();
        for (f, v) in &b.0 {
            out.insert(*f, v.clone());
        }
        Action(out)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("id");
        }
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field} := {value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({self})")
    }
}

/// An unordered set of [`Action`]s: "emit a copy of the packet per action".
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    /// `drop`: the empty action set — the packet is discarded.
    #[must_use]
    pub fn drop() -> Self {
        Self::default()
    }

    /// `id`: the singleton set containing the identity action — the packet
    /// passes through unmodified.
    #[must_use]
    pub fn id() -> Self {
        let mut set = BTreeSet::new();
        set.insert(Action::id());
        Self(set)
    }

    /// A singleton action set.
    #[must_use]
    pub fn single(action: Action) -> Self {
        let mut set = BTreeSet::new();
        set.insert(action);
        Self(set)
    }

    /// True if this is `drop` (no actions at all).
    #[must_use]
    pub fn is_drop(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this is exactly `{id}`.
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.0.len() == 1 && self.0.iter().next().is_some_and(Action::is_id)
    }

    /// Number of actions (multicast fan-out) in this set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    /// `par(S, T) = S ∪ T`.
    #[must_use]
    pub fn par(s: &ActionSet, t: &ActionSet) -> ActionSet {
        ActionSet(s.0.union(&t.0).cloned().collect())
    }

    /// `seqSet(a, T) = { seq(a, t) | t ∈ T }`.
    #[must_use]
    pub fn seq_set(a: &Action, t: &ActionSet) -> ActionSet {
        ActionSet(t.0.iter().map(|ta| Action::seq(a, ta)).collect())
    }

    /// `seqSetSet(S, T) = ⋃_{s ∈ S} seqSet(s, T)`.
    #[must_use]
    pub fn seq_set_set(s: &ActionSet, t: &ActionSet) -> ActionSet {
        let mut out = BTreeSet::new();
        for a in &s.0 {
            out.extend(Self::seq_set(a, t).0);
        }
        ActionSet(out)
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("drop");
        }
        f.write_str("{")?;
        for (i, a) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{a}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionSet({self})")
    }
}
