//! Shared group table
//!
//! OpenFlow group tables hold the bucket lists a flow rule's action can
//! reference by id — used here whenever a leaf's [`ActionSet`] has more than
//! one action (multicast fan-out) or contains a `FastFail` location (§4.5).
//! One [`GroupTable`] is shared across every table produced for a switch
//! (single- or multi-table), so that two rules needing the identical bucket
//! list reuse the same [`GroupId`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// A group table entry id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct GroupId(u32);

impl GroupId {
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// A shared table of action-bucket lists, deduplicated by content so that
/// structurally identical bucket lists collapse to one group id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupTable {
    buckets: BTreeMap<GroupId, Vec<Action>>,
    #[serde(skip)]
    by_content: hashbrown::HashMap<Vec<Action>, GroupId>,
    next_id: u32,
}

impl GroupTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or reuse) a bucket list, one bucket per action, and return
    /// its group id.
    pub fn intern(&mut self, actions: Vec<Action>) -> GroupId {
        if let Some(id) = self.by_content.get(&actions) {
            return *id;
        }
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.buckets.insert(id, actions.clone());
        self.by_content.insert(actions, id);
        id
    }

    #[must_use]
    pub fn buckets(&self, id: GroupId) -> Option<&[Action]> {
        self.buckets.get(&id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupId, &Vec<Action>)> {
        self.buckets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
