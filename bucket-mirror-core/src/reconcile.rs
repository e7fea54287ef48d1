use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Side;
use crate::key::{Key, KeySet};

/// Which side is authoritative for a run. There is never a bidirectional merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Local is truth; the bucket converges to the directory.
    PushMirror,
    /// The bucket is truth; the directory converges to the bucket.
    PullMirror,
}

impl SyncMode {
    pub fn truth_side(self) -> Side {
        match self {
            SyncMode::PushMirror => Side::Local,
            SyncMode::PullMirror => Side::Remote,
        }
    }

    pub fn target_side(self) -> Side {
        match self {
            SyncMode::PushMirror => Side::Remote,
            SyncMode::PullMirror => Side::Local,
        }
    }
}

/// Partition of `truth ∪ target` into three disjoint sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// In truth, absent from target.
    pub to_transfer: BTreeSet<Key>,
    /// In target, absent from truth.
    pub to_delete: BTreeSet<Key>,
    /// Present on both sides; left alone.
    pub unchanged: BTreeSet<Key>,
}

impl Plan {
    /// No side effects needed: the target has converged.
    pub fn is_empty(&self) -> bool {
        self.to_transfer.is_empty() && self.to_delete.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.to_transfer.len() + self.to_delete.len()
    }
}

/// Compare two snapshots by key existence only.
///
/// Pure and deterministic. An empty `truth` yields `to_delete == target`;
/// callers decide whether that is acceptable.
pub fn reconcile(truth: &KeySet, target: &KeySet) -> Plan {
    let mut plan = Plan::default();
    let mut truth_keys = truth.keys().peekable();
    let mut target_keys = target.keys().peekable();

    // Both iterators are sorted, so one merge walk classifies every key.
    loop {
        match (truth_keys.peek(), target_keys.peek()) {
            (Some(t), Some(x)) => match t.cmp(x) {
                Ordering::Less => {
                    plan.to_transfer.insert((*t).clone());
                    truth_keys.next();
                }
                Ordering::Greater => {
                    plan.to_delete.insert((*x).clone());
                    target_keys.next();
                }
                Ordering::Equal => {
                    plan.unchanged.insert((*t).clone());
                    truth_keys.next();
                    target_keys.next();
                }
            },
            (Some(t), None) => {
                plan.to_transfer.insert((*t).clone());
                truth_keys.next();
            }
            (None, Some(x)) => {
                plan.to_delete.insert((*x).clone());
                target_keys.next();
            }
            (None, None) => break,
        }
    }
    plan
}
