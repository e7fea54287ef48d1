use std::collections::BTreeSet;

use bucket_mirror_core::error::Side;
use bucket_mirror_core::key::{Key, KeySet};
use bucket_mirror_core::reconcile::{reconcile, SyncMode};

fn keyset(keys: &[&str]) -> KeySet {
    keys.iter().map(|k| Key::parse(k).unwrap()).collect()
}

fn set(keys: &[&str]) -> BTreeSet<Key> {
    keys.iter().map(|k| Key::parse(k).unwrap()).collect()
}

fn all(keyset: &KeySet) -> BTreeSet<Key> {
    keyset.keys().cloned().collect()
}

fn samples() -> Vec<KeySet> {
    vec![
        keyset(&[]),
        keyset(&["A/1.mp3"]),
        keyset(&["A/1.mp3", "A/2.mp3"]),
        keyset(&["A/1.mp3", "B/old.mp3"]),
        keyset(&["a/1.mp3", "A/1.mp3", "Z/z.mp3", "m.txt"]),
        keyset(&["B/old.mp3", "C/x/y/z.m4a"]),
    ]
}

#[test]
fn push_mirror_scenario() {
    let local = keyset(&["A/1.mp3", "A/2.mp3"]);
    let remote = keyset(&["A/1.mp3", "B/old.mp3"]);
    assert_eq!(SyncMode::PushMirror.truth_side(), Side::Local);

    let plan = reconcile(&local, &remote);

    assert_eq!(plan.to_transfer, set(&["A/2.mp3"]));
    assert_eq!(plan.to_delete, set(&["B/old.mp3"]));
    assert_eq!(plan.unchanged, set(&["A/1.mp3"]));
}

#[test]
fn pull_mirror_scenario() {
    let local = keyset(&["A/1.mp3", "A/2.mp3"]);
    let remote = keyset(&["A/1.mp3", "B/old.mp3"]);
    assert_eq!(SyncMode::PullMirror.truth_side(), Side::Remote);

    let plan = reconcile(&remote, &local);

    assert_eq!(plan.to_transfer, set(&["B/old.mp3"]));
    assert_eq!(plan.to_delete, set(&["A/2.mp3"]));
    assert_eq!(plan.unchanged, set(&["A/1.mp3"]));
}

#[test]
fn plan_partitions_the_union_of_both_sides() {
    for truth in samples() {
        for target in samples() {
            let plan = reconcile(&truth, &target);

            let covered_truth: BTreeSet<Key> =
                plan.to_transfer.union(&plan.unchanged).cloned().collect();
            let covered_target: BTreeSet<Key> =
                plan.to_delete.union(&plan.unchanged).cloned().collect();
            assert_eq!(covered_truth, all(&truth));
            assert_eq!(covered_target, all(&target));
            assert!(plan.to_transfer.is_disjoint(&plan.to_delete));
            assert!(plan.to_transfer.is_disjoint(&plan.unchanged));
            assert!(plan.to_delete.is_disjoint(&plan.unchanged));
        }
    }
}

#[test]
fn converged_state_yields_empty_plan() {
    for sample in samples() {
        let plan = reconcile(&sample, &sample);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, all(&sample));
    }
}

#[test]
fn empty_truth_deletes_the_whole_target() {
    let target = keyset(&["A/1.mp3", "B/old.mp3"]);
    let plan = reconcile(&KeySet::new(), &target);

    assert!(plan.to_transfer.is_empty());
    assert_eq!(plan.to_delete, all(&target));
    assert!(plan.unchanged.is_empty());
}

#[test]
fn reconcile_is_deterministic() {
    let truth = keyset(&["x/1", "x/2", "y/3"]);
    let target = keyset(&["x/2", "z/9"]);
    assert_eq!(reconcile(&truth, &target), reconcile(&truth, &target));
}

#[test]
fn comparison_is_case_sensitive() {
    let plan = reconcile(&keyset(&["A/Song.mp3"]), &keyset(&["A/song.mp3"]));
    assert_eq!(plan.to_transfer, set(&["A/Song.mp3"]));
    assert_eq!(plan.to_delete, set(&["A/song.mp3"]));
    assert_eq!(plan.operation_count(), 2);
}
