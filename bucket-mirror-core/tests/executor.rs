use bucket_mirror_core::contract::{MockObjectStore, ObjectStore};
use bucket_mirror_core::error::{Side, StoreError};
use bucket_mirror_core::executor::{
    content_type_for, ExecutionReport, Executor, ExecutorConfig, ItemOutcome, OperationKind,
};
use bucket_mirror_core::key::{Key, KeySet};
use bucket_mirror_core::reconcile::{reconcile, Plan};
use bucket_mirror_core::retry::RetryPolicy;
use bucket_mirror_core::testing::{Failure, MemoryStore};
use tokio_util::sync::CancellationToken;

fn executor(concurrency: usize) -> Executor {
    Executor::new(ExecutorConfig {
        concurrency,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    })
}

fn key(raw: &str) -> Key {
    Key::parse(raw).unwrap()
}

async fn plan_for(truth: &MemoryStore, target: &MemoryStore) -> (Plan, KeySet) {
    let truth_keys = truth.list().await.unwrap();
    let target_keys = target.list().await.unwrap();
    (reconcile(&truth_keys, &target_keys), truth_keys)
}

async fn run(exec: &Executor, truth: &MemoryStore, target: &MemoryStore) -> ExecutionReport {
    let (plan, truth_keys) = plan_for(truth, target).await;
    exec.execute(&plan, &truth_keys, truth, target, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn applies_transfers_and_deletes() {
    let local = MemoryStore::with_keys(Side::Local, &["A/1.mp3", "A/2.mp3"]);
    let remote = MemoryStore::with_keys(Side::Remote, &["A/1.mp3", "B/old.mp3"]);

    let report = run(&executor(4), &local, &remote).await;

    assert!(report.is_success());
    assert_eq!(report.transferred(), 1);
    assert_eq!(report.deleted(), 1);
    assert_eq!(remote.keys(), vec!["A/1.mp3", "A/2.mp3"]);
    assert_eq!(remote.object("A/2.mp3").unwrap().bytes, b"A/2.mp3".to_vec());
    assert!(!report.outcomes.contains_key(&key("A/1.mp3")));
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let local = MemoryStore::with_keys(Side::Local, &["a", "b", "c", "d"]);
    let remote = MemoryStore::with_keys(Side::Remote, &["x", "y"]);
    remote.fail_writes("b", Failure::Permanent);
    remote.fail_deletes("x", Failure::Permanent);

    let report = run(&executor(2), &local, &remote).await;

    assert!(!report.is_success());
    assert_eq!(report.transferred(), 3);
    assert_eq!(report.deleted(), 1);
    let failures: Vec<(String, OperationKind)> = report
        .failures()
        .into_iter()
        .map(|(k, kind, _)| (k.to_string(), kind))
        .collect();
    assert_eq!(
        failures,
        vec![
            ("b".to_string(), OperationKind::Transfer),
            ("x".to_string(), OperationKind::Delete),
        ]
    );
    assert_eq!(remote.keys(), vec!["a", "c", "d", "x"]);
}

#[tokio::test]
async fn transient_failures_within_budget_succeed() {
    let local = MemoryStore::with_keys(Side::Local, &["a"]);
    let remote = MemoryStore::new(Side::Remote);
    remote.fail_writes("a", Failure::TransientTimes(2));

    let report = run(&executor(1), &local, &remote).await;

    assert!(report.is_success());
    assert_eq!(report.outcomes[&key("a")].attempts, 3);
    assert_eq!(remote.keys(), vec!["a"]);
}

#[tokio::test]
async fn exhausted_budget_marks_the_item_failed() {
    let local = MemoryStore::with_keys(Side::Local, &["a"]);
    let remote = MemoryStore::new(Side::Remote);
    remote.fail_writes("a", Failure::TransientTimes(10));

    let report = run(&executor(1), &local, &remote).await;

    let item = &report.outcomes[&key("a")];
    assert_eq!(item.attempts, 3);
    assert!(matches!(item.outcome, ItemOutcome::Failed(_)));
    assert_eq!(remote.calls().len(), 3);
    assert!(remote.keys().is_empty());
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let local = MemoryStore::with_keys(Side::Local, &["a"]);
    let local_keys = local.list().await.unwrap();
    let mut target = MockObjectStore::new();
    target
        .expect_write()
        .times(1)
        .returning(|_, _, _| Err(StoreError::Permanent("AccessDenied".into())));

    let plan = reconcile(&local_keys, &KeySet::new());
    let report = executor(1)
        .execute(&plan, &local_keys, &local, &target, &CancellationToken::new())
        .await;

    assert_eq!(report.outcomes[&key("a")].attempts, 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn cancelled_run_starts_nothing() {
    let local = MemoryStore::with_keys(Side::Local, &["a", "b"]);
    let remote = MemoryStore::with_keys(Side::Remote, &["z"]);
    let (plan, truth_keys) = plan_for(&local, &remote).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = executor(4)
        .execute(&plan, &truth_keys, &local, &remote, &cancel)
        .await;

    assert!(report.outcomes.is_empty());
    assert_eq!(report.not_attempted, vec![key("a"), key("b"), key("z")]);
    assert!(!report.is_success());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn rerun_after_partial_failure_retries_only_the_remainder() {
    let local = MemoryStore::with_keys(Side::Local, &["A/1.mp3", "A/2.mp3"]);
    let remote = MemoryStore::new(Side::Remote);
    remote.fail_writes("A/2.mp3", Failure::Permanent);
    let exec = executor(2);

    let first = run(&exec, &local, &remote).await;
    assert_eq!(first.transferred(), 1);
    assert_eq!(first.failures().len(), 1);

    remote.clear_failures();
    let before = remote.calls().len();
    let (plan, _) = plan_for(&local, &remote).await;
    assert_eq!(plan.to_transfer.iter().cloned().collect::<Vec<_>>(), vec![key("A/2.mp3")]);

    let second = run(&exec, &local, &remote).await;
    assert!(second.is_success());
    assert_eq!(remote.calls()[before..], ["write A/2.mp3".to_string()]);

    let (converged, _) = plan_for(&local, &remote).await;
    assert!(converged.is_empty());
}

#[tokio::test]
async fn transfers_carry_a_content_type() {
    let local = MemoryStore::new(Side::Local);
    local.put("A/song.mp3", b"not really audio");
    let remote = MemoryStore::new(Side::Remote);

    run(&executor(1), &local, &remote).await;

    let stored = remote.object("A/song.mp3").unwrap();
    assert_eq!(stored.options.content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(stored.options.cache_control, None);
}

#[test]
fn content_type_prefers_sniffed_bytes() {
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    assert_eq!(content_type_for(&key("cover.mp3"), &png), "image/png");
    assert_eq!(content_type_for(&key("notes.TXT"), b"hello"), "text/plain");
    assert_eq!(
        content_type_for(&key("blob"), b"hello"),
        "application/octet-stream"
    );
}
