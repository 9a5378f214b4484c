mod common;

use std::sync::Arc;

use carepay_common::Amount;
use carepay_ledger::core::ledger::transaction_engine::fold_balance;
use carepay_ledger::{Ledger, LedgerError};
use common::{holder, naira};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Credit(i64),
    Debit(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..500_000).prop_map(Op::Credit),
        (1i64..500_000).prop_map(Op::Debit),
    ]
}

fn open_ledger() -> (Ledger, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(dir.path().to_str().unwrap()).unwrap();
    (ledger, dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_sequential_balance_is_fold_of_applied_ops(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = open_ledger();
            let engine = ledger.engine.clone();
            engine.open_account("p-1", holder("p-1"), "NGN").await.unwrap();

            let mut expected = 0i64;
            for op in &ops {
                match op {
                    Op::Credit(kobo) => {
                        engine.credit("p-1", Amount::from_minor(*kobo), "credit", None).await.unwrap();
                        expected += kobo;
                    }
                    Op::Debit(kobo) => match engine.debit("p-1", Amount::from_minor(*kobo), "debit", None).await {
                        Ok(_) => expected -= kobo,
                        Err(LedgerError::InsufficientFunds { .. }) => assert!(*kobo > expected),
                        Err(e) => panic!("unexpected error: {e}"),
                    },
                }
                assert!(expected >= 0);
            }

            let account = engine.account("p-1").await.unwrap();
            assert_eq!(account.balance, Amount::from_minor(expected));
            let entries = ledger.store.entries_for("p-1").unwrap();
            assert_eq!(fold_balance(&entries).unwrap(), account.balance);
        });
    }

    #[test]
    fn prop_concurrent_ops_never_go_negative(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(4).enable_all().build().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = open_ledger();
            let engine = ledger.engine.clone();
            engine.open_account("p-1", holder("p-1"), "NGN").await.unwrap();

            let tasks: Vec<_> = ops
                .iter()
                .cloned()
                .map(|op| {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        match op {
                            Op::Credit(kobo) => engine.credit("p-1", Amount::from_minor(kobo), "credit", None).await,
                            Op::Debit(kobo) => engine.debit("p-1", Amount::from_minor(kobo), "debit", None).await,
                        }
                    })
                })
                .collect();

            let mut applied = 0i64;
            for (op, task) in ops.iter().zip(tasks) {
                match (op, task.await.unwrap()) {
                    (Op::Credit(kobo), Ok(_)) => applied += kobo,
                    (Op::Debit(kobo), Ok(_)) => applied -= kobo,
                    (Op::Debit(_), Err(LedgerError::InsufficientFunds { .. })) => {}
                    (_, Err(e)) => panic!("unexpected error: {e}"),
                }
            }

            let account = engine.account("p-1").await.unwrap();
            assert!(!account.balance.is_negative());
            assert_eq!(account.balance, Amount::from_minor(applied));
            let entries = ledger.store.entries_for("p-1").unwrap();
            assert_eq!(fold_balance(&entries).unwrap(), account.balance);
            for entry in &entries {
                assert!(!entry.balance_after.unwrap().is_negative());
            }
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_credits_both_apply() {
    let (ledger, _dir) = open_ledger();
    let engine = ledger.engine.clone();
    engine.open_account("p-1", holder("p-1"), "NGN").await.unwrap();
    engine.credit("p-1", naira("10"), "opening", Some("OPEN")).await.unwrap();

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.credit("p-1", naira("100"), "a", Some("C-100")).await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.credit("p-1", naira("50"), "b", Some("C-50")).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(engine.account("p-1").await.unwrap().balance, naira("160.00"));
    assert_eq!(ledger.store.entries_for("p-1").unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_of_one_reference_apply_once() {
    let (ledger, _dir) = open_ledger();
    let engine = ledger.engine.clone();
    engine.open_account("p-1", holder("p-1"), "NGN").await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.credit("p-1", naira("100"), "x", Some("R1")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.account("p-1").await.unwrap().balance, naira("100.00"));
    assert_eq!(ledger.store.entries_for("p-1").unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_complete_without_deadlock() {
    let (ledger, _dir) = open_ledger();
    let engine = ledger.engine.clone();
    for id in ["p-a", "p-b"] {
        engine.open_account(id, holder(id), "NGN").await.unwrap();
        engine.credit(id, naira("1000"), "seed", None).await.unwrap();
    }

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { ("p-a", "p-b") } else { ("p-b", "p-a") };
                engine.transfer(from, to, naira("1"), "shuffle").await
            })
        })
        .collect();

    let all = async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(10), all).await.unwrap();

    let a = engine.account("p-a").await.unwrap().balance;
    let b = engine.account("p-b").await.unwrap().balance;
    assert_eq!(a.checked_add(b).unwrap(), naira("2000"));
}
