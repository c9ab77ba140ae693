use std::sync::Arc;

use crate::invariants::{assert_all_account_invariants, assert_balance_non_negative};
use crate::testutils::{new_account, InMemoryStore, ManualClock, PlainHasher};
use crate::{Account, Ledger, LedgerError, TxKind, TxStatus, WithdrawalRequest};

type TestLedger = Ledger<InMemoryStore, ManualClock, PlainHasher>;

fn setup() -> TestLedger {
    Ledger::new(InMemoryStore::new(), ManualClock::on(2026, 3, 10), PlainHasher)
}

/// Registered account topped up to `balance`.
async fn funded(ledger: &TestLedger, tag: &str, balance: i64) -> Account {
    let account = ledger.register(&new_account(tag)).await.unwrap();
    ledger.store().grant(&account.id, balance - account.balance);
    ledger.store().get(&account.id).unwrap()
}

fn request(amount: i64) -> WithdrawalRequest {
    WithdrawalRequest {
        amount,
        method: "bkash".into(),
        account: "01711111111".into(),
    }
}

#[tokio::test]
async fn test_withdrawal_debits_and_logs_pending_entry() {
    let ledger = setup();
    let account = funded(&ledger, "a1", 6000).await;

    let balance = ledger.withdraw(&account.id, &request(5000)).await.unwrap();
    assert_eq!(balance, 1000);

    let stored = ledger.store().get(&account.id).unwrap();
    assert_eq!(stored.balance, 1000);
    assert_eq!(stored.total_earned, 6000);

    let log = ledger.store().log(&account.id);
    let last = log.last().unwrap();
    assert_eq!(last.kind, TxKind::Debit);
    assert_eq!(last.amount, 5000);
    assert_eq!(last.status, TxStatus::Pending);
    assert_eq!(last.description, "Withdraw to bkash (01711111111)");
    assert_eq!(last.account_number.as_deref(), Some("01711111111"));
    assert_all_account_invariants(&stored, &log);
}

#[tokio::test]
async fn test_withdrawal_amount_validation() {
    let ledger = setup();
    let account = funded(&ledger, "a1", 10_000).await;

    assert!(matches!(
        ledger.withdraw(&account.id, &request(0)).await,
        Err(LedgerError::InvalidAmount)
    ));
    let err = ledger.withdraw(&account.id, &request(4999)).await.unwrap_err();
    assert!(matches!(err, LedgerError::BelowMinimumWithdrawal(5000)));
    assert_eq!(err.to_string(), "Minimum withdraw is 5000");

    assert_eq!(ledger.store().get(&account.id).unwrap().balance, 10_000);
}

#[tokio::test]
async fn test_insufficient_funds_is_validation_not_missing() {
    let ledger = setup();
    let account = ledger.register(&new_account("a1")).await.unwrap();

    let err = ledger.withdraw(&account.id, &request(5000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds));
    assert_eq!(err.kind(), crate::ErrorKind::Validation);
    assert_eq!(ledger.store().get(&account.id).unwrap().balance, 500);
    assert_eq!(ledger.store().log(&account.id).len(), 1);
}

#[tokio::test]
async fn test_withdrawal_on_missing_account() {
    let ledger = setup();
    let err = ledger.withdraw("ghost", &request(5000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountMissing));
    assert_eq!(err.kind(), crate::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_two_racing_withdrawals_only_one_is_funded() {
    let ledger = setup();
    let account = funded(&ledger, "a1", 6000).await;

    let (req_a, req_b) = (request(5000), request(5000));
    let (a, b) = tokio::join!(
        ledger.withdraw(&account.id, &req_a),
        ledger.withdraw(&account.id, &req_b),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(LedgerError::InsufficientFunds))));

    let stored = ledger.store().get(&account.id).unwrap();
    assert_eq!(stored.balance, 1000);
    let debits = ledger
        .store()
        .log(&account.id)
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Debit)
        .count();
    assert_eq!(debits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_withdrawals_never_overdraw() {
    let ledger = Arc::new(setup());
    let account = funded(&ledger, "a1", 23_000).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let id = account.id.clone();
            tokio::spawn(async move { ledger.withdraw(&id, &request(5000)).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            granted += 5000;
        }
    }

    assert_eq!(granted, 20_000);
    let stored = ledger.store().get(&account.id).unwrap();
    assert_eq!(stored.balance, 3000);
    assert_balance_non_negative(&stored);
    assert_all_account_invariants(&stored, &ledger.store().log(&account.id));
}

#[tokio::test]
async fn test_earning_after_withdrawal_keeps_ledger_consistent() {
    let ledger = setup();
    let account = funded(&ledger, "a1", 5000).await;
    ledger.withdraw(&account.id, &request(5000)).await.unwrap();

    let r = ledger.complete_task(&account.id, "checkin", None).await.unwrap();
    assert_eq!(r.balance, 50);

    let stored = ledger.store().get(&account.id).unwrap();
    assert_eq!(stored.total_earned, 5050);
    assert_all_account_invariants(&stored, &ledger.store().log(&account.id));
}
