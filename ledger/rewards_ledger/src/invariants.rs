#![allow(dead_code)]

use crate::types::{Account, Transaction, TxKind};

/// INV-1: balance equals the signed sum of every logged entry.
pub fn assert_balance_conserved(account: &Account, log: &[Transaction]) {
    let sum: i64 = log.iter().map(Transaction::delta).sum();
    assert_eq!(
        account.balance, sum,
        "INV-1 violated: account {} balance {} != log sum {}",
        account.id, account.balance, sum
    );
}

/// INV-2: balance is never negative.
pub fn assert_balance_non_negative(account: &Account) {
    assert!(
        account.balance >= 0,
        "INV-2 violated: account {} has negative balance {}",
        account.id,
        account.balance
    );
}

/// INV-3: total_earned equals the sum of all credits.
pub fn assert_total_earned_matches_credits(account: &Account, log: &[Transaction]) {
    let credits: i64 = log
        .iter()
        .filter(|tx| tx.kind == TxKind::Credit)
        .map(|tx| tx.amount)
        .sum();
    assert_eq!(
        account.total_earned, credits,
        "INV-3 violated: account {} total_earned {} != credits {}",
        account.id, account.total_earned, credits
    );
}

/// INV-4: no zero or negative entries are ever logged.
pub fn assert_entries_positive(log: &[Transaction]) {
    for tx in log {
        assert!(
            tx.amount > 0,
            "INV-4 violated: logged {:?} entry with amount {}",
            tx.kind,
            tx.amount
        );
    }
}

/// INV-5: daily counters stay within their limits.
pub fn assert_quotas_within_limits(account: &Account) {
    let q = &account.quotas;
    for (name, quota) in [("spin", q.spin), ("math", q.math), ("video", q.video)] {
        assert!(
            quota.count <= quota.limit,
            "INV-5 violated: {name} count {} exceeds limit {} on {}",
            quota.count,
            quota.limit,
            account.id
        );
    }
}

/// INV-6: lifetime counters never decrease.
pub fn assert_lifetime_monotonic(before: &Account, after: &Account) {
    assert!(
        after.total_earned >= before.total_earned,
        "INV-6 violated: total_earned decreased from {} to {}",
        before.total_earned,
        after.total_earned
    );
    assert!(
        after.lifetime_video_count >= before.lifetime_video_count,
        "INV-6 violated: lifetime_video_count decreased from {} to {}",
        before.lifetime_video_count,
        after.lifetime_video_count
    );
}

/// INV-7: referral linkage is immutable once set.
pub fn assert_referral_linkage_stable(before: &Account, after: &Account) {
    assert_eq!(
        before.referral_code, after.referral_code,
        "INV-7 violated: referral code changed"
    );
    assert_eq!(
        before.referred_by, after.referred_by,
        "INV-7 violated: referred_by changed"
    );
    assert!(
        !before.referral_bonus_paid || after.referral_bonus_paid,
        "INV-7 violated: referral_bonus_paid reverted to false"
    );
}

/// Run all stateless account invariants.
pub fn assert_all_account_invariants(account: &Account, log: &[Transaction]) {
    assert_balance_conserved(account, log);
    assert_balance_non_negative(account);
    assert_total_earned_matches_credits(account, log);
    assert_entries_positive(log);
    assert_quotas_within_limits(account);
}
