//! Reward Ledger: the only path that increases a balance.
//!
//! A credit mutates `balance` and `total_earned` on the in-memory account and
//! returns the log entry that must be appended in the same store write.

use chrono::{DateTime, Utc};

use crate::types::{Account, Transaction};

pub const WELCOME_BONUS: i64 = 500;
pub const WELCOME_DESCRIPTION: &str = "Welcome Bonus";

/// Apply a credit of `amount`. Zero-amount outcomes change nothing and
/// produce no entry.
pub fn credit(
    account: &mut Account,
    amount: i64,
    description: &str,
    at: DateTime<Utc>,
) -> Option<Transaction> {
    if amount <= 0 {
        return None;
    }
    account.balance += amount;
    account.total_earned += amount;
    Some(Transaction::credit(amount, description, at))
}
