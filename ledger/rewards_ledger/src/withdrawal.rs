//! Withdrawal Guard: the only path that decreases a balance.
//!
//! The decrement and the pending debit entry are a single conditional store
//! write, so concurrent withdrawals against one account can never jointly
//! overdraw it.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::{LedgerError, Result};
use crate::store::{AccountStore, Lookup};
use crate::types::{Transaction, WithdrawalRequest};

pub const MIN_WITHDRAWAL: i64 = 5000;

/// Reject malformed requests before touching the store.
pub fn validate(req: &WithdrawalRequest) -> Result<()> {
    if req.amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if req.amount < MIN_WITHDRAWAL {
        return Err(LedgerError::BelowMinimumWithdrawal(MIN_WITHDRAWAL));
    }
    if req.method.trim().is_empty() {
        return Err(LedgerError::MissingField("method"));
    }
    if req.account.trim().is_empty() {
        return Err(LedgerError::MissingField("account"));
    }
    Ok(())
}

/// Debit `req.amount` from `account_id`. Returns the new balance.
pub async fn withdraw<S: AccountStore>(
    store: &S,
    account_id: &str,
    req: &WithdrawalRequest,
    now: DateTime<Utc>,
) -> Result<i64> {
    if let Err(e) = validate(req) {
        debug!("Withdrawal of {} rejected for {account_id}: {e}", req.amount);
        return Err(e);
    }

    let entry = Transaction::withdrawal(req.amount, req.method.trim(), req.account.trim(), now);
    match store.debit_if_sufficient(account_id, req.amount, &entry).await? {
        Some(balance) => {
            info!("Withdrawal of {} queued for {account_id}; balance now {balance}", req.amount);
            Ok(balance)
        }
        None => match store.find(Lookup::Id(account_id)).await? {
            None => Err(LedgerError::AccountMissing),
            Some(account) => {
                warn!(
                    "Withdrawal of {} blocked for {account_id}: balance {}",
                    req.amount, account.balance
                );
                Err(LedgerError::InsufficientFunds)
            }
        },
    }
}
