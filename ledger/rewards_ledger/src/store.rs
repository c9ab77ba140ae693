//! # Storage
//!
//! The [`AccountStore`] trait is the only way the ledger touches persistence.
//! Every operation is a single-record atomic unit; nothing here spans two
//! accounts except [`AccountStore::credit_referral`], which writes only the
//! referrer plus a payout marker keyed by the referee.
//!
//! | Operation              | Atomic unit                                         |
//! |------------------------|-----------------------------------------------------|
//! | `insert`               | new account + its initial log entries               |
//! | `commit`               | all mutable fields + appended entries, iff version matches |
//! | `debit_if_sufficient`  | `balance -= amount` iff `balance >= amount`, + debit entry |
//! | `credit_referral`      | payout marker + referrer credit, once per referee   |
//! | `mark_referral_paid`   | referee flag, idempotent                            |
//!
//! Transaction ids are assigned by the store at append time and increase
//! with append order.
//!
//! Every write that touches an account bumps its version, so a `commit`
//! holding an older snapshot reports [`CommitOutcome::Conflict`] instead of
//! overwriting a balance it never saw.

use std::future::Future;

use crate::errors::Result;
use crate::types::{Account, Transaction};

/// Lookup key for [`AccountStore::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(&'a str),
    Phone(&'a str),
    Email(&'a str),
    Device(&'a str),
    ReferralCode(&'a str),
}

/// Unique account attribute that collided on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Phone,
    Email,
    Device,
    ReferralCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate(UniqueField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored version moved on, or the account vanished.
    Conflict,
}

pub trait AccountStore: Send + Sync {
    fn find(&self, by: Lookup<'_>) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn insert(
        &self,
        account: &Account,
        entries: &[Transaction],
    ) -> impl Future<Output = Result<InsertOutcome>> + Send;

    /// Persist every mutable field of `account` and append `entries`,
    /// conditioned on the stored version equalling `account.version`.
    fn commit(
        &self,
        account: &Account,
        entries: &[Transaction],
    ) -> impl Future<Output = Result<CommitOutcome>> + Send;

    /// Returns the new balance, or `None` if no record matched (missing
    /// account or insufficient balance).
    fn debit_if_sufficient(
        &self,
        id: &str,
        amount: i64,
        entry: &Transaction,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Credit `referrer_id` with `entry.amount` unless a payout for
    /// `referee_id` already exists. Returns whether the credit was applied.
    fn credit_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        entry: &Transaction,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn mark_referral_paid(&self, referee_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Full log in chronological order.
    fn transactions(&self, id: &str) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// Referees past `threshold` lifetime videos, unflagged, with no payout
    /// marker yet: their referrer was never credited.
    fn unpaid_referrals(
        &self,
        threshold: u32,
    ) -> impl Future<Output = Result<Vec<Account>>> + Send;

    /// Set the paid flag on every referee that already has a payout marker.
    /// Returns the number of accounts repaired.
    fn reconcile_referral_flags(&self) -> impl Future<Output = Result<u64>> + Send;
}
