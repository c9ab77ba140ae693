//! # Rewards Ledger
//!
//! Account ledger and task-gating engine for the points-based rewards
//! service. The [`Ledger`] facade exposes one entry point per user-facing
//! operation:
//!
//! | Phase        | Entry Point(s)                        |
//! |--------------|---------------------------------------|
//! | Onboarding   | [`Ledger::register`], [`Ledger::login`] |
//! | Earning      | [`Ledger::complete_task`], [`Ledger::refill_limit`] |
//! | Redemption   | [`Ledger::withdraw`]                  |
//! | Queries      | [`Ledger::profile`]                   |
//! | Maintenance  | [`Ledger::reconcile_referrals`]       |
//!
//! ## Architecture
//!
//! Quotas live in [`quota`], task rules in [`tasks`], balance credits in
//! [`rewards`], the referral trigger in [`referral`] and debits in
//! [`withdrawal`]. Persistence is behind [`store::AccountStore`]; time is
//! behind [`clock::Clock`]. This file only sequences those pieces.
//!
//! ## Concurrency
//!
//! Single-account mutations are optimistic: load, evaluate, then commit
//! conditioned on the loaded version, retrying on conflict. Withdrawals skip
//! that loop and rely on the store's conditional decrement instead.

pub mod accounts;
pub mod clock;
pub mod credentials;
pub mod errors;
pub mod quota;
pub mod referral;
pub mod rewards;
pub mod store;
pub mod tasks;
pub mod types;
pub mod withdrawal;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_referral;
#[cfg(test)]
mod test_withdrawal;

use tracing::{debug, warn};

pub use clock::{Clock, SystemClock};
pub use credentials::PasswordHasher;
pub use errors::{ErrorKind, LedgerError, Result};
pub use store::{AccountStore, CommitOutcome, InsertOutcome, Lookup, UniqueField};
pub use tasks::TaskType;
pub use types::{
    Account, AccountId, NewAccount, Profile, QuotaTask, TaskData, TaskReceipt, Transaction,
    TxKind, TxStatus, WithdrawalRequest,
};

/// Commit attempts before an optimistic update gives up.
pub const MAX_COMMIT_ATTEMPTS: usize = 5;

pub struct Ledger<S, C, H> {
    store: S,
    clock: C,
    hasher: H,
}

impl<S, C, H> Ledger<S, C, H>
where
    S: AccountStore,
    C: Clock,
    H: PasswordHasher,
{
    pub fn new(store: S, clock: C, hasher: H) -> Self {
        Ledger {
            store,
            clock,
            hasher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ─────────────────────────────────────────────────────────
    // Onboarding
    // ─────────────────────────────────────────────────────────

    /// Create an account with the welcome bonus applied.
    ///
    /// Fails if the phone, email or device is already in use. An invitation
    /// code that does not resolve is dropped.
    pub async fn register(&self, req: &NewAccount) -> Result<Account> {
        let now = self.clock.now();
        accounts::register(&self.store, &self.hasher, req, now, self.clock.day_of(now)).await
    }

    /// Verify credentials, enforce or adopt the device binding, and roll
    /// the daily quotas over if the stored day is stale.
    pub async fn login(
        &self,
        phone: &str,
        password: &str,
        device_id: Option<&str>,
    ) -> Result<Account> {
        let account = accounts::authenticate(&self.store, &self.hasher, phone, password).await?;
        accounts::ensure_device_free(&self.store, &account, device_id).await?;

        let (account, _) = self
            .mutate(&account.id, |account, _| {
                accounts::bind_device(account, device_id)?;
                quota::roll_over(&mut account.quotas, self.clock.today());
                Ok(())
            })
            .await?;
        Ok(account)
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    /// Account state without the credential, transactions newest first.
    pub async fn profile(&self, id: &str) -> Result<Profile> {
        let account = self
            .store
            .find(Lookup::Id(id))
            .await?
            .ok_or(LedgerError::AccountMissing)?;
        let log = self.store.transactions(id).await?;
        Ok(Profile::new(account, log))
    }

    // ─────────────────────────────────────────────────────────
    // Earning
    // ─────────────────────────────────────────────────────────

    /// Gate and reward one task completion.
    ///
    /// The quota rollover, counter changes and the credit commit together.
    /// A video completion may then trigger the referrer's bonus. The task's
    /// reward is already committed at that point, so a failed referral
    /// payout is logged and left to the next video or the sweep; the
    /// receipt is returned either way.
    pub async fn complete_task(
        &self,
        id: &str,
        task: &str,
        data: Option<TaskData>,
    ) -> Result<TaskReceipt> {
        let task: TaskType = task.parse()?;

        let (mut account, earned) = self
            .mutate(id, |account, entries| {
                let now = self.clock.now();
                let today = self.clock.day_of(now);
                quota::roll_over(&mut account.quotas, today);
                let amount =
                    tasks::evaluate(account, task, data, now, today, |at| self.clock.day_of(at))?;
                entries.extend(rewards::credit(account, amount, task.description(), now));
                Ok(amount)
            })
            .await?;

        if task == TaskType::Video {
            if let Err(e) = referral::resolve(&self.store, &mut account, self.clock.now()).await {
                warn!("Referral payout for {} deferred: {e}", account.id);
            }
        }

        Ok(TaskReceipt {
            balance: account.balance,
            earned,
        })
    }

    /// Raise a task's daily limit after a rewarded ad view. Returns the
    /// task and its new limit.
    pub async fn refill_limit(&self, id: &str, task: &str) -> Result<(QuotaTask, u32)> {
        let quota_task = match task.parse::<TaskType>().ok().and_then(|t| t.quota()) {
            Some(q) => q,
            None => return Err(LedgerError::RefillNotAllowed(task.to_string())),
        };

        let (_, limit) = self
            .mutate(id, |account, _| Ok(quota::refill(&mut account.quotas, quota_task)))
            .await?;
        Ok((quota_task, limit))
    }

    // ─────────────────────────────────────────────────────────
    // Redemption
    // ─────────────────────────────────────────────────────────

    /// Queue a payout. Returns the balance after the debit.
    pub async fn withdraw(&self, id: &str, req: &WithdrawalRequest) -> Result<i64> {
        withdrawal::withdraw(&self.store, id, req, self.clock.now()).await
    }

    // ─────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────

    /// Repair referees whose referrer was paid but whose flag never landed,
    /// then pay referrers whose credit never landed. Returns the number of
    /// accounts repaired plus the number of bonuses settled.
    pub async fn reconcile_referrals(&self) -> Result<u64> {
        let mut settled = self.store.reconcile_referral_flags().await?;
        for mut referee in self
            .store
            .unpaid_referrals(referral::REFERRAL_VIDEO_THRESHOLD)
            .await?
        {
            match referral::resolve(&self.store, &mut referee, self.clock.now()).await {
                Ok(()) if referee.referral_bonus_paid => settled += 1,
                Ok(()) => {}
                Err(e) => warn!("Referral payout for {} still pending: {e}", referee.id),
            }
        }
        Ok(settled)
    }

    /// Load, apply, and commit conditioned on the loaded version; reload and
    /// re-apply on conflict. A no-op `apply` skips the write.
    async fn mutate<T, F>(&self, id: &str, mut apply: F) -> Result<(Account, T)>
    where
        F: FnMut(&mut Account, &mut Vec<Transaction>) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut account = self
                .store
                .find(Lookup::Id(id))
                .await?
                .ok_or(LedgerError::AccountMissing)?;
            let before = account.clone();
            let mut entries = Vec::new();
            let value = apply(&mut account, &mut entries)?;

            if account == before && entries.is_empty() {
                return Ok((account, value));
            }

            match self.store.commit(&account, &entries).await? {
                CommitOutcome::Committed => {
                    account.version += 1;
                    return Ok((account, value));
                }
                CommitOutcome::Conflict => {
                    debug!("Version conflict on account {id} (attempt {attempt})");
                }
            }
        }
        Err(LedgerError::ConcurrentModification(id.to_string()))
    }
}
