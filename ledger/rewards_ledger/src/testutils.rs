//! In-memory collaborators for tests: a store, a settable clock and a
//! plaintext hasher. Enabled for this crate's tests and, via the `testutils`
//! feature, for downstream crates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};

use crate::clock::Clock;
use crate::credentials::PasswordHasher;
use crate::errors::{LedgerError, Result};
use crate::quota;
use crate::store::{AccountStore, CommitOutcome, InsertOutcome, Lookup, UniqueField};
use crate::types::{Account, AccountId, NewAccount, Transaction};

// ─────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    logs: HashMap<AccountId, Vec<Transaction>>,
    /// referee id → referrer id
    payouts: HashMap<AccountId, AccountId>,
    next_tx_id: i64,
}

impl State {
    fn matches(account: &Account, by: Lookup<'_>) -> bool {
        match by {
            Lookup::Id(id) => account.id == id,
            Lookup::Phone(phone) => account.phone == phone,
            Lookup::Email(email) => account.email == email,
            Lookup::Device(device) => account.device_id.as_deref() == Some(device),
            Lookup::ReferralCode(code) => account.referral_code == code,
        }
    }

    fn find(&self, by: Lookup<'_>) -> Option<&Account> {
        match by {
            Lookup::Id(id) => self.accounts.get(id),
            _ => self.accounts.values().find(|a| Self::matches(a, by)),
        }
    }

    /// Append to `id`'s log, assigning ids in append order.
    fn append(&mut self, id: &str, entries: &[Transaction]) {
        let log = self.logs.entry(id.to_string()).or_default();
        for entry in entries {
            self.next_tx_id += 1;
            log.push(Transaction {
                id: Some(self.next_tx_id),
                ..entry.clone()
            });
        }
    }

    fn duplicate_of(&self, account: &Account) -> Option<UniqueField> {
        for other in self.accounts.values().filter(|a| a.id != account.id) {
            if other.phone == account.phone {
                return Some(UniqueField::Phone);
            }
            if other.email == account.email {
                return Some(UniqueField::Email);
            }
            if account.device_id.is_some() && other.device_id == account.device_id {
                return Some(UniqueField::Device);
            }
            if other.referral_code == account.referral_code {
                return Some(UniqueField::ReferralCode);
            }
        }
        None
    }
}

/// Mutex-backed [`AccountStore`] with fault injection hooks.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    forced_conflicts: AtomicU32,
    fail_mark_referral: AtomicBool,
    fail_credit_referral: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite an account record directly, bumping its version.
    pub fn put(&self, mut account: Account) {
        let mut state = self.state();
        if let Some(existing) = state.accounts.get(&account.id) {
            account.version = existing.version + 1;
        }
        state.logs.entry(account.id.clone()).or_default();
        state.accounts.insert(account.id.clone(), account);
    }

    pub fn remove(&self, id: &str) -> Option<Account> {
        self.state().accounts.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Account> {
        self.state().accounts.get(id).cloned()
    }

    pub fn log(&self, id: &str) -> Vec<Transaction> {
        self.state().logs.get(id).cloned().unwrap_or_default()
    }

    /// Credit `amount` with a logged entry, as an out-of-band top-up.
    pub fn grant(&self, id: &str, amount: i64) {
        let mut state = self.state();
        if let Some(account) = state.accounts.get_mut(id) {
            account.balance += amount;
            account.total_earned += amount;
            account.version += 1;
            state.append(id, &[Transaction::credit(amount, "Test Grant", Utc::now())]);
        }
    }

    /// Make the next `n` commits report a version conflict.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make `mark_referral_paid` fail, as if the process died between the
    /// referrer credit and the referee flag.
    pub fn fail_mark_referral(&self, fail: bool) {
        self.fail_mark_referral.store(fail, Ordering::SeqCst);
    }

    /// Make `credit_referral` fail, as if the referrer write never landed.
    pub fn fail_credit_referral(&self, fail: bool) {
        self.fail_credit_referral.store(fail, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl AccountStore for InMemoryStore {
    async fn find(&self, by: Lookup<'_>) -> Result<Option<Account>> {
        Ok(self.state().find(by).cloned())
    }

    async fn insert(&self, account: &Account, entries: &[Transaction]) -> Result<InsertOutcome> {
        let mut state = self.state();
        if state.accounts.contains_key(&account.id) {
            return Err(LedgerError::Corrupt(format!("account {} exists", account.id)));
        }
        if let Some(field) = state.duplicate_of(account) {
            return Ok(InsertOutcome::Duplicate(field));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        state.logs.insert(account.id.clone(), Vec::new());
        state.append(&account.id, entries);
        Ok(InsertOutcome::Inserted)
    }

    async fn commit(&self, account: &Account, entries: &[Transaction]) -> Result<CommitOutcome> {
        if self.take_forced_conflict() {
            return Ok(CommitOutcome::Conflict);
        }
        let mut state = self.state();
        match state.accounts.get(&account.id) {
            Some(stored) if stored.version == account.version => {}
            _ => return Ok(CommitOutcome::Conflict),
        }
        match state.duplicate_of(account) {
            None => {}
            Some(UniqueField::Device) => return Err(LedgerError::DeviceAlreadyBound),
            Some(field) => {
                return Err(LedgerError::store(format!("unique constraint on {field:?}")))
            }
        }
        let mut updated = account.clone();
        updated.version += 1;
        state.accounts.insert(account.id.clone(), updated);
        state.append(&account.id, entries);
        Ok(CommitOutcome::Committed)
    }

    async fn debit_if_sufficient(
        &self,
        id: &str,
        amount: i64,
        entry: &Transaction,
    ) -> Result<Option<i64>> {
        let mut state = self.state();
        let Some(account) = state.accounts.get_mut(id) else {
            return Ok(None);
        };
        if account.balance < amount {
            return Ok(None);
        }
        account.balance -= amount;
        account.version += 1;
        let balance = account.balance;
        state.append(id, std::slice::from_ref(entry));
        Ok(Some(balance))
    }

    async fn credit_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        entry: &Transaction,
    ) -> Result<bool> {
        if self.fail_credit_referral.load(Ordering::SeqCst) {
            return Err(LedgerError::store("injected failure crediting referrer"));
        }
        let mut state = self.state();
        if state.payouts.contains_key(referee_id) {
            return Ok(false);
        }
        let Some(referrer) = state.accounts.get_mut(referrer_id) else {
            return Err(LedgerError::store(format!("referrer {referrer_id} vanished")));
        };
        referrer.balance += entry.amount;
        referrer.total_earned += entry.amount;
        referrer.version += 1;
        state.append(referrer_id, std::slice::from_ref(entry));
        state
            .payouts
            .insert(referee_id.to_string(), referrer_id.to_string());
        Ok(true)
    }

    async fn mark_referral_paid(&self, referee_id: &str) -> Result<()> {
        if self.fail_mark_referral.load(Ordering::SeqCst) {
            return Err(LedgerError::store("injected failure marking referral"));
        }
        let mut state = self.state();
        if let Some(referee) = state.accounts.get_mut(referee_id) {
            if !referee.referral_bonus_paid {
                referee.referral_bonus_paid = true;
                referee.version += 1;
            }
        }
        Ok(())
    }

    async fn transactions(&self, id: &str) -> Result<Vec<Transaction>> {
        Ok(self.log(id))
    }

    async fn unpaid_referrals(&self, threshold: u32) -> Result<Vec<Account>> {
        let state = self.state();
        Ok(state
            .accounts
            .values()
            .filter(|a| {
                a.referred_by.is_some()
                    && !a.referral_bonus_paid
                    && a.lifetime_video_count >= threshold
                    && !state.payouts.contains_key(&a.id)
            })
            .cloned()
            .collect())
    }

    async fn reconcile_referral_flags(&self) -> Result<u64> {
        let mut state = self.state();
        let paid: Vec<AccountId> = state.payouts.keys().cloned().collect();
        let mut repaired = 0;
        for id in paid {
            if let Some(referee) = state.accounts.get_mut(&id) {
                if !referee.referral_bonus_paid {
                    referee.referral_bonus_paid = true;
                    referee.version += 1;
                    repaired += 1;
                }
            }
        }
        Ok(repaired)
    }
}

// ─────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────

/// Settable clock in UTC.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Midday UTC on the given date.
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        let now = Utc
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::at(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset(&self) -> FixedOffset {
        Utc.fix()
    }
}

// ─────────────────────────────────────────────────────────
// Hasher
// ─────────────────────────────────────────────────────────

/// Stores passwords as `plain$<password>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    async fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("plain${password}"))
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        Ok(hash.strip_prefix("plain$") == Some(password))
    }
}

// ─────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────

/// A zero-balance account with default quotas, not stored anywhere.
pub fn sample_account() -> Account {
    let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default();
    Account {
        id: "acct-sample".to_string(),
        name: "Sample".to_string(),
        email: "sample@example.com".to_string(),
        phone: "01700000000".to_string(),
        password_hash: "plain$secret".to_string(),
        referral_code: "PRO10000".to_string(),
        referred_by: None,
        referral_bonus_paid: false,
        device_id: None,
        balance: 0,
        total_earned: 0,
        joined_at: Utc::now(),
        quotas: quota::fresh(today),
        last_check_in: None,
        lifetime_video_count: 0,
        version: 0,
    }
}

/// Registration input with phone, email and device derived from `tag`.
pub fn new_account(tag: &str) -> NewAccount {
    NewAccount {
        name: format!("User {tag}"),
        email: format!("{tag}@example.com"),
        phone: format!("0170{tag}"),
        password: "secret".to_string(),
        referral_code: None,
        device_id: Some(format!("device-{tag}")),
    }
}
