//! # Types
//!
//! Shared data structures used across all modules of the rewards ledger.
//!
//! ## Account / log split
//!
//! An [`Account`] carries identity, balance, counters and referral linkage.
//! Its transaction log is held by the store next to it and is only ever
//! appended to, so hot paths (task completion, withdrawal) never rewrite
//! history. The read-side [`Profile`] stitches the two back together.
//!
//! ## Transaction status
//!
//! ```text
//! credit ──► Completed
//! debit  ──► Pending ──► Completed
//!                   └──► Failed
//! ```
//!
//! Pending → Completed/Failed is owned by an external settlement process.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

pub type AccountId = String;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Credit,
    Debit,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl FromStr for TxKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(LedgerError::Corrupt(format!("unknown transaction kind {other:?}"))),
        }
    }
}

/// Settlement status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Completed,
    Pending,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TxStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(LedgerError::Corrupt(format!("unknown transaction status {other:?}"))),
        }
    }
}

/// One immutable entry in an account's transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Store-assigned, increasing with append order. `None` until appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: TxKind,
    /// Always positive; the direction lives in `kind`.
    pub amount: i64,
    pub description: String,
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    /// Payout method, debits only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Payout destination, debits only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

impl Transaction {
    /// A completed credit entry.
    pub fn credit(amount: i64, description: impl Into<String>, at: DateTime<Utc>) -> Self {
        Transaction {
            id: None,
            kind: TxKind::Credit,
            amount,
            description: description.into(),
            timestamp: at,
            status: TxStatus::Completed,
            payment_method: None,
            account_number: None,
        }
    }

    /// A pending withdrawal entry.
    pub fn withdrawal(amount: i64, method: &str, destination: &str, at: DateTime<Utc>) -> Self {
        Transaction {
            id: None,
            kind: TxKind::Debit,
            amount,
            description: format!("Withdraw to {method} ({destination})"),
            timestamp: at,
            status: TxStatus::Pending,
            payment_method: Some(method.to_string()),
            account_number: Some(destination.to_string()),
        }
    }

    /// Signed effect of this entry on the balance.
    pub fn delta(&self) -> i64 {
        match self.kind {
            TxKind::Credit => self.amount,
            TxKind::Debit => -self.amount,
        }
    }
}

/// Daily counter and cap for one quota-limited task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub count: u32,
    pub limit: u32,
}

impl Quota {
    pub fn new(limit: u32) -> Self {
        Quota { count: 0, limit }
    }

    pub fn has_room(&self) -> bool {
        self.count < self.limit
    }
}

/// Per-day quota state. Counters are only meaningful while `task_date`
/// equals the current calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuotas {
    pub task_date: NaiveDate,
    pub spin: Quota,
    pub math: Quota,
    pub video: Quota,
}

/// The three task types that carry a daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTask {
    Spin,
    Math,
    Video,
}

impl QuotaTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spin => "spin",
            Self::Math => "math",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for QuotaTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DailyQuotas {
    pub fn get(&self, task: QuotaTask) -> &Quota {
        match task {
            QuotaTask::Spin => &self.spin,
            QuotaTask::Math => &self.math,
            QuotaTask::Video => &self.video,
        }
    }

    pub fn get_mut(&mut self, task: QuotaTask) -> &mut Quota {
        match task {
            QuotaTask::Spin => &mut self.spin,
            QuotaTask::Math => &mut self.math,
            QuotaTask::Video => &mut self.video,
        }
    }
}

/// A registered user's ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Opaque hashed credential. Never leaves the crate boundary in a [`Profile`].
    pub password_hash: String,
    /// Self-assigned at creation, globally unique, immutable.
    pub referral_code: String,
    /// Code of the inviting account, set once at registration.
    pub referred_by: Option<String>,
    pub referral_bonus_paid: bool,
    pub device_id: Option<String>,
    pub balance: i64,
    /// Lifetime credits, never decreased by withdrawals.
    pub total_earned: i64,
    pub joined_at: DateTime<Utc>,
    pub quotas: DailyQuotas,
    pub last_check_in: Option<DateTime<Utc>>,
    /// Referral trigger counter; unlike `quotas.video.count` it never resets.
    pub lifetime_video_count: u32,
    /// Optimistic-concurrency version as last read from the store.
    pub version: i64,
}

/// Read-side view of an account: credential stripped, log newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub balance: i64,
    pub total_earned: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_bonus_paid: bool,
    pub device_id: Option<String>,
    pub joined_date: DateTime<Utc>,
    pub task_date: NaiveDate,
    pub last_check_in: Option<DateTime<Utc>>,
    pub spin_count: u32,
    pub spin_limit: u32,
    pub math_count: u32,
    pub math_limit: u32,
    pub video_count: u32,
    pub video_limit: u32,
    pub lifetime_video_count: u32,
    pub transactions: Vec<Transaction>,
}

impl Profile {
    /// Build a profile from an account and its chronological log.
    pub fn new(account: Account, mut log: Vec<Transaction>) -> Self {
        log.reverse();
        Profile {
            id: account.id,
            name: account.name,
            email: account.email,
            phone: account.phone,
            balance: account.balance,
            total_earned: account.total_earned,
            referral_code: account.referral_code,
            referred_by: account.referred_by,
            referral_bonus_paid: account.referral_bonus_paid,
            device_id: account.device_id,
            joined_date: account.joined_at,
            task_date: account.quotas.task_date,
            last_check_in: account.last_check_in,
            spin_count: account.quotas.spin.count,
            spin_limit: account.quotas.spin.limit,
            math_count: account.quotas.math.count,
            math_limit: account.quotas.math.limit,
            video_count: account.quotas.video.count,
            video_limit: account.quotas.video.limit,
            lifetime_video_count: account.lifetime_video_count,
            transactions: log,
        }
    }
}

/// Registration input. `password` is plaintext and hashed by the ledger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub referral_code: Option<String>,
    pub device_id: Option<String>,
}

/// Task-specific payload. Only `spin` reads it.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TaskData {
    pub score: Option<i64>,
}

/// Result of a successful task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskReceipt {
    pub balance: i64,
    /// Zero for a losing spin.
    pub earned: i64,
}

/// Withdrawal input.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: i64,
    pub method: String,
    pub account: String,
}
