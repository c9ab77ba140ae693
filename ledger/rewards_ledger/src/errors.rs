//! Ledger error taxonomy.

use thiserror::Error;

use crate::types::QuotaTask;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Broad category of a [`LedgerError`], used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-fixable; safe to show verbatim.
    Validation,
    /// Device policy rejection.
    Forbidden,
    /// The authenticated account no longer exists.
    NotFound,
    /// Server fault; the message must not reach the client.
    Internal,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Phone number already exists")]
    PhoneTaken,

    #[error("Email already exists")]
    EmailTaken,

    #[error("This device is already registered to another account.")]
    DeviceAlreadyBound,

    #[error("Access Denied: You cannot login from a different device.")]
    DeviceMismatch,

    #[error("User not found")]
    UnknownPhone,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Invalid Task Type")]
    UnknownTaskType(String),

    #[error("Referral rewards are automatic upon friend activity.")]
    ReferralNotClaimable,

    #[error("Already checked in today")]
    AlreadyCheckedIn,

    #[error("Daily {0} limit reached")]
    DailyLimitReached(QuotaTask),

    #[error("Security Alert: Points exceed limit.")]
    SpinScoreTooHigh(i64),

    #[error("Invalid spin value")]
    InvalidSpinValue(i64),

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Minimum withdraw is {0}")]
    BelowMinimumWithdrawal(i64),

    #[error("Insufficient funds. Transaction blocked.")]
    InsufficientFunds,

    #[error("Invalid task type")]
    RefillNotAllowed(String),

    #[error("User not found")]
    AccountMissing,

    #[error("Concurrent modification of account {0}")]
    ConcurrentModification(String),

    #[error("Could not allocate a unique referral code")]
    CodeSpaceExhausted,

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store error: {0}")]
    Store(#[source] BoxError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceAlreadyBound | Self::DeviceMismatch => ErrorKind::Forbidden,
            Self::AccountMissing => ErrorKind::NotFound,
            Self::ConcurrentModification(_)
            | Self::CodeSpaceExhausted
            | Self::Credential(_)
            | Self::Corrupt(_)
            | Self::Store(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }

    /// Wrap a backing-store failure.
    pub fn store(err: impl Into<BoxError>) -> Self {
        Self::Store(err.into())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
