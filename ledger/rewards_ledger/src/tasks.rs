//! Task Gate: per-task validation and reward computation.
//!
//! | task      | gate                         | reward          | counters                         |
//! |-----------|------------------------------|-----------------|----------------------------------|
//! | `checkin` | not yet checked in today     | 50              | `last_check_in = now`            |
//! | `math`    | math quota has room          | 20              | math +1                          |
//! | `video`   | video quota has room         | 30              | video +1, lifetime video +1      |
//! | `spin`    | spin quota has room          | submitted score | spin +1                          |
//! | `refer`   | always rejected              | —               | —                                |
//!
//! [`evaluate`] only mutates the in-memory account; the caller persists the
//! result together with the reward credit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::{LedgerError, Result};
use crate::quota;
use crate::types::{Account, QuotaTask, TaskData};

pub const CHECKIN_REWARD: i64 = 50;
pub const MATH_REWARD: i64 = 20;
pub const VIDEO_REWARD: i64 = 30;

/// Spin outcomes the wheel can legitimately produce.
pub const VALID_SPIN_VALUES: [i64; 8] = [0, 5, 10, 15, 20, 25, 30, 40];

/// Hard ceiling on a submitted spin score, checked before set membership.
pub const SPIN_SCORE_CEILING: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Checkin,
    Math,
    Video,
    Spin,
    Refer,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::Math => "math",
            Self::Video => "video",
            Self::Spin => "spin",
            Self::Refer => "refer",
        }
    }

    /// Fixed log description for credits produced by this task.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Checkin => "Daily Check-in",
            Self::Math => "Quiz Reward",
            Self::Video => "Video Ad Reward",
            Self::Spin => "Lucky Spin Win",
            Self::Refer => "Referral Bonus",
        }
    }

    /// The quota this task draws from, if any.
    pub fn quota(&self) -> Option<QuotaTask> {
        match self {
            Self::Math => Some(QuotaTask::Math),
            Self::Video => Some(QuotaTask::Video),
            Self::Spin => Some(QuotaTask::Spin),
            Self::Checkin | Self::Refer => None,
        }
    }
}

impl FromStr for TaskType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checkin" => Ok(Self::Checkin),
            "math" => Ok(Self::Math),
            "video" => Ok(Self::Video),
            "spin" => Ok(Self::Spin),
            "refer" => Ok(Self::Refer),
            other => Err(LedgerError::UnknownTaskType(other.to_string())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate `task` against `account` and apply its counter mutations.
///
/// Returns the reward amount, which is zero for a losing spin. The quota
/// rollover must already have been applied for `today`.
pub fn evaluate(
    account: &mut Account,
    task: TaskType,
    data: Option<TaskData>,
    now: DateTime<Utc>,
    today: NaiveDate,
    day_of: impl Fn(DateTime<Utc>) -> NaiveDate,
) -> Result<i64> {
    match task {
        TaskType::Checkin => {
            if account.last_check_in.map(&day_of) == Some(today) {
                return Err(LedgerError::AlreadyCheckedIn);
            }
            account.last_check_in = Some(now);
            Ok(CHECKIN_REWARD)
        }
        TaskType::Math => {
            quota::consume(&mut account.quotas, QuotaTask::Math)?;
            Ok(MATH_REWARD)
        }
        TaskType::Video => {
            quota::consume(&mut account.quotas, QuotaTask::Video)?;
            account.lifetime_video_count += 1;
            Ok(VIDEO_REWARD)
        }
        TaskType::Spin => {
            if !account.quotas.spin.has_room() {
                return Err(LedgerError::DailyLimitReached(QuotaTask::Spin));
            }
            let score = data.and_then(|d| d.score).unwrap_or(0);
            validate_spin_score(score)?;
            quota::consume(&mut account.quotas, QuotaTask::Spin)?;
            Ok(score)
        }
        TaskType::Refer => Err(LedgerError::ReferralNotClaimable),
    }
}

/// Ceiling first, then set membership.
pub fn validate_spin_score(score: i64) -> Result<()> {
    if score > SPIN_SCORE_CEILING {
        return Err(LedgerError::SpinScoreTooHigh(score));
    }
    if !VALID_SPIN_VALUES.contains(&score) {
        return Err(LedgerError::InvalidSpinValue(score));
    }
    Ok(())
}
