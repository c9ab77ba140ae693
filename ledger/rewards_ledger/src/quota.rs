//! Quota Tracker: daily counters for spin, math and video tasks.
//!
//! Counters are valid only for `task_date`. The first access on a new
//! calendar day zeroes them before any quota check runs; limits are not
//! touched by the rollover, so refills persist.

use chrono::NaiveDate;
use tracing::debug;

use crate::errors::{LedgerError, Result};
use crate::types::{DailyQuotas, Quota, QuotaTask};

/// Starting limit for every quota-limited task.
pub const DEFAULT_DAILY_LIMIT: u32 = 10;

/// Amount a refill adds to a task's daily limit.
pub const REFILL_INCREMENT: u32 = 2;

/// Quota state for an account created on `today`.
pub fn fresh(today: NaiveDate) -> DailyQuotas {
    DailyQuotas {
        task_date: today,
        spin: Quota::new(DEFAULT_DAILY_LIMIT),
        math: Quota::new(DEFAULT_DAILY_LIMIT),
        video: Quota::new(DEFAULT_DAILY_LIMIT),
    }
}

/// Reset counters if `task_date` is stale. Returns `true` when a reset happened.
pub fn roll_over(quotas: &mut DailyQuotas, today: NaiveDate) -> bool {
    if quotas.task_date == today {
        return false;
    }
    debug!("Quota rollover {} -> {today}", quotas.task_date);
    quotas.task_date = today;
    quotas.spin.count = 0;
    quotas.math.count = 0;
    quotas.video.count = 0;
    true
}

/// Take one slot from `task`'s quota, or fail if it is exhausted.
pub fn consume(quotas: &mut DailyQuotas, task: QuotaTask) -> Result<()> {
    let quota = quotas.get_mut(task);
    if !quota.has_room() {
        return Err(LedgerError::DailyLimitReached(task));
    }
    quota.count += 1;
    Ok(())
}

/// Raise `task`'s limit by [`REFILL_INCREMENT`]. Returns the new limit.
pub fn refill(quotas: &mut DailyQuotas, task: QuotaTask) -> u32 {
    let quota = quotas.get_mut(task);
    quota.limit = quota.limit.saturating_add(REFILL_INCREMENT);
    quota.limit
}
