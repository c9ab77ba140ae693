//! Time source for quota rollover and check-in gating.
//!
//! Calendar days are evaluated in a fixed UTC offset so that "today" is the
//! same for every request regardless of host timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset defining the authoritative calendar day.
    fn offset(&self) -> FixedOffset;

    /// Calendar day containing `at`.
    fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    fn today(&self) -> NaiveDate {
        self.day_of(self.now())
    }
}

/// Wall clock with a configured day offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        SystemClock { offset }
    }

    /// `None` if the offset is outside ±24h.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::new)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            offset: Utc.fix(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
