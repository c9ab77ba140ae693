//! Referral Resolver.
//!
//! Runs after a referee's video completion has been committed. When the
//! referee crosses [`REFERRAL_VIDEO_THRESHOLD`] lifetime videos, the referrer
//! is credited [`REFERRAL_BONUS`] and only then is the referee flagged paid.
//!
//! The two writes touch different accounts and are not one transaction. The
//! referrer credit is keyed by referee in the store, so re-running the
//! resolver after a crash between the writes cannot pay twice; the flag is
//! repaired on the next run or by the reconciliation sweep.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::Result;
use crate::store::{AccountStore, Lookup};
use crate::types::{Account, Transaction};

pub const REFERRAL_BONUS: i64 = 500;
pub const REFERRAL_VIDEO_THRESHOLD: u32 = 10;

/// Whether `referee` is due to trigger its referrer's bonus.
pub fn is_due(referee: &Account) -> bool {
    referee.referred_by.is_some()
        && !referee.referral_bonus_paid
        && referee.lifetime_video_count >= REFERRAL_VIDEO_THRESHOLD
}

pub fn bonus_description(referee_name: &str) -> String {
    format!("Referral Bonus: {referee_name} watched {REFERRAL_VIDEO_THRESHOLD} videos")
}

/// Pay the referrer of `referee` if due. Updates `referee` in place when the
/// flag is set. An unresolvable referral code is a silent, permanent miss.
pub async fn resolve<S: AccountStore>(
    store: &S,
    referee: &mut Account,
    now: DateTime<Utc>,
) -> Result<()> {
    if !is_due(referee) {
        return Ok(());
    }
    let Some(code) = referee.referred_by.as_deref() else {
        return Ok(());
    };

    let Some(referrer) = store.find(Lookup::ReferralCode(code)).await? else {
        warn!("Referral code {code} of account {} no longer resolves; bonus skipped", referee.id);
        return Ok(());
    };

    let entry = Transaction::credit(REFERRAL_BONUS, bonus_description(&referee.name), now);
    if store.credit_referral(&referrer.id, &referee.id, &entry).await? {
        info!("Referral bonus {REFERRAL_BONUS} paid to {} for {}", referrer.id, referee.id);
    } else {
        warn!("Referral bonus for {} was already paid; marking flag only", referee.id);
    }

    store.mark_referral_paid(&referee.id).await?;
    referee.referral_bonus_paid = true;
    Ok(())
}
