//! Registration, sign-in and device binding.
//!
//! One account per physical device: a device identifier bound to an account
//! gates every later login on that account, and a legacy account with no
//! bound device adopts the first identifier it sees, provided no other
//! account already holds it.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::credentials::PasswordHasher;
use crate::errors::{LedgerError, Result};
use crate::quota;
use crate::rewards::{WELCOME_BONUS, WELCOME_DESCRIPTION};
use crate::store::{AccountStore, InsertOutcome, Lookup, UniqueField};
use crate::types::{Account, NewAccount, Transaction};

pub const REFERRAL_CODE_PREFIX: &str = "PRO";

const MAX_CODE_ATTEMPTS: usize = 8;

/// `PRO` followed by five digits.
pub fn generate_referral_code() -> String {
    let n = Uuid::new_v4().as_u128() % 90_000 + 10_000;
    format!("{REFERRAL_CODE_PREFIX}{n}")
}

/// Treat blank optional inputs as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::MissingField(field));
    }
    Ok(())
}

fn duplicate_error(field: UniqueField) -> LedgerError {
    match field {
        UniqueField::Phone => LedgerError::PhoneTaken,
        UniqueField::Email => LedgerError::EmailTaken,
        UniqueField::Device => LedgerError::DeviceAlreadyBound,
        UniqueField::ReferralCode => {
            LedgerError::Corrupt("referral code collision after pre-check".to_string())
        }
    }
}

/// Create an account with the welcome bonus already in its log.
pub async fn register<S: AccountStore, H: PasswordHasher>(
    store: &S,
    hasher: &H,
    req: &NewAccount,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<Account> {
    require(&req.name, "name")?;
    require(&req.email, "email")?;
    require(&req.phone, "phone")?;
    require(&req.password, "password")?;

    let email = req.email.trim();
    let phone = req.phone.trim();
    let device_id = non_blank(req.device_id.as_deref());

    if store.find(Lookup::Phone(phone)).await?.is_some() {
        return Err(LedgerError::PhoneTaken);
    }
    if store.find(Lookup::Email(email)).await?.is_some() {
        return Err(LedgerError::EmailTaken);
    }
    if let Some(device) = device_id {
        if store.find(Lookup::Device(device)).await?.is_some() {
            return Err(LedgerError::DeviceAlreadyBound);
        }
    }

    // An unknown invitation code is ignored, not rejected.
    let referred_by = match non_blank(req.referral_code.as_deref()) {
        Some(code) => store
            .find(Lookup::ReferralCode(code))
            .await?
            .map(|referrer| referrer.referral_code),
        None => None,
    };

    let password_hash = hasher.hash(&req.password).await?;
    let welcome = Transaction::credit(WELCOME_BONUS, WELCOME_DESCRIPTION, now);

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_referral_code();
        if store.find(Lookup::ReferralCode(&code)).await?.is_some() {
            debug!("Referral code {code} taken, regenerating");
            continue;
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            name: req.name.trim().to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            password_hash: password_hash.clone(),
            referral_code: code,
            referred_by: referred_by.clone(),
            referral_bonus_paid: false,
            device_id: device_id.map(str::to_string),
            balance: WELCOME_BONUS,
            total_earned: WELCOME_BONUS,
            joined_at: now,
            quotas: quota::fresh(today),
            last_check_in: None,
            lifetime_video_count: 0,
            version: 0,
        };

        match store.insert(&account, std::slice::from_ref(&welcome)).await? {
            InsertOutcome::Inserted => {
                info!(
                    "Registered account {} (code {}, referred by {:?})",
                    account.id, account.referral_code, account.referred_by
                );
                return Ok(account);
            }
            InsertOutcome::Duplicate(UniqueField::ReferralCode) => continue,
            InsertOutcome::Duplicate(field) => return Err(duplicate_error(field)),
        }
    }

    Err(LedgerError::CodeSpaceExhausted)
}

/// Look up by phone and check the password.
pub async fn authenticate<S: AccountStore, H: PasswordHasher>(
    store: &S,
    hasher: &H,
    phone: &str,
    password: &str,
) -> Result<Account> {
    let account = store
        .find(Lookup::Phone(phone.trim()))
        .await?
        .ok_or(LedgerError::UnknownPhone)?;
    if !hasher.verify(password, &account.password_hash).await? {
        return Err(LedgerError::InvalidPassword);
    }
    Ok(account)
}

/// Refuse adoption of a device another account already holds.
pub async fn ensure_device_free<S: AccountStore>(
    store: &S,
    account: &Account,
    device_id: Option<&str>,
) -> Result<()> {
    let Some(device) = non_blank(device_id) else {
        return Ok(());
    };
    if account.device_id.is_some() {
        return Ok(());
    }
    match store.find(Lookup::Device(device)).await? {
        Some(other) if other.id != account.id => Err(LedgerError::DeviceAlreadyBound),
        _ => Ok(()),
    }
}

/// Enforce the bound device, or adopt `device_id` if none is bound yet.
pub fn bind_device(account: &mut Account, device_id: Option<&str>) -> Result<()> {
    let device_id = non_blank(device_id);
    match (account.device_id.as_deref(), device_id) {
        (Some(bound), Some(presented)) if bound == presented => Ok(()),
        (Some(_), _) => Err(LedgerError::DeviceMismatch),
        (None, Some(presented)) => {
            info!("Binding account {} to device {presented}", account.id);
            account.device_id = Some(presented.to_string());
            Ok(())
        }
        (None, None) => Ok(()),
    }
}
