//! Database layer: migrations and the SQLite-backed account store.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rewards_ledger::types::{DailyQuotas, Quota};
use rewards_ledger::{
    Account, AccountStore, CommitOutcome, InsertOutcome, LedgerError, Lookup, Transaction,
    UniqueField,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────

const ACCOUNT_COLUMNS: &str = "id, name, email, phone, password_hash, referral_code, referred_by, \
     referral_bonus_paid, device_id, balance, total_earned, joined_at, task_date, \
     spin_count, spin_limit, math_count, math_limit, video_count, video_limit, \
     last_check_in, lifetime_video_count, version";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    password_hash: String,
    referral_code: String,
    referred_by: Option<String>,
    referral_bonus_paid: bool,
    device_id: Option<String>,
    balance: i64,
    total_earned: i64,
    joined_at: DateTime<Utc>,
    task_date: NaiveDate,
    spin_count: i64,
    spin_limit: i64,
    math_count: i64,
    math_limit: i64,
    video_count: i64,
    video_limit: i64,
    last_check_in: Option<DateTime<Utc>>,
    lifetime_video_count: i64,
    version: i64,
}

fn counter(column: &str, value: i64) -> rewards_ledger::Result<u32> {
    u32::try_from(value)
        .map_err(|_| LedgerError::Corrupt(format!("{column} out of range: {value}")))
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> rewards_ledger::Result<Self> {
        let quotas = DailyQuotas {
            task_date: row.task_date,
            spin: Quota {
                count: counter("spin_count", row.spin_count)?,
                limit: counter("spin_limit", row.spin_limit)?,
            },
            math: Quota {
                count: counter("math_count", row.math_count)?,
                limit: counter("math_limit", row.math_limit)?,
            },
            video: Quota {
                count: counter("video_count", row.video_count)?,
                limit: counter("video_limit", row.video_limit)?,
            },
        };
        Ok(Account {
            lifetime_video_count: counter("lifetime_video_count", row.lifetime_video_count)?,
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            referral_code: row.referral_code,
            referred_by: row.referred_by,
            referral_bonus_paid: row.referral_bonus_paid,
            device_id: row.device_id,
            balance: row.balance,
            total_earned: row.total_earned,
            joined_at: row.joined_at,
            quotas,
            last_check_in: row.last_check_in,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    kind: String,
    amount: i64,
    description: String,
    created_at: DateTime<Utc>,
    status: String,
    payment_method: Option<String>,
    account_number: Option<String>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> rewards_ledger::Result<Self> {
        Ok(Transaction {
            id: Some(row.id),
            kind: row.kind.parse()?,
            amount: row.amount,
            description: row.description,
            timestamp: row.created_at,
            status: row.status.parse()?,
            payment_method: row.payment_method,
            account_number: row.account_number,
        })
    }
}

/// Which unique column a constraint violation names, if any.
///
/// SQLite reports these as `UNIQUE constraint failed: accounts.<column>`.
fn unique_violation(err: &sqlx::Error) -> Option<UniqueField> {
    let sqlx::Error::Database(db) = err else {
        return None;
    };
    if !db.is_unique_violation() {
        return None;
    }
    let message = db.message();
    [
        ("accounts.phone", UniqueField::Phone),
        ("accounts.email", UniqueField::Email),
        ("accounts.device_id", UniqueField::Device),
        ("accounts.referral_code", UniqueField::ReferralCode),
    ]
    .into_iter()
    .find(|(column, _)| message.contains(column))
    .map(|(_, field)| field)
}

async fn append_entries(
    conn: &mut SqliteConnection,
    account_id: &str,
    entries: &[Transaction],
) -> sqlx::Result<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (account_id, kind, amount, description, created_at, status,
                 payment_method, account_number)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(account_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(entry.timestamp)
        .bind(entry.status.as_str())
        .bind(&entry.payment_method)
        .bind(&entry.account_number)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Account store
// ─────────────────────────────────────────────────────────

/// [`AccountStore`] over the migrated SQLite schema.
///
/// Every multi-statement write runs in one transaction that opens with a
/// write, so concurrent writers queue on the database lock instead of
/// failing a read-to-write upgrade.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }
}

impl AccountStore for SqliteStore {
    async fn find(&self, by: Lookup<'_>) -> rewards_ledger::Result<Option<Account>> {
        let (column, value) = match by {
            Lookup::Id(v) => ("id", v),
            Lookup::Phone(v) => ("phone", v),
            Lookup::Email(v) => ("email", v),
            Lookup::Device(v) => ("device_id", v),
            Lookup::ReferralCode(v) => ("referral_code", v),
        };
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = ?1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(LedgerError::store)?;
        row.map(Account::try_from).transpose()
    }

    async fn insert(
        &self,
        account: &Account,
        entries: &[Transaction],
    ) -> rewards_ledger::Result<InsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let q = &account.quotas;
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts
                (id, name, email, phone, password_hash, referral_code, referred_by,
                 referral_bonus_paid, device_id, balance, total_earned, joined_at, task_date,
                 spin_count, spin_limit, math_count, math_limit, video_count, video_limit,
                 last_check_in, lifetime_video_count, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.password_hash)
        .bind(&account.referral_code)
        .bind(&account.referred_by)
        .bind(account.referral_bonus_paid)
        .bind(&account.device_id)
        .bind(account.balance)
        .bind(account.total_earned)
        .bind(account.joined_at)
        .bind(q.task_date)
        .bind(i64::from(q.spin.count))
        .bind(i64::from(q.spin.limit))
        .bind(i64::from(q.math.count))
        .bind(i64::from(q.math.limit))
        .bind(i64::from(q.video.count))
        .bind(i64::from(q.video.limit))
        .bind(account.last_check_in)
        .bind(i64::from(account.lifetime_video_count))
        .bind(account.version)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            return match unique_violation(&err) {
                Some(field) => Ok(InsertOutcome::Duplicate(field)),
                None => Err(LedgerError::store(err)),
            };
        }

        append_entries(&mut tx, &account.id, entries)
            .await
            .map_err(LedgerError::store)?;
        tx.commit().await.map_err(LedgerError::store)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn commit(
        &self,
        account: &Account,
        entries: &[Transaction],
    ) -> rewards_ledger::Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let q = &account.quotas;
        // Identity, credential and referral linkage are fixed at insert.
        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET    referral_bonus_paid = ?1, device_id = ?2, balance = ?3, total_earned = ?4,
                   task_date = ?5, spin_count = ?6, spin_limit = ?7, math_count = ?8,
                   math_limit = ?9, video_count = ?10, video_limit = ?11, last_check_in = ?12,
                   lifetime_video_count = ?13, version = version + 1
            WHERE  id = ?14 AND version = ?15
            "#,
        )
        .bind(account.referral_bonus_paid)
        .bind(&account.device_id)
        .bind(account.balance)
        .bind(account.total_earned)
        .bind(q.task_date)
        .bind(i64::from(q.spin.count))
        .bind(i64::from(q.spin.limit))
        .bind(i64::from(q.math.count))
        .bind(i64::from(q.math.limit))
        .bind(i64::from(q.video.count))
        .bind(i64::from(q.video.limit))
        .bind(account.last_check_in)
        .bind(i64::from(account.lifetime_video_count))
        .bind(&account.id)
        .bind(account.version)
        .execute(&mut *tx)
        .await;

        let rows = match updated {
            Ok(done) => done.rows_affected(),
            // A device adopted by someone else between the check and the write.
            Err(err) if unique_violation(&err) == Some(UniqueField::Device) => {
                return Err(LedgerError::DeviceAlreadyBound)
            }
            Err(err) => return Err(LedgerError::store(err)),
        };
        if rows == 0 {
            return Ok(CommitOutcome::Conflict);
        }

        append_entries(&mut tx, &account.id, entries)
            .await
            .map_err(LedgerError::store)?;
        tx.commit().await.map_err(LedgerError::store)?;
        Ok(CommitOutcome::Committed)
    }

    async fn debit_if_sufficient(
        &self,
        id: &str,
        amount: i64,
        entry: &Transaction,
    ) -> rewards_ledger::Result<Option<i64>> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let balance: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET    balance = balance - ?1, version = version + 1
            WHERE  id = ?2 AND balance >= ?1
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(LedgerError::store)?;

        let Some((balance,)) = balance else {
            return Ok(None);
        };

        append_entries(&mut tx, id, std::slice::from_ref(entry))
            .await
            .map_err(LedgerError::store)?;
        tx.commit().await.map_err(LedgerError::store)?;
        Ok(Some(balance))
    }

    async fn credit_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        entry: &Transaction,
    ) -> rewards_ledger::Result<bool> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let claimed = sqlx::query(
            r#"
            INSERT INTO referral_payouts (referee_id, referrer_id, amount, paid_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (referee_id) DO NOTHING
            "#,
        )
        .bind(referee_id)
        .bind(referrer_id)
        .bind(entry.amount)
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(LedgerError::store)?
        .rows_affected();

        if claimed == 0 {
            return Ok(false);
        }

        let credited = sqlx::query(
            r#"
            UPDATE accounts
            SET    balance = balance + ?1, total_earned = total_earned + ?1,
                   version = version + 1
            WHERE  id = ?2
            "#,
        )
        .bind(entry.amount)
        .bind(referrer_id)
        .execute(&mut *tx)
        .await
        .map_err(LedgerError::store)?
        .rows_affected();

        if credited == 0 {
            return Err(LedgerError::store(format!("referrer {referrer_id} vanished")));
        }

        append_entries(&mut tx, referrer_id, std::slice::from_ref(entry))
            .await
            .map_err(LedgerError::store)?;
        tx.commit().await.map_err(LedgerError::store)?;
        Ok(true)
    }

    async fn mark_referral_paid(&self, referee_id: &str) -> rewards_ledger::Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET    referral_bonus_paid = 1, version = version + 1
            WHERE  id = ?1 AND referral_bonus_paid = 0
            "#,
        )
        .bind(referee_id)
        .execute(&self.pool)
        .await
        .map_err(LedgerError::store)?;
        Ok(())
    }

    async fn transactions(&self, id: &str) -> rewards_ledger::Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, kind, amount, description, created_at, status, payment_method,
                   account_number
            FROM   transactions
            WHERE  account_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(LedgerError::store)?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn unpaid_referrals(&self, threshold: u32) -> rewards_ledger::Result<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE referred_by IS NOT NULL AND referral_bonus_paid = 0 \
               AND lifetime_video_count >= ?1 \
               AND id NOT IN (SELECT referee_id FROM referral_payouts)"
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(i64::from(threshold))
            .fetch_all(&self.pool)
            .await
            .map_err(LedgerError::store)?;
        rows.into_iter().map(Account::try_from).collect()
    }

    async fn reconcile_referral_flags(&self) -> rewards_ledger::Result<u64> {
        let repaired = sqlx::query(
            r#"
            UPDATE accounts
            SET    referral_bonus_paid = 1, version = version + 1
            WHERE  referral_bonus_paid = 0
              AND  id IN (SELECT referee_id FROM referral_payouts)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(LedgerError::store)?
        .rows_affected();
        Ok(repaired)
    }
}
