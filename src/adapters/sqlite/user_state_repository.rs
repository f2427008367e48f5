//! SQLite implementation of the UserStateRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{parse_counter, parse_datetime, parse_optional_datetime, parse_optional_json};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Offer, TrialState, TrialStatus, UserRecord, MAX_TRIAL_DURATION_DAYS,
};
use crate::domain::ports::UserStateRepository;

#[derive(Clone)]
pub struct SqliteUserStateRepository {
    pool: SqlitePool,
}

impl SqliteUserStateRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn conflict(user_id: &str) -> DomainError {
        DomainError::ConcurrencyConflict {
            entity: "user_state".to_string(),
            id: user_id.to_string(),
        }
    }

    async fn insert(&self, record: &UserRecord, offer_json: Option<String>) -> DomainResult<u64> {
        let result = sqlx::query(
            r"INSERT INTO user_states (user_id, trial_status, trial_start_date, trial_duration_days,
                converted_at, current_offer, last_offer_at, last_offer_cooldown_until,
                last_paywall_shown_at, export_count, save_count, session_count, last_session_id,
                version, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&record.user_id)
        .bind(record.trial.status.as_str())
        .bind(record.trial.start_date.map(|d| d.to_rfc3339()))
        .bind(i64::from(record.trial.duration_days))
        .bind(record.trial.converted_at.map(|d| d.to_rfc3339()))
        .bind(offer_json)
        .bind(record.last_offer_at.map(|d| d.to_rfc3339()))
        .bind(record.last_offer_cooldown_until.map(|d| d.to_rfc3339()))
        .bind(record.last_paywall_shown_at.map(|d| d.to_rfc3339()))
        .bind(i64::from(record.export_count))
        .bind(i64::from(record.save_count))
        .bind(i64::from(record.session_count))
        .bind(&record.last_session_id)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(1),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Self::conflict(&record.user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &UserRecord, offer_json: Option<String>) -> DomainResult<u64> {
        let expected = i64::try_from(record.version)
            .map_err(|_| DomainError::ValidationFailed("version out of range".to_string()))?;

        let result = sqlx::query(
            r"UPDATE user_states SET trial_status = ?, trial_start_date = ?, trial_duration_days = ?,
                converted_at = ?, current_offer = ?, last_offer_at = ?, last_offer_cooldown_until = ?,
                last_paywall_shown_at = ?, export_count = ?, save_count = ?, session_count = ?,
                last_session_id = ?, version = version + 1, updated_at = ?
              WHERE user_id = ? AND version = ?",
        )
        .bind(record.trial.status.as_str())
        .bind(record.trial.start_date.map(|d| d.to_rfc3339()))
        .bind(i64::from(record.trial.duration_days))
        .bind(record.trial.converted_at.map(|d| d.to_rfc3339()))
        .bind(offer_json)
        .bind(record.last_offer_at.map(|d| d.to_rfc3339()))
        .bind(record.last_offer_cooldown_until.map(|d| d.to_rfc3339()))
        .bind(record.last_paywall_shown_at.map(|d| d.to_rfc3339()))
        .bind(i64::from(record.export_count))
        .bind(i64::from(record.save_count))
        .bind(i64::from(record.session_count))
        .bind(&record.last_session_id)
        .bind(record.updated_at.to_rfc3339())
        .bind(&record.user_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::conflict(&record.user_id));
        }
        Ok(record.version + 1)
    }
}

#[async_trait]
impl UserStateRepository for SqliteUserStateRepository {
    async fn load(&self, user_id: &str) -> DomainResult<Option<UserRecord>> {
        let row: Option<UserStateRow> = sqlx::query_as("SELECT * FROM user_states WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn save(&self, record: &UserRecord) -> DomainResult<u64> {
        let offer_json = record
            .current_offer
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        if record.version == 0 {
            self.insert(record, offer_json).await
        } else {
            self.update(record, offer_json).await
        }
    }

    async fn delete(&self, user_id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM user_states WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserStateRow {
    user_id: String,
    trial_status: String,
    trial_start_date: Option<String>,
    trial_duration_days: i64,
    converted_at: Option<String>,
    current_offer: Option<String>,
    last_offer_at: Option<String>,
    last_offer_cooldown_until: Option<String>,
    last_paywall_shown_at: Option<String>,
    export_count: i64,
    save_count: i64,
    session_count: i64,
    last_session_id: Option<String>,
    version: i64,
    updated_at: String,
}

impl TryFrom<UserStateRow> for UserRecord {
    type Error = DomainError;

    fn try_from(row: UserStateRow) -> DomainResult<Self> {
        let status: TrialStatus = row.trial_status.parse()?;
        if status == TrialStatus::Expired {
            return Err(DomainError::SerializationError(
                "expired is derived and never stored".to_string(),
            ));
        }

        let version = u64::try_from(row.version)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                DomainError::SerializationError(format!("invalid version {}", row.version))
            })?;

        let start_date = parse_optional_datetime(row.trial_start_date.as_deref())?;
        let duration_days = parse_counter("trial_duration_days", row.trial_duration_days)?;
        if duration_days > MAX_TRIAL_DURATION_DAYS
            || (start_date.is_some() && duration_days == 0)
        {
            return Err(DomainError::SerializationError(format!(
                "trial_duration_days out of range: {duration_days}"
            )));
        }

        Ok(Self {
            trial: TrialState {
                start_date,
                duration_days,
                status,
                converted_at: parse_optional_datetime(row.converted_at.as_deref())?,
            },
            current_offer: parse_optional_json::<Offer>(row.current_offer.as_deref())?,
            last_offer_at: parse_optional_datetime(row.last_offer_at.as_deref())?,
            last_offer_cooldown_until: parse_optional_datetime(
                row.last_offer_cooldown_until.as_deref(),
            )?,
            last_paywall_shown_at: parse_optional_datetime(row.last_paywall_shown_at.as_deref())?,
            export_count: parse_counter("export_count", row.export_count)?,
            save_count: parse_counter("save_count", row.save_count)?,
            session_count: parse_counter("session_count", row.session_count)?,
            last_session_id: row.last_session_id,
            version,
            updated_at: parse_datetime(&row.updated_at)?,
            user_id: row.user_id,
        })
    }
}
