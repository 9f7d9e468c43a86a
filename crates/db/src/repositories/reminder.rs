use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::domain::reminder::{ReminderKind, ReminderRecord, ReminderRecordId};
use curbside_core::domain::ride::RideId;

use super::{parse_timestamp, ReminderInsert, ReminderRepository, RepositoryError};
use crate::DbPool;

const REMINDER_COLUMNS: &str = "id, ride_id, reminder_kind, message_sent, sent_at";

pub struct SqlReminderRepository {
    pool: DbPool,
}

impl SqlReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn insert(&self, record: ReminderRecord) -> Result<ReminderInsert, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO ride_reminders (id, ride_id, reminder_kind, message_sent, sent_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.ride_id.0)
        .bind(record.kind.as_str())
        .bind(&record.message_sent)
        .bind(record.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(ReminderInsert::Recorded),
            // The partial unique index on (ride_id, reminder_kind) is the
            // dedup mechanism; losing the race means the reminder went out.
            Err(sqlx::Error::Database(database_error))
                if database_error.is_unique_violation() =>
            {
                Ok(ReminderInsert::AlreadySent)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn exists(
        &self,
        ride_id: &RideId,
        kind: ReminderKind,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ride_reminders WHERE ride_id = ? AND reminder_kind = ?",
        )
        .bind(&ride_id.0)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn history_for_ride(
        &self,
        ride_id: &RideId,
    ) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REMINDER_COLUMNS} FROM ride_reminders WHERE ride_id = ? \
             ORDER BY sent_at DESC"
        ))
        .bind(&ride_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reminder_from_row).collect()
    }
}

fn reminder_from_row(row: SqliteRow) -> Result<ReminderRecord, RepositoryError> {
    let kind_raw: String = row.get("reminder_kind");
    let kind = ReminderKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown reminder kind `{kind_raw}`")))?;
    let sent_at: String = row.get("sent_at");

    Ok(ReminderRecord {
        id: ReminderRecordId(row.get("id")),
        ride_id: RideId(row.get("ride_id")),
        kind,
        message_sent: row.get("message_sent"),
        sent_at: parse_timestamp(&sent_at, "sent_at")?,
    })
}
