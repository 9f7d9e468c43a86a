use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::classify::Intent;
use curbside_core::domain::driver::DriverId;
use curbside_core::domain::guest::GuestId;
use curbside_core::domain::message::{Message, MessageDirection, MessageId};
use curbside_core::domain::ride::RideId;

use super::{parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

const MESSAGE_COLUMNS: &str = "id, guest_id, driver_id, ride_id, direction, from_number, \
     to_number, body, ai_handled, intent, confidence, provider_sid, created_at";

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (id, guest_id, driver_id, ride_id, direction, from_number, \
                to_number, body, ai_handled, intent, confidence, provider_sid, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.guest_id.0)
        .bind(message.driver_id.as_ref().map(|id| id.0.as_str()))
        .bind(message.ride_id.as_ref().map(|id| id.0.as_str()))
        .bind(message.direction.as_str())
        .bind(&message.from_number)
        .bind(&message.to_number)
        .bind(&message.body)
        .bind(i64::from(message.ai_handled))
        .bind(message.intent.map(|intent| intent.as_str()))
        .bind(message.confidence)
        .bind(message.provider_sid.as_deref())
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history_for_guest(
        &self,
        guest_id: &GuestId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE guest_id = ? \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(&guest_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let direction_raw: String = row.get("direction");
    let direction = MessageDirection::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown message direction `{direction_raw}`"))
    })?;

    let intent = row
        .get::<Option<String>, _>("intent")
        .map(|raw| {
            Intent::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{raw}`")))
        })
        .transpose()?;

    let ai_handled: i64 = row.get("ai_handled");
    let created_at: String = row.get("created_at");

    Ok(Message {
        id: MessageId(row.get("id")),
        guest_id: GuestId(row.get("guest_id")),
        driver_id: row.get::<Option<String>, _>("driver_id").map(DriverId),
        ride_id: row.get::<Option<String>, _>("ride_id").map(RideId),
        direction,
        from_number: row.get("from_number"),
        to_number: row.get("to_number"),
        body: row.get("body"),
        ai_handled: ai_handled != 0,
        intent,
        confidence: row.get("confidence"),
        provider_sid: row.get("provider_sid"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
