use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::domain::guest::{Guest, GuestId};
use curbside_core::domain::hotel::HotelId;

use super::{parse_date, parse_timestamp, GuestRepository, RepositoryError};
use crate::DbPool;

const GUEST_COLUMNS: &str = "id, hotel_id, name, phone, email, room_number, check_in_date, \
     check_out_date, preferences, created_at, updated_at";

pub struct SqlGuestRepository {
    pool: DbPool,
}

impl SqlGuestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GuestRepository for SqlGuestRepository {
    async fn insert(&self, guest: Guest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO guests (id, hotel_id, name, phone, email, room_number, \
                check_in_date, check_out_date, preferences, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&guest.id.0)
        .bind(&guest.hotel_id.0)
        .bind(&guest.name)
        .bind(&guest.phone)
        .bind(guest.email.as_deref())
        .bind(guest.room_number.as_deref())
        .bind(guest.check_in_date.map(|date| date.to_string()))
        .bind(guest.check_out_date.map(|date| date.to_string()))
        .bind(guest.preferences.to_string())
        .bind(guest.created_at.to_rfc3339())
        .bind(guest.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, guest: Guest) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE guests SET hotel_id = ?, name = ?, phone = ?, email = ?, room_number = ?, \
                check_in_date = ?, check_out_date = ?, preferences = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&guest.hotel_id.0)
        .bind(&guest.name)
        .bind(&guest.phone)
        .bind(guest.email.as_deref())
        .bind(guest.room_number.as_deref())
        .bind(guest.check_in_date.map(|date| date.to_string()))
        .bind(guest.check_out_date.map(|date| date.to_string()))
        .bind(guest.preferences.to_string())
        .bind(guest.updated_at.to_rfc3339())
        .bind(&guest.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &GuestId) -> Result<Option<Guest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(guest_from_row).transpose()
    }

    async fn find_latest_by_phone(&self, phone: &str) -> Result<Option<Guest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {GUEST_COLUMNS} FROM guests WHERE phone = ? \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(guest_from_row).transpose()
    }

    async fn find_by_phone_and_hotel(
        &self,
        phone: &str,
        hotel_id: &HotelId,
    ) -> Result<Option<Guest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {GUEST_COLUMNS} FROM guests WHERE phone = ? AND hotel_id = ? \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(phone)
        .bind(&hotel_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(guest_from_row).transpose()
    }

    async fn merge_preferences(
        &self,
        id: &GuestId,
        patch: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RepositoryError> {
        let Some(mut guest) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        merge_json(&mut guest.preferences, patch);
        guest.updated_at = now;
        self.update(guest.clone()).await?;

        Ok(Some(guest))
    }
}

/// Shallow key merge, matching the storage-level `preferences || patch`
/// behavior the API promises.
fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                target_map.insert(key, value);
            }
        }
        (target_slot, patch_value) => *target_slot = patch_value,
    }
}

fn guest_from_row(row: SqliteRow) -> Result<Guest, RepositoryError> {
    let preferences_raw: String = row.get("preferences");
    let preferences = serde_json::from_str(&preferences_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid preferences json: {error}"))
    })?;

    let check_in_date: Option<String> = row.get("check_in_date");
    let check_out_date: Option<String> = row.get("check_out_date");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Guest {
        id: GuestId(row.get("id")),
        hotel_id: HotelId(row.get("hotel_id")),
        name: row.get("name"),
        phone: row.get("phone"),
        email: row.get("email"),
        room_number: row.get("room_number"),
        check_in_date: parse_date(check_in_date.as_deref(), "check_in_date")?,
        check_out_date: parse_date(check_out_date.as_deref(), "check_out_date")?,
        preferences,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use curbside_core::domain::guest::{Guest, GuestId};
    use curbside_core::domain::hotel::HotelId;

    use crate::repositories::{GuestRepository, SqlGuestRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool_with_hotel() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query(
            "INSERT INTO hotels (id, name, created_at) \
             VALUES ('h1', 'Seaside Grand', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert hotel");
        pool
    }

    fn guest(id: &str, phone: &str, created_offset_minutes: i64) -> Guest {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let created_at = base + Duration::minutes(created_offset_minutes);
        Guest {
            id: GuestId(id.to_string()),
            hotel_id: HotelId("h1".to_string()),
            name: "Ava Chen".to_string(),
            phone: phone.to_string(),
            email: Some("ava@example.com".to_string()),
            room_number: Some("1204".to_string()),
            check_in_date: None,
            check_out_date: None,
            preferences: serde_json::json!({"vehicle": "suv"}),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn round_trips_a_guest() {
        let pool = pool_with_hotel().await;
        let repo = SqlGuestRepository::new(pool.clone());

        let expected = guest("g1", "+15551234567", 0);
        repo.insert(expected.clone()).await.expect("insert guest");

        let found = repo.find_by_id(&expected.id).await.expect("find guest");
        assert_eq!(found, Some(expected));
        pool.close().await;
    }

    #[tokio::test]
    async fn latest_registration_wins_for_shared_phone() {
        let pool = pool_with_hotel().await;
        let repo = SqlGuestRepository::new(pool.clone());

        repo.insert(guest("older", "+15551234567", 0)).await.expect("insert older");
        repo.insert(guest("newer", "+15551234567", 30)).await.expect("insert newer");

        let found = repo.find_latest_by_phone("+15551234567").await.expect("lookup");
        assert_eq!(found.map(|guest| guest.id.0), Some("newer".to_string()));
        pool.close().await;
    }

    #[tokio::test]
    async fn merge_preferences_is_a_shallow_key_merge() {
        let pool = pool_with_hotel().await;
        let repo = SqlGuestRepository::new(pool.clone());

        repo.insert(guest("g1", "+15551234567", 0)).await.expect("insert guest");
        let merged = repo
            .merge_preferences(
                &GuestId("g1".to_string()),
                serde_json::json!({"newspaper": true}),
                Utc::now(),
            )
            .await
            .expect("merge")
            .expect("guest exists");

        assert_eq!(
            merged.preferences,
            serde_json::json!({"vehicle": "suv", "newspaper": true})
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn merge_preferences_for_unknown_guest_is_none() {
        let pool = pool_with_hotel().await;
        let repo = SqlGuestRepository::new(pool.clone());

        let merged = repo
            .merge_preferences(&GuestId("ghost".to_string()), serde_json::json!({}), Utc::now())
            .await
            .expect("merge");
        assert!(merged.is_none());
        pool.close().await;
    }
}
