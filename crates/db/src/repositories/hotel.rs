use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::domain::hotel::{Hotel, HotelId, ReminderSettings};

use super::{parse_timestamp, HotelRepository, RepositoryError};
use crate::DbPool;

const HOTEL_COLUMNS: &str =
    "id, name, reminder_enabled, reminder_lead_minutes, reminder_templates, created_at";

pub struct SqlHotelRepository {
    pool: DbPool,
}

impl SqlHotelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HotelRepository for SqlHotelRepository {
    async fn insert(&self, hotel: Hotel) -> Result<(), RepositoryError> {
        let templates = serde_json::to_string(&hotel.reminder_settings.templates)
            .map_err(|error| RepositoryError::Decode(format!("invalid templates: {error}")))?;

        sqlx::query(
            "INSERT INTO hotels (id, name, reminder_enabled, reminder_lead_minutes, \
                reminder_templates, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&hotel.id.0)
        .bind(&hotel.name)
        .bind(i64::from(hotel.reminder_settings.enabled))
        .bind(i64::from(hotel.reminder_settings.lead_time_minutes))
        .bind(templates)
        .bind(hotel.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &HotelId) -> Result<Option<Hotel>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {HOTEL_COLUMNS} FROM hotels WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(hotel_from_row).transpose()
    }

    async fn reminder_settings(
        &self,
        id: &HotelId,
    ) -> Result<Option<ReminderSettings>, RepositoryError> {
        Ok(self.find_by_id(id).await?.map(|hotel| hotel.reminder_settings))
    }

    async fn save_reminder_settings(
        &self,
        id: &HotelId,
        settings: ReminderSettings,
    ) -> Result<bool, RepositoryError> {
        let templates = serde_json::to_string(&settings.templates)
            .map_err(|error| RepositoryError::Decode(format!("invalid templates: {error}")))?;

        let result = sqlx::query(
            "UPDATE hotels SET reminder_enabled = ?, reminder_lead_minutes = ?, \
                reminder_templates = ? \
             WHERE id = ?",
        )
        .bind(i64::from(settings.enabled))
        .bind(i64::from(settings.lead_time_minutes))
        .bind(templates)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_reminder_enabled(&self) -> Result<Vec<Hotel>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {HOTEL_COLUMNS} FROM hotels WHERE reminder_enabled = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hotel_from_row).collect()
    }
}

fn hotel_from_row(row: SqliteRow) -> Result<Hotel, RepositoryError> {
    let templates_raw: String = row.get("reminder_templates");
    let templates: BTreeMap<String, String> = serde_json::from_str(&templates_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid templates json: {error}")))?;

    let enabled: i64 = row.get("reminder_enabled");
    let lead_minutes: i64 = row.get("reminder_lead_minutes");
    let created_at: String = row.get("created_at");

    Ok(Hotel {
        id: HotelId(row.get("id")),
        name: row.get("name"),
        reminder_settings: ReminderSettings {
            enabled: enabled != 0,
            lead_time_minutes: lead_minutes.max(0) as u32,
            templates,
        },
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use curbside_core::domain::hotel::{Hotel, HotelId, ReminderSettings};

    use crate::repositories::{HotelRepository, SqlHotelRepository};
    use crate::{connect_with_settings, migrations};

    fn hotel(id: &str, enabled: bool) -> Hotel {
        Hotel {
            id: HotelId(id.to_string()),
            name: "Seaside Grand".to_string(),
            reminder_settings: ReminderSettings {
                enabled,
                lead_time_minutes: 5,
                templates: Default::default(),
            },
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn settings_round_trip_with_template_overrides() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlHotelRepository::new(pool.clone());

        repo.insert(hotel("h1", true)).await.expect("insert hotel");

        let mut settings = ReminderSettings { lead_time_minutes: 12, ..Default::default() };
        settings
            .templates
            .insert("five_minute".to_string(), "Car for {guest_name} in 5.".to_string());
        let saved = repo
            .save_reminder_settings(&HotelId("h1".to_string()), settings.clone())
            .await
            .expect("save settings");
        assert!(saved);

        let loaded = repo
            .reminder_settings(&HotelId("h1".to_string()))
            .await
            .expect("load settings")
            .expect("hotel exists");
        assert_eq!(loaded, settings);

        pool.close().await;
    }

    #[tokio::test]
    async fn sweep_only_sees_enabled_hotels() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlHotelRepository::new(pool.clone());

        repo.insert(hotel("enabled", true)).await.expect("insert enabled");
        repo.insert(hotel("disabled", false)).await.expect("insert disabled");

        let enabled = repo.list_reminder_enabled().await.expect("list enabled");
        assert_eq!(
            enabled.iter().map(|hotel| hotel.id.0.as_str()).collect::<Vec<_>>(),
            vec!["enabled"]
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn saving_settings_for_unknown_hotel_reports_false() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlHotelRepository::new(pool.clone());

        let saved = repo
            .save_reminder_settings(&HotelId("ghost".to_string()), ReminderSettings::default())
            .await
            .expect("save settings");
        assert!(!saved);
        pool.close().await;
    }
}
