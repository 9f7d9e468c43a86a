use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::domain::driver::DriverId;
use curbside_core::domain::guest::GuestId;
use curbside_core::domain::hotel::HotelId;
use curbside_core::domain::reminder::ReminderKind;
use curbside_core::domain::ride::{Ride, RideId, RideStatus};

use super::{
    parse_optional_timestamp, parse_timestamp, RepositoryError, RideFilter, RideRepository,
};
use crate::DbPool;

const RIDE_COLUMNS: &str = "id, guest_id, driver_id, hotel_id, pickup_time, pickup_location, \
     pickup_notes, dropoff_location, dropoff_notes, passenger_count, status, \
     driver_departed_at, completed_at, special_requests, calendar_event_id, created_by, \
     created_at, updated_at";

pub struct SqlRideRepository {
    pool: DbPool,
}

impl SqlRideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RideRepository for SqlRideRepository {
    async fn insert(&self, ride: Ride) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rides (id, guest_id, driver_id, hotel_id, pickup_time, \
                pickup_location, pickup_notes, dropoff_location, dropoff_notes, \
                passenger_count, status, driver_departed_at, completed_at, special_requests, \
                calendar_event_id, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ride.id.0)
        .bind(&ride.guest_id.0)
        .bind(ride.driver_id.as_ref().map(|id| id.0.as_str()))
        .bind(&ride.hotel_id.0)
        .bind(ride.pickup_time.to_rfc3339())
        .bind(&ride.pickup_location)
        .bind(ride.pickup_notes.as_deref())
        .bind(&ride.dropoff_location)
        .bind(ride.dropoff_notes.as_deref())
        .bind(i64::from(ride.passenger_count))
        .bind(ride.status.as_str())
        .bind(ride.driver_departed_at.map(|value| value.to_rfc3339()))
        .bind(ride.completed_at.map(|value| value.to_rfc3339()))
        .bind(ride.special_requests.as_deref())
        .bind(ride.calendar_event_id.as_deref())
        .bind(&ride.created_by)
        .bind(ride.created_at.to_rfc3339())
        .bind(ride.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, ride: Ride) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE rides SET guest_id = ?, driver_id = ?, hotel_id = ?, pickup_time = ?, \
                pickup_location = ?, pickup_notes = ?, dropoff_location = ?, dropoff_notes = ?, \
                passenger_count = ?, status = ?, driver_departed_at = ?, completed_at = ?, \
                special_requests = ?, calendar_event_id = ?, created_by = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&ride.guest_id.0)
        .bind(ride.driver_id.as_ref().map(|id| id.0.as_str()))
        .bind(&ride.hotel_id.0)
        .bind(ride.pickup_time.to_rfc3339())
        .bind(&ride.pickup_location)
        .bind(ride.pickup_notes.as_deref())
        .bind(&ride.dropoff_location)
        .bind(ride.dropoff_notes.as_deref())
        .bind(i64::from(ride.passenger_count))
        .bind(ride.status.as_str())
        .bind(ride.driver_departed_at.map(|value| value.to_rfc3339()))
        .bind(ride.completed_at.map(|value| value.to_rfc3339()))
        .bind(ride.special_requests.as_deref())
        .bind(ride.calendar_event_id.as_deref())
        .bind(&ride.created_by)
        .bind(ride.updated_at.to_rfc3339())
        .bind(&ride.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ride_from_row).transpose()
    }

    async fn current_active_for_guest(
        &self,
        guest_id: &GuestId,
    ) -> Result<Option<Ride>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides \
             WHERE guest_id = ? AND status NOT IN ('completed', 'cancelled') \
             ORDER BY pickup_time ASC LIMIT 1"
        ))
        .bind(&guest_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ride_from_row).transpose()
    }

    async fn earliest_active_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<Ride>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides \
             WHERE driver_id = ? AND status IN ('scheduled', 'confirmed', 'in_progress') \
             ORDER BY pickup_time ASC LIMIT 1"
        ))
        .bind(&driver_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ride_from_row).transpose()
    }

    async fn list(&self, filter: RideFilter) -> Result<Vec<Ride>, RepositoryError> {
        let mut sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE 1 = 1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(hotel_id) = &filter.hotel_id {
            sql.push_str(" AND hotel_id = ?");
            binds.push(hotel_id.0.clone());
        }
        if let Some(driver_id) = &filter.driver_id {
            sql.push_str(" AND driver_id = ?");
            binds.push(driver_id.0.clone());
        }
        if let Some(guest_id) = &filter.guest_id {
            sql.push_str(" AND guest_id = ?");
            binds.push(guest_id.0.clone());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(pickup_after) = filter.pickup_after {
            sql.push_str(" AND pickup_time >= ?");
            binds.push(pickup_after.to_rfc3339());
        }
        if let Some(pickup_before) = filter.pickup_before {
            sql.push_str(" AND pickup_time <= ?");
            binds.push(pickup_before.to_rfc3339());
        }
        sql.push_str(" ORDER BY pickup_time ASC");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(ride_from_row).collect()
    }

    async fn set_pickup_time(
        &self,
        id: &RideId,
        pickup_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE rides SET pickup_time = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(pickup_time.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition_status(
        &self,
        id: &RideId,
        next: RideStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let allowed_from: &[&str] = match next {
            RideStatus::Scheduled => return Ok(false),
            RideStatus::Confirmed => &["scheduled"],
            RideStatus::InProgress => &["scheduled", "confirmed"],
            RideStatus::Completed => &["in_progress"],
            RideStatus::Cancelled => &["scheduled", "confirmed", "in_progress"],
        };

        let placeholders = allowed_from.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let stamp_column = match next {
            RideStatus::InProgress => ", driver_departed_at = ?",
            RideStatus::Completed => ", completed_at = ?",
            _ => "",
        };
        let sql = format!(
            "UPDATE rides SET status = ?, updated_at = ?{stamp_column} \
             WHERE id = ? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(next.as_str()).bind(now.to_rfc3339());
        if !stamp_column.is_empty() {
            query = query.bind(now.to_rfc3339());
        }
        query = query.bind(&id.0);
        for status in allowed_from {
            query = query.bind(*status);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_for_reminder(
        &self,
        hotel_id: &HotelId,
        kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides r \
             WHERE r.hotel_id = ? \
               AND r.status IN ('scheduled', 'confirmed') \
               AND r.pickup_time > ? \
               AND r.pickup_time <= ? \
               AND NOT EXISTS ( \
                   SELECT 1 FROM ride_reminders rr \
                   WHERE rr.ride_id = r.id AND rr.reminder_kind = ?) \
             ORDER BY r.pickup_time ASC"
        ))
        .bind(&hotel_id.0)
        .bind(window_start.to_rfc3339())
        .bind(window_end.to_rfc3339())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ride_from_row).collect()
    }

    async fn upcoming_for_hotel(
        &self,
        hotel_id: &HotelId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides \
             WHERE hotel_id = ? \
               AND status IN ('scheduled', 'confirmed') \
               AND pickup_time > ? \
               AND pickup_time <= ? \
             ORDER BY pickup_time ASC"
        ))
        .bind(&hotel_id.0)
        .bind(from.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ride_from_row).collect()
    }
}

fn ride_from_row(row: SqliteRow) -> Result<Ride, RepositoryError> {
    let status_raw: String = row.get("status");
    let status = RideStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown ride status `{status_raw}`")))?;

    let pickup_time: String = row.get("pickup_time");
    let driver_departed_at: Option<String> = row.get("driver_departed_at");
    let completed_at: Option<String> = row.get("completed_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let passenger_count: i64 = row.get("passenger_count");

    Ok(Ride {
        id: RideId(row.get("id")),
        guest_id: GuestId(row.get("guest_id")),
        driver_id: row.get::<Option<String>, _>("driver_id").map(DriverId),
        hotel_id: HotelId(row.get("hotel_id")),
        pickup_time: parse_timestamp(&pickup_time, "pickup_time")?,
        pickup_location: row.get("pickup_location"),
        pickup_notes: row.get("pickup_notes"),
        dropoff_location: row.get("dropoff_location"),
        dropoff_notes: row.get("dropoff_notes"),
        passenger_count: passenger_count.max(0) as u32,
        status,
        driver_departed_at: parse_optional_timestamp(
            driver_departed_at.as_deref(),
            "driver_departed_at",
        )?,
        completed_at: parse_optional_timestamp(completed_at.as_deref(), "completed_at")?,
        special_requests: row.get("special_requests"),
        calendar_event_id: row.get("calendar_event_id"),
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use curbside_core::domain::guest::GuestId;
    use curbside_core::domain::hotel::HotelId;
    use curbside_core::domain::reminder::{ReminderKind, ReminderRecord, ReminderRecordId};
    use curbside_core::domain::ride::{Ride, RideId, RideStatus};

    use crate::repositories::{
        ReminderInsert, ReminderRepository, RepositoryError, RideFilter, RideRepository,
        SqlReminderRepository, SqlRideRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool_with_fixture() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO hotels (id, name, created_at) \
             VALUES ('h1', 'Seaside Grand', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert hotel");
        sqlx::query(
            "INSERT INTO guests (id, hotel_id, name, phone, created_at, updated_at) \
             VALUES ('g1', 'h1', 'Ava Chen', '+15551234567', \
                '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert guest");

        pool
    }

    fn ride(id: &str, status: RideStatus) -> Ride {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        Ride {
            id: RideId(id.to_string()),
            guest_id: GuestId("g1".to_string()),
            driver_id: None,
            hotel_id: HotelId("h1".to_string()),
            pickup_time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            pickup_location: "Hotel Lobby".to_string(),
            pickup_notes: None,
            dropoff_location: "Airport Terminal 1".to_string(),
            dropoff_notes: None,
            passenger_count: 2,
            status,
            driver_departed_at: None,
            completed_at: None,
            special_requests: None,
            calendar_event_id: None,
            created_by: "staff".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());

        let expected = ride("r1", RideStatus::Scheduled);
        repo.insert(expected.clone()).await.expect("insert ride");

        let found = repo.find_by_id(&expected.id).await.expect("find ride");
        assert_eq!(found, Some(expected));

        pool.close().await;
    }

    #[tokio::test]
    async fn current_active_skips_terminal_rides() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());

        let mut cancelled = ride("r1", RideStatus::Cancelled);
        cancelled.pickup_time = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        repo.insert(cancelled).await.expect("insert cancelled");
        repo.insert(ride("r2", RideStatus::Scheduled)).await.expect("insert scheduled");

        let current = repo
            .current_active_for_guest(&GuestId("g1".to_string()))
            .await
            .expect("query current");
        assert_eq!(current.map(|ride| ride.id.0), Some("r2".to_string()));

        pool.close().await;
    }

    #[tokio::test]
    async fn guarded_transition_rejects_terminal_rides() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());
        let now = Utc::now();

        repo.insert(ride("r1", RideStatus::Scheduled)).await.expect("insert ride");

        let cancelled = repo
            .transition_status(&RideId("r1".to_string()), RideStatus::Cancelled, now)
            .await
            .expect("cancel");
        assert!(cancelled);

        let resurrected = repo
            .transition_status(&RideId("r1".to_string()), RideStatus::Confirmed, now)
            .await
            .expect("attempt confirm");
        assert!(!resurrected, "cancelled ride must stay cancelled");

        pool.close().await;
    }

    #[tokio::test]
    async fn transition_to_completed_stamps_timestamp() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 45, 0).unwrap();

        repo.insert(ride("r1", RideStatus::InProgress)).await.expect("insert ride");
        let completed = repo
            .transition_status(&RideId("r1".to_string()), RideStatus::Completed, now)
            .await
            .expect("complete");
        assert!(completed);

        let found =
            repo.find_by_id(&RideId("r1".to_string())).await.expect("find ride").expect("ride");
        assert_eq!(found.status, RideStatus::Completed);
        assert_eq!(found.completed_at, Some(now));

        pool.close().await;
    }

    #[tokio::test]
    async fn set_pickup_time_skips_cancelled_rides() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());
        let now = Utc::now();

        repo.insert(ride("r1", RideStatus::Cancelled)).await.expect("insert ride");
        let moved = repo
            .set_pickup_time(&RideId("r1".to_string()), now + Duration::hours(1), now)
            .await
            .expect("attempt move");

        assert!(!moved);
        pool.close().await;
    }

    #[tokio::test]
    async fn due_for_reminder_respects_window_and_existing_records() {
        let pool = pool_with_fixture().await;
        let rides = SqlRideRepository::new(pool.clone());
        let reminders = SqlReminderRepository::new(pool.clone());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 57, 0).unwrap();

        // In the window.
        rides.insert(ride("due", RideStatus::Scheduled)).await.expect("insert due ride");
        // Outside the window.
        let mut later = ride("later", RideStatus::Scheduled);
        later.pickup_time = now + Duration::hours(6);
        rides.insert(later).await.expect("insert later ride");
        // In the window but already reminded.
        let mut reminded = ride("reminded", RideStatus::Confirmed);
        reminded.pickup_time = now + Duration::minutes(2);
        rides.insert(reminded).await.expect("insert reminded ride");
        let insert = reminders
            .insert(ReminderRecord {
                id: ReminderRecordId("rem1".to_string()),
                ride_id: RideId("reminded".to_string()),
                kind: ReminderKind::FiveMinute,
                message_sent: "already done".to_string(),
                sent_at: now,
            })
            .await
            .expect("insert reminder");
        assert_eq!(insert, ReminderInsert::Recorded);

        let due = rides
            .due_for_reminder(
                &HotelId("h1".to_string()),
                ReminderKind::FiveMinute,
                now,
                now + Duration::minutes(5),
            )
            .await
            .expect("query due");

        assert_eq!(due.iter().map(|ride| ride.id.0.as_str()).collect::<Vec<_>>(), vec!["due"]);
        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_by_status_and_hotel() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());

        repo.insert(ride("r1", RideStatus::Scheduled)).await.expect("insert r1");
        repo.insert(ride("r2", RideStatus::Cancelled)).await.expect("insert r2");

        let scheduled = repo
            .list(RideFilter {
                hotel_id: Some(HotelId("h1".to_string())),
                status: Some(RideStatus::Scheduled),
                ..RideFilter::default()
            })
            .await
            .expect("list");

        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id.0, "r1");
        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_status_in_storage_is_a_decode_error() {
        let pool = pool_with_fixture().await;
        let repo = SqlRideRepository::new(pool.clone());

        repo.insert(ride("r1", RideStatus::Scheduled)).await.expect("insert ride");
        sqlx::query("UPDATE rides SET status = 'teleporting' WHERE id = 'r1'")
            .execute(&pool)
            .await
            .expect("corrupt status");

        let result = repo.find_by_id(&RideId("r1".to_string())).await;
        assert!(matches!(result, Err(RepositoryError::Decode(_))));
        pool.close().await;
    }
}
