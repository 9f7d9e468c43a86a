use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "hotels",
        "guests",
        "drivers",
        "rides",
        "messages",
        "ride_reminders",
        "idx_guests_phone",
        "idx_guests_hotel_id",
        "idx_drivers_hotel_id",
        "idx_drivers_phone",
        "idx_rides_guest_id",
        "idx_rides_driver_id",
        "idx_rides_hotel_pickup",
        "idx_rides_status",
        "idx_messages_guest_created",
        "idx_messages_ride_id",
        "ux_ride_reminders_dedup",
        "idx_ride_reminders_ride_id",
    ];

    #[tokio::test]
    async fn migrations_create_all_managed_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master \
                 WHERE type IN ('table', 'index') AND name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .expect("check schema object")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected schema object `{object}` to exist");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn dedup_index_rejects_duplicate_scheduled_kinds_only() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO hotels (id, name, created_at) VALUES ('h1', 'Test Hotel', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert hotel");
        sqlx::query(
            "INSERT INTO guests (id, hotel_id, name, phone, created_at, updated_at) \
             VALUES ('g1', 'h1', 'Ava', '+15551234567', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert guest");
        sqlx::query(
            "INSERT INTO rides (id, guest_id, hotel_id, pickup_time, pickup_location, dropoff_location, created_at, updated_at) \
             VALUES ('r1', 'g1', 'h1', '2024-01-01T10:00:00+00:00', 'Lobby', 'Airport', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert ride");

        let insert_reminder = |id: &'static str, kind: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "INSERT INTO ride_reminders (id, ride_id, reminder_kind, message_sent, sent_at) \
                     VALUES (?, 'r1', ?, 'hello', '2024-01-01T09:55:00+00:00')",
                )
                .bind(id)
                .bind(kind)
                .execute(&pool)
                .await
            }
        };

        insert_reminder("rem1", "five_minute").await.expect("first five_minute insert");
        let duplicate = insert_reminder("rem2", "five_minute").await;
        assert!(duplicate.is_err(), "second five_minute insert should violate the index");

        insert_reminder("rem3", "manual").await.expect("first manual insert");
        insert_reminder("rem4", "manual").await.expect("second manual insert is allowed");

        pool.close().await;
    }
}
