use sqlx::{sqlite::SqliteRow, Row};

use curbside_core::domain::driver::{Driver, DriverId};
use curbside_core::domain::hotel::HotelId;

use super::{parse_timestamp, DriverRepository, RepositoryError};
use crate::DbPool;

const DRIVER_COLUMNS: &str = "id, hotel_id, name, phone, vehicle_info, is_active, created_at";

pub struct SqlDriverRepository {
    pool: DbPool,
}

impl SqlDriverRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DriverRepository for SqlDriverRepository {
    async fn insert(&self, driver: Driver) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO drivers (id, hotel_id, name, phone, vehicle_info, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&driver.id.0)
        .bind(&driver.hotel_id.0)
        .bind(&driver.name)
        .bind(&driver.phone)
        .bind(driver.vehicle_info.as_deref())
        .bind(i64::from(driver.is_active))
        .bind(driver.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &DriverId) -> Result<Option<Driver>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(driver_from_row).transpose()
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Driver>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE phone = ? LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(driver_from_row).transpose()
    }

    async fn first_active_for_hotel(
        &self,
        hotel_id: &HotelId,
    ) -> Result<Option<Driver>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers \
             WHERE hotel_id = ? AND is_active = 1 \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(&hotel_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(driver_from_row).transpose()
    }
}

fn driver_from_row(row: SqliteRow) -> Result<Driver, RepositoryError> {
    let created_at: String = row.get("created_at");
    let is_active: i64 = row.get("is_active");

    Ok(Driver {
        id: DriverId(row.get("id")),
        hotel_id: HotelId(row.get("hotel_id")),
        name: row.get("name"),
        phone: row.get("phone"),
        vehicle_info: row.get("vehicle_info"),
        is_active: is_active != 0,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
