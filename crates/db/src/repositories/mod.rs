use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use curbside_core::domain::driver::{Driver, DriverId};
use curbside_core::domain::guest::{Guest, GuestId};
use curbside_core::domain::hotel::{Hotel, HotelId, ReminderSettings};
use curbside_core::domain::message::Message;
use curbside_core::domain::reminder::{ReminderKind, ReminderRecord};
use curbside_core::domain::ride::{Ride, RideId, RideStatus};

pub mod driver;
pub mod guest;
pub mod hotel;
pub mod memory;
pub mod message;
pub mod reminder;
pub mod ride;

pub use driver::SqlDriverRepository;
pub use guest::SqlGuestRepository;
pub use hotel::SqlHotelRepository;
pub use memory::{
    InMemoryDriverRepository, InMemoryGuestRepository, InMemoryHotelRepository,
    InMemoryMessageRepository, InMemoryReminderRepository, InMemoryRideRepository,
};
pub use message::SqlMessageRepository;
pub use reminder::SqlReminderRepository;
pub use ride::SqlRideRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Outcome of recording a reminder. A uniqueness rejection on the
/// (ride, kind) pair is a defined outcome, not an error: somebody else
/// already sent it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderInsert {
    Recorded,
    AlreadySent,
}

#[derive(Clone, Debug, Default)]
pub struct RideFilter {
    pub hotel_id: Option<HotelId>,
    pub driver_id: Option<DriverId>,
    pub guest_id: Option<GuestId>,
    pub status: Option<RideStatus>,
    pub pickup_after: Option<DateTime<Utc>>,
    pub pickup_before: Option<DateTime<Utc>>,
}

pub(crate) fn parse_timestamp(
    raw: &str,
    column: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|value| value.with_timezone(&Utc)).map_err(|error| {
        RepositoryError::Decode(format!("invalid timestamp in `{column}`: {error}"))
    })
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<&str>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(value, column)).transpose()
}

pub(crate) fn parse_date(
    raw: Option<&str>,
    column: &str,
) -> Result<Option<chrono::NaiveDate>, RepositoryError> {
    raw.map(|value| {
        chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|error| {
            RepositoryError::Decode(format!("invalid date in `{column}`: {error}"))
        })
    })
    .transpose()
}

#[async_trait]
pub trait GuestRepository: Send + Sync {
    async fn insert(&self, guest: Guest) -> Result<(), RepositoryError>;
    async fn update(&self, guest: Guest) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &GuestId) -> Result<Option<Guest>, RepositoryError>;
    /// Inbound routing lookup. The most recently created registration wins
    /// when one phone maps to several guests.
    async fn find_latest_by_phone(&self, phone: &str) -> Result<Option<Guest>, RepositoryError>;
    async fn find_by_phone_and_hotel(
        &self,
        phone: &str,
        hotel_id: &HotelId,
    ) -> Result<Option<Guest>, RepositoryError>;
    async fn merge_preferences(
        &self,
        id: &GuestId,
        patch: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RepositoryError>;
}

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn insert(&self, driver: Driver) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &DriverId) -> Result<Option<Driver>, RepositoryError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Driver>, RepositoryError>;
    async fn first_active_for_hotel(
        &self,
        hotel_id: &HotelId,
    ) -> Result<Option<Driver>, RepositoryError>;
}

#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert(&self, ride: Ride) -> Result<(), RepositoryError>;
    async fn update(&self, ride: Ride) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RepositoryError>;
    /// The single "current" ride used as conversation context: the earliest
    /// upcoming ride that is neither completed nor cancelled.
    async fn current_active_for_guest(
        &self,
        guest_id: &GuestId,
    ) -> Result<Option<Ride>, RepositoryError>;
    async fn earliest_active_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<Ride>, RepositoryError>;
    async fn list(&self, filter: RideFilter) -> Result<Vec<Ride>, RepositoryError>;
    /// Guarded reschedule: only applies while the ride is still active.
    async fn set_pickup_time(
        &self,
        id: &RideId,
        pickup_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Guarded status transition: the row is only touched when its current
    /// status permits the move, so concurrent writers cannot resurrect a
    /// terminal ride.
    async fn transition_status(
        &self,
        id: &RideId,
        next: RideStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Rides due a reminder of `kind`: awaiting pickup, departing within
    /// (window_start, window_end], and with no matching reminder row yet.
    async fn due_for_reminder(
        &self,
        hotel_id: &HotelId,
        kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError>;
    async fn upcoming_for_hotel(
        &self,
        hotel_id: &HotelId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError>;
    async fn history_for_guest(
        &self,
        guest_id: &GuestId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn insert(&self, record: ReminderRecord) -> Result<ReminderInsert, RepositoryError>;
    async fn exists(&self, ride_id: &RideId, kind: ReminderKind)
        -> Result<bool, RepositoryError>;
    async fn history_for_ride(
        &self,
        ride_id: &RideId,
    ) -> Result<Vec<ReminderRecord>, RepositoryError>;
}

#[async_trait]
pub trait HotelRepository: Send + Sync {
    async fn insert(&self, hotel: Hotel) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &HotelId) -> Result<Option<Hotel>, RepositoryError>;
    async fn reminder_settings(
        &self,
        id: &HotelId,
    ) -> Result<Option<ReminderSettings>, RepositoryError>;
    async fn save_reminder_settings(
        &self,
        id: &HotelId,
        settings: ReminderSettings,
    ) -> Result<bool, RepositoryError>;
    async fn list_reminder_enabled(&self) -> Result<Vec<Hotel>, RepositoryError>;
}
