use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use curbside_core::domain::driver::{Driver, DriverId};
use curbside_core::domain::guest::{Guest, GuestId};
use curbside_core::domain::hotel::{Hotel, HotelId, ReminderSettings};
use curbside_core::domain::message::Message;
use curbside_core::domain::reminder::{ReminderKind, ReminderRecord};
use curbside_core::domain::ride::{Ride, RideId, RideStatus};

use super::{
    DriverRepository, GuestRepository, HotelRepository, MessageRepository, ReminderInsert,
    ReminderRepository, RepositoryError, RideFilter, RideRepository,
};

#[derive(Default)]
pub struct InMemoryGuestRepository {
    guests: RwLock<HashMap<String, Guest>>,
}

#[async_trait::async_trait]
impl GuestRepository for InMemoryGuestRepository {
    async fn insert(&self, guest: Guest) -> Result<(), RepositoryError> {
        self.guests.write().await.insert(guest.id.0.clone(), guest);
        Ok(())
    }

    async fn update(&self, guest: Guest) -> Result<(), RepositoryError> {
        self.guests.write().await.insert(guest.id.0.clone(), guest);
        Ok(())
    }

    async fn find_by_id(&self, id: &GuestId) -> Result<Option<Guest>, RepositoryError> {
        Ok(self.guests.read().await.get(&id.0).cloned())
    }

    async fn find_latest_by_phone(&self, phone: &str) -> Result<Option<Guest>, RepositoryError> {
        let guests = self.guests.read().await;
        Ok(guests
            .values()
            .filter(|guest| guest.phone == phone)
            .max_by_key(|guest| guest.created_at)
            .cloned())
    }

    async fn find_by_phone_and_hotel(
        &self,
        phone: &str,
        hotel_id: &HotelId,
    ) -> Result<Option<Guest>, RepositoryError> {
        let guests = self.guests.read().await;
        Ok(guests
            .values()
            .filter(|guest| guest.phone == phone && guest.hotel_id == *hotel_id)
            .max_by_key(|guest| guest.created_at)
            .cloned())
    }

    async fn merge_preferences(
        &self,
        id: &GuestId,
        patch: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RepositoryError> {
        let mut guests = self.guests.write().await;
        let Some(guest) = guests.get_mut(&id.0) else {
            return Ok(None);
        };

        if let (serde_json::Value::Object(target), serde_json::Value::Object(source)) =
            (&mut guest.preferences, patch)
        {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        guest.updated_at = now;
        Ok(Some(guest.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryDriverRepository {
    drivers: RwLock<HashMap<String, Driver>>,
}

#[async_trait::async_trait]
impl DriverRepository for InMemoryDriverRepository {
    async fn insert(&self, driver: Driver) -> Result<(), RepositoryError> {
        self.drivers.write().await.insert(driver.id.0.clone(), driver);
        Ok(())
    }

    async fn find_by_id(&self, id: &DriverId) -> Result<Option<Driver>, RepositoryError> {
        Ok(self.drivers.read().await.get(&id.0).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Driver>, RepositoryError> {
        let drivers = self.drivers.read().await;
        Ok(drivers.values().find(|driver| driver.phone == phone).cloned())
    }

    async fn first_active_for_hotel(
        &self,
        hotel_id: &HotelId,
    ) -> Result<Option<Driver>, RepositoryError> {
        let drivers = self.drivers.read().await;
        Ok(drivers
            .values()
            .filter(|driver| driver.hotel_id == *hotel_id && driver.is_active)
            .min_by_key(|driver| driver.created_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRideRepository {
    rides: RwLock<HashMap<String, Ride>>,
}

impl InMemoryRideRepository {
    async fn reminded_ride_ids(reminders: &InMemoryReminderRepository, kind: ReminderKind) -> Vec<String> {
        let records = reminders.records.read().await;
        records
            .iter()
            .filter(|record| record.kind == kind)
            .map(|record| record.ride_id.0.clone())
            .collect()
    }

    /// Companion to `due_for_reminder` for tests that pair this repository
    /// with [`InMemoryReminderRepository`].
    pub async fn due_for_reminder_with(
        &self,
        reminders: &InMemoryReminderRepository,
        hotel_id: &HotelId,
        kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<Ride> {
        let reminded = Self::reminded_ride_ids(reminders, kind).await;
        let rides = self.rides.read().await;
        let mut due: Vec<Ride> = rides
            .values()
            .filter(|ride| {
                ride.hotel_id == *hotel_id
                    && ride.status.awaiting_pickup()
                    && ride.pickup_time > window_start
                    && ride.pickup_time <= window_end
                    && !reminded.contains(&ride.id.0)
            })
            .cloned()
            .collect();
        due.sort_by_key(|ride| ride.pickup_time);
        due
    }
}

#[async_trait::async_trait]
impl RideRepository for InMemoryRideRepository {
    async fn insert(&self, ride: Ride) -> Result<(), RepositoryError> {
        self.rides.write().await.insert(ride.id.0.clone(), ride);
        Ok(())
    }

    async fn update(&self, ride: Ride) -> Result<(), RepositoryError> {
        self.rides.write().await.insert(ride.id.0.clone(), ride);
        Ok(())
    }

    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RepositoryError> {
        Ok(self.rides.read().await.get(&id.0).cloned())
    }

    async fn current_active_for_guest(
        &self,
        guest_id: &GuestId,
    ) -> Result<Option<Ride>, RepositoryError> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .filter(|ride| ride.guest_id == *guest_id && ride.status.is_active())
            .min_by_key(|ride| ride.pickup_time)
            .cloned())
    }

    async fn earliest_active_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<Ride>, RepositoryError> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .filter(|ride| {
                ride.driver_id.as_ref() == Some(driver_id) && ride.status.is_active()
            })
            .min_by_key(|ride| ride.pickup_time)
            .cloned())
    }

    async fn list(&self, filter: RideFilter) -> Result<Vec<Ride>, RepositoryError> {
        let rides = self.rides.read().await;
        let mut matched: Vec<Ride> = rides
            .values()
            .filter(|ride| {
                filter.hotel_id.as_ref().map_or(true, |hotel| ride.hotel_id == *hotel)
                    && filter.driver_id.as_ref().map_or(true, |driver| {
                        ride.driver_id.as_ref() == Some(driver)
                    })
                    && filter.guest_id.as_ref().map_or(true, |guest| ride.guest_id == *guest)
                    && filter.status.map_or(true, |status| ride.status == status)
                    && filter.pickup_after.map_or(true, |after| ride.pickup_time >= after)
                    && filter.pickup_before.map_or(true, |before| ride.pickup_time <= before)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|ride| ride.pickup_time);
        Ok(matched)
    }

    async fn set_pickup_time(
        &self,
        id: &RideId,
        pickup_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut rides = self.rides.write().await;
        match rides.get_mut(&id.0) {
            Some(ride) if ride.status.is_active() => {
                ride.pickup_time = pickup_time;
                ride.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_status(
        &self,
        id: &RideId,
        next: RideStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut rides = self.rides.write().await;
        match rides.get_mut(&id.0) {
            Some(ride) => Ok(ride.transition_to(next, now).is_ok()),
            None => Ok(false),
        }
    }

    async fn due_for_reminder(
        &self,
        hotel_id: &HotelId,
        _kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError> {
        // The in-memory store keeps reminders separately; without them the
        // dedup filter is the caller's job (see `due_for_reminder_with`).
        let rides = self.rides.read().await;
        let mut due: Vec<Ride> = rides
            .values()
            .filter(|ride| {
                ride.hotel_id == *hotel_id
                    && ride.status.awaiting_pickup()
                    && ride.pickup_time > window_start
                    && ride.pickup_time <= window_end
            })
            .cloned()
            .collect();
        due.sort_by_key(|ride| ride.pickup_time);
        Ok(due)
    }

    async fn upcoming_for_hotel(
        &self,
        hotel_id: &HotelId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Ride>, RepositoryError> {
        let rides = self.rides.read().await;
        let mut upcoming: Vec<Ride> = rides
            .values()
            .filter(|ride| {
                ride.hotel_id == *hotel_id
                    && ride.status.awaiting_pickup()
                    && ride.pickup_time > from
                    && ride.pickup_time <= until
            })
            .cloned()
            .collect();
        upcoming.sort_by_key(|ride| ride.pickup_time);
        Ok(upcoming)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn history_for_guest(
        &self,
        guest_id: &GuestId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut history: Vec<Message> = messages
            .iter()
            .filter(|message| message.guest_id == *guest_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(limit as usize);
        Ok(history)
    }
}

#[derive(Default)]
pub struct InMemoryReminderRepository {
    records: RwLock<Vec<ReminderRecord>>,
}

impl InMemoryReminderRepository {
    pub async fn all(&self) -> Vec<ReminderRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn insert(&self, record: ReminderRecord) -> Result<ReminderInsert, RepositoryError> {
        let mut records = self.records.write().await;
        let duplicate = record.kind.deduplicated()
            && records
                .iter()
                .any(|existing| {
                    existing.ride_id == record.ride_id && existing.kind == record.kind
                });
        if duplicate {
            return Ok(ReminderInsert::AlreadySent);
        }

        records.push(record);
        Ok(ReminderInsert::Recorded)
    }

    async fn exists(
        &self,
        ride_id: &RideId,
        kind: ReminderKind,
    ) -> Result<bool, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().any(|record| record.ride_id == *ride_id && record.kind == kind))
    }

    async fn history_for_ride(
        &self,
        ride_id: &RideId,
    ) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut history: Vec<ReminderRecord> =
            records.iter().filter(|record| record.ride_id == *ride_id).cloned().collect();
        history.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(history)
    }
}

#[derive(Default)]
pub struct InMemoryHotelRepository {
    hotels: RwLock<HashMap<String, Hotel>>,
}

#[async_trait::async_trait]
impl HotelRepository for InMemoryHotelRepository {
    async fn insert(&self, hotel: Hotel) -> Result<(), RepositoryError> {
        self.hotels.write().await.insert(hotel.id.0.clone(), hotel);
        Ok(())
    }

    async fn find_by_id(&self, id: &HotelId) -> Result<Option<Hotel>, RepositoryError> {
        Ok(self.hotels.read().await.get(&id.0).cloned())
    }

    async fn reminder_settings(
        &self,
        id: &HotelId,
    ) -> Result<Option<ReminderSettings>, RepositoryError> {
        Ok(self.hotels.read().await.get(&id.0).map(|hotel| hotel.reminder_settings.clone()))
    }

    async fn save_reminder_settings(
        &self,
        id: &HotelId,
        settings: ReminderSettings,
    ) -> Result<bool, RepositoryError> {
        let mut hotels = self.hotels.write().await;
        match hotels.get_mut(&id.0) {
            Some(hotel) => {
                hotel.reminder_settings = settings;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reminder_enabled(&self) -> Result<Vec<Hotel>, RepositoryError> {
        let hotels = self.hotels.read().await;
        let mut enabled: Vec<Hotel> =
            hotels.values().filter(|hotel| hotel.reminder_settings.enabled).cloned().collect();
        enabled.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(enabled)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use curbside_core::domain::guest::GuestId;
    use curbside_core::domain::hotel::HotelId;
    use curbside_core::domain::reminder::{ReminderKind, ReminderRecord, ReminderRecordId};
    use curbside_core::domain::ride::{Ride, RideId, RideStatus};

    use crate::repositories::{ReminderInsert, ReminderRepository, RideRepository};

    use super::{InMemoryReminderRepository, InMemoryRideRepository};

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
            passenger_count: 1,
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
    async fn in_memory_dedup_matches_sql_semantics() {
        let repo = InMemoryReminderRepository::default();
        let record = ReminderRecord {
            id: ReminderRecordId("rem1".to_string()),
            ride_id: RideId("r1".to_string()),
            kind: ReminderKind::FiveMinute,
            message_sent: "hello".to_string(),
            sent_at: Utc::now(),
        };

        assert_eq!(repo.insert(record.clone()).await.expect("insert"), ReminderInsert::Recorded);
        assert_eq!(
            repo.insert(ReminderRecord { id: ReminderRecordId("rem2".to_string()), ..record })
                .await
                .expect("insert"),
            ReminderInsert::AlreadySent
        );
    }

    #[tokio::test]
    async fn guarded_transition_matches_sql_semantics() {
        let repo = InMemoryRideRepository::default();
        repo.insert(ride("r1", RideStatus::Cancelled)).await.expect("insert ride");

        let changed = repo
            .transition_status(&RideId("r1".to_string()), RideStatus::Confirmed, Utc::now())
            .await
            .expect("transition");
        assert!(!changed);
    }

    #[tokio::test]
    async fn paired_due_query_filters_reminded_rides() {
        let rides = InMemoryRideRepository::default();
        let reminders = InMemoryReminderRepository::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 57, 0).unwrap();

        rides.insert(ride("due", RideStatus::Scheduled)).await.expect("insert ride");
        let mut reminded = ride("reminded", RideStatus::Scheduled);
        reminded.pickup_time = now + Duration::minutes(2);
        rides.insert(reminded).await.expect("insert ride");
        reminders
            .insert(ReminderRecord {
                id: ReminderRecordId("rem1".to_string()),
                ride_id: RideId("reminded".to_string()),
                kind: ReminderKind::FiveMinute,
                message_sent: "done".to_string(),
                sent_at: now,
            })
            .await
            .expect("insert reminder");

        let due = rides
            .due_for_reminder_with(
                &reminders,
                &HotelId("h1".to_string()),
                ReminderKind::FiveMinute,
                now,
                now + Duration::minutes(5),
            )
            .await;
        assert_eq!(due.iter().map(|ride| ride.id.0.as_str()).collect::<Vec<_>>(), vec!["due"]);
    }
}
