use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::driver::DriverId;
use crate::domain::guest::GuestId;
use crate::domain::hotel::HotelId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RideId(pub String);

impl RideId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Self::Scheduled),
            "confirmed" => Some(Self::Confirmed),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Statuses for which the guest conversation still refers to a live ride.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses eligible for pre-departure reminders.
    pub fn awaiting_pickup(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub guest_id: GuestId,
    pub driver_id: Option<DriverId>,
    pub hotel_id: HotelId,
    pub pickup_time: DateTime<Utc>,
    pub pickup_location: String,
    pub pickup_notes: Option<String>,
    pub dropoff_location: String,
    pub dropoff_notes: Option<String>,
    pub passenger_count: u32,
    pub status: RideStatus,
    pub driver_departed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub special_requests: Option<String>,
    pub calendar_event_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        matches!(
            (&self.status, next),
            (RideStatus::Scheduled, RideStatus::Confirmed)
                | (RideStatus::Scheduled, RideStatus::InProgress)
                | (RideStatus::Confirmed, RideStatus::InProgress)
                | (RideStatus::InProgress, RideStatus::Completed)
                | (RideStatus::Scheduled, RideStatus::Cancelled)
                | (RideStatus::Confirmed, RideStatus::Cancelled)
                | (RideStatus::InProgress, RideStatus::Cancelled)
        )
    }

    /// Applies a lifecycle transition, stamping departure/completion times.
    /// Cancelled and completed rides never re-enter the active lifecycle.
    pub fn transition_to(&mut self, next: RideStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidRideTransition { from: self.status, to: next });
        }

        match next {
            RideStatus::InProgress => self.driver_departed_at = Some(now),
            RideStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::guest::GuestId;
    use crate::domain::hotel::HotelId;

    use super::{Ride, RideId, RideStatus};

    fn ride(status: RideStatus) -> Ride {
        let now = Utc::now();
        Ride {
            id: RideId("R-1".to_string()),
            guest_id: GuestId("G-1".to_string()),
            driver_id: None,
            hotel_id: HotelId("H-1".to_string()),
            pickup_time: now,
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

    #[test]
    fn allows_full_lifecycle() {
        let now = Utc::now();
        let mut ride = ride(RideStatus::Scheduled);
        ride.transition_to(RideStatus::Confirmed, now).expect("scheduled -> confirmed");
        ride.transition_to(RideStatus::InProgress, now).expect("confirmed -> in_progress");
        ride.transition_to(RideStatus::Completed, now).expect("in_progress -> completed");

        assert_eq!(ride.status, RideStatus::Completed);
        assert_eq!(ride.driver_departed_at, Some(now));
        assert_eq!(ride.completed_at, Some(now));
    }

    #[test]
    fn cancelled_rides_do_not_resurrect() {
        let now = Utc::now();
        let mut ride = ride(RideStatus::Cancelled);
        let error =
            ride.transition_to(RideStatus::Scheduled, now).expect_err("cancel is terminal");
        assert!(matches!(error, crate::errors::DomainError::InvalidRideTransition { .. }));
    }

    #[test]
    fn completed_rides_cannot_be_cancelled() {
        let now = Utc::now();
        let mut ride = ride(RideStatus::Completed);
        assert!(ride.transition_to(RideStatus::Cancelled, now).is_err());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RideStatus::Scheduled,
            RideStatus::Confirmed,
            RideStatus::InProgress,
            RideStatus::Completed,
            RideStatus::Cancelled,
        ] {
            assert_eq!(RideStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RideStatus::parse("resurrected"), None);
    }
}
