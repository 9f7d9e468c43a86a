use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ride::RideId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderRecordId(pub String);

impl ReminderRecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    FiveMinute,
    FifteenMinute,
    DriverArrived,
    DriverEnroute,
    Manual,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinute => "five_minute",
            Self::FifteenMinute => "fifteen_minute",
            Self::DriverArrived => "driver_arrived",
            Self::DriverEnroute => "driver_enroute",
            Self::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "five_minute" => Some(Self::FiveMinute),
            "fifteen_minute" => Some(Self::FifteenMinute),
            "driver_arrived" => Some(Self::DriverArrived),
            "driver_enroute" => Some(Self::DriverEnroute),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Manual sends are exempt from the per-ride uniqueness rule; every
    /// scheduled kind is sent at most once per ride.
    pub fn deduplicated(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

/// An append-only record that a reminder went out. Existence of a row is the
/// sole source of truth for "already sent".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: ReminderRecordId,
    pub ride_id: RideId,
    pub kind: ReminderKind,
    pub message_sent: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ReminderKind;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            ReminderKind::FiveMinute,
            ReminderKind::FifteenMinute,
            ReminderKind::DriverArrived,
            ReminderKind::DriverEnroute,
            ReminderKind::Manual,
        ] {
            assert_eq!(ReminderKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn only_manual_kind_escapes_dedup() {
        assert!(ReminderKind::FiveMinute.deduplicated());
        assert!(!ReminderKind::Manual.deduplicated());
    }
}
