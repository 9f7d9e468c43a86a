use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::Intent;
use crate::domain::driver::DriverId;
use crate::domain::guest::GuestId;
use crate::domain::ride::RideId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// One SMS in the conversation log. Rows are written once and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub guest_id: GuestId,
    pub driver_id: Option<DriverId>,
    pub ride_id: Option<RideId>,
    pub direction: MessageDirection,
    pub from_number: String,
    pub to_number: String,
    pub body: String,
    pub ai_handled: bool,
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    pub provider_sid: Option<String>,
    pub created_at: DateTime<Utc>,
}
