use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::hotel::HotelId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestId(pub String);

impl GuestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A registered hotel guest. `phone` is always stored normalized so that
/// inbound webhook lookups can use plain equality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub hotel_id: HotelId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub room_number: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
