use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use curbside_core::domain::ride::Ride;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar sync failed: {0}")]
    Sync(String),
}

/// Best-effort calendar collaborator. Ride flows call this after the
/// primary mutation commits; failures are logged and never fail the
/// request that triggered them.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Creates or refreshes the event for a ride, returning the provider
    /// event id when one was assigned.
    async fn upsert_event(&self, ride: &Ride) -> Result<Option<String>, CalendarError>;
    async fn delete_event(&self, ride: &Ride) -> Result<(), CalendarError>;
}

#[derive(Default)]
pub struct NoopCalendarSync;

#[async_trait]
impl CalendarSync for NoopCalendarSync {
    async fn upsert_event(&self, ride: &Ride) -> Result<Option<String>, CalendarError> {
        debug!(ride_id = %ride.id.0, "calendar sync disabled; skipping upsert");
        Ok(None)
    }

    async fn delete_event(&self, ride: &Ride) -> Result<(), CalendarError> {
        debug!(ride_id = %ride.id.0, "calendar sync disabled; skipping delete");
        Ok(())
    }
}

/// Fire-and-log wrapper used by the ride routes.
pub async fn sync_ride_best_effort(calendar: &dyn CalendarSync, ride: &Ride) {
    if ride.driver_id.is_none() {
        return;
    }
    if let Err(error) = calendar.upsert_event(ride).await {
        warn!(ride_id = %ride.id.0, error = %error, "calendar sync failed; continuing");
    }
}

pub async fn delete_ride_best_effort(calendar: &dyn CalendarSync, ride: &Ride) {
    if ride.calendar_event_id.is_none() {
        return;
    }
    if let Err(error) = calendar.delete_event(ride).await {
        warn!(ride_id = %ride.id.0, error = %error, "calendar delete failed; continuing");
    }
}
