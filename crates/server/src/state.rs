use std::sync::Arc;

use curbside_agent::IntentClassifier;
use curbside_core::estimate::DistanceEstimator;
use curbside_db::repositories::{
    DriverRepository, GuestRepository, HotelRepository, MessageRepository, ReminderRepository,
    RideRepository,
};
use curbside_db::DbPool;
use curbside_sms::SmsSender;

use crate::calendar::CalendarSync;
use crate::scheduler::ReminderEngine;

/// Shared handles for every request handler and the scheduler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub guests: Arc<dyn GuestRepository>,
    pub drivers: Arc<dyn DriverRepository>,
    pub rides: Arc<dyn RideRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
    pub hotels: Arc<dyn HotelRepository>,
    pub classifier: Arc<IntentClassifier>,
    pub sms: Arc<dyn SmsSender>,
    pub calendar: Arc<dyn CalendarSync>,
    pub estimator: Arc<dyn DistanceEstimator>,
    /// The provider number outbound messages are sent from; recorded on
    /// every Message row.
    pub from_number: String,
}

impl AppState {
    pub fn reminder_engine(&self) -> ReminderEngine {
        ReminderEngine::new(
            self.hotels.clone(),
            self.rides.clone(),
            self.guests.clone(),
            self.drivers.clone(),
            self.reminders.clone(),
            self.sms.clone(),
        )
    }
}
