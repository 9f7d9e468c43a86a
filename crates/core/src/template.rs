use chrono::{DateTime, Utc};

use crate::domain::driver::Driver;
use crate::domain::guest::Guest;
use crate::domain::reminder::ReminderKind;
use crate::domain::ride::Ride;

pub const DEFAULT_TEMPLATES: &[(ReminderKind, &str)] = &[
    (
        ReminderKind::FiveMinute,
        "Your driver will arrive in 5 minutes at {pickup_location}. Please make your way to the pickup area.",
    ),
    (
        ReminderKind::FifteenMinute,
        "Reminder: Your ride is scheduled for {pickup_time}. Your driver will meet you at {pickup_location}.",
    ),
    (ReminderKind::DriverArrived, "Your driver has arrived and is waiting at {pickup_location}."),
    (ReminderKind::DriverEnroute, "Your driver is on the way. Estimated arrival: {eta} minutes."),
];

pub fn default_template(kind: ReminderKind) -> &'static str {
    DEFAULT_TEMPLATES
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, template)| *template)
        .unwrap_or(DEFAULT_TEMPLATES[0].1)
}

/// Field values available to message templates. Absent fields render
/// human-friendly defaults rather than leaving a hole in the message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderContext {
    pub guest_name: Option<String>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub driver_name: Option<String>,
    pub room_number: Option<String>,
    pub eta_minutes: Option<u32>,
    pub passenger_count: Option<u32>,
}

impl RenderContext {
    pub fn from_ride(ride: &Ride, guest: Option<&Guest>, driver: Option<&Driver>) -> Self {
        Self {
            guest_name: guest.map(|guest| guest.name.clone()),
            pickup_location: Some(ride.pickup_location.clone()),
            dropoff_location: Some(ride.dropoff_location.clone()),
            pickup_time: Some(ride.pickup_time),
            driver_name: driver.map(|driver| driver.name.clone()),
            room_number: guest.and_then(|guest| guest.room_number.clone()),
            eta_minutes: None,
            passenger_count: Some(ride.passenger_count),
        }
    }
}

pub fn format_clock_time(at: DateTime<Utc>) -> String {
    at.format("%-I:%M %p").to_string()
}

pub fn format_short_date(at: DateTime<Utc>) -> String {
    at.format("%a %b %-d").to_string()
}

pub fn format_date_and_time(at: DateTime<Utc>) -> String {
    format!("{} at {}", format_short_date(at), format_clock_time(at))
}

/// Substitutes the known placeholder tokens into `template`.
///
/// Unknown placeholders pass through verbatim, and a string with no tokens
/// left renders to itself, so the pass is idempotent.
pub fn render_template(template: &str, context: &RenderContext) -> String {
    let pickup_time = context.pickup_time.map(format_clock_time).unwrap_or_default();
    let pickup_date = context.pickup_time.map(format_short_date).unwrap_or_default();

    let replacements: [(&str, String); 9] = [
        ("{guest_name}", context.guest_name.clone().unwrap_or_else(|| "Guest".to_string())),
        (
            "{pickup_location}",
            context.pickup_location.clone().unwrap_or_else(|| "the lobby".to_string()),
        ),
        (
            "{dropoff_location}",
            context.dropoff_location.clone().unwrap_or_else(|| "your destination".to_string()),
        ),
        ("{pickup_time}", pickup_time),
        ("{pickup_date}", pickup_date),
        ("{driver_name}", context.driver_name.clone().unwrap_or_else(|| "Your driver".to_string())),
        ("{room_number}", context.room_number.clone().unwrap_or_default()),
        ("{eta}", context.eta_minutes.unwrap_or(5).to_string()),
        ("{passenger_count}", context.passenger_count.unwrap_or(1).to_string()),
    ];

    let mut message = template.to_string();
    for (token, value) in replacements {
        if message.contains(token) {
            message = message.replace(token, &value);
        }
    }
    message
}
