use chrono::{DateTime, Duration, Utc};

use crate::classify::Classification;
use crate::classify::Intent;
use crate::domain::guest::Guest;
use crate::domain::ride::Ride;
use crate::template::{format_clock_time, format_date_and_time};

/// Reply sent to phone numbers with no matching guest. The webhook uses
/// this without running classification at all.
pub const NOT_REGISTERED_REPLY: &str = "Welcome to our valet service. It looks like you're not \
     registered yet. Please speak with your hotel concierge to get started.";

const ADJUST_CLARIFICATION: &str =
    "I'd be happy to adjust your pickup time. What time works better for you?";

/// The guest's current ride joined with the assigned driver's contact
/// details, as loaded for one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct RideContext {
    pub ride: Ride,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
}

/// State change the router wants applied to the ride.
#[derive(Clone, Debug, PartialEq)]
pub enum RideMutation {
    Reschedule { pickup_time: DateTime<Utc> },
    Cancel,
}

/// A notification to forward to the assigned driver.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverForward {
    pub to_phone: String,
    pub body: String,
}

/// The routing decision for one inbound message. Pure data; the webhook
/// handler applies the mutation and performs the sends.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePlan {
    pub mutation: Option<RideMutation>,
    pub guest_reply: String,
    pub driver_forward: Option<DriverForward>,
}

/// Decides how to respond to a classified guest message.
///
/// Stateless over `(classification, ride context, now)`: conversation
/// state is not persisted, the current ride is the only context.
pub fn route_message(
    classification: &Classification,
    guest: &Guest,
    ride: Option<&RideContext>,
    message_body: &str,
    now: DateTime<Utc>,
) -> RoutePlan {
    let suggested = classification
        .suggested_response
        .as_deref()
        .filter(|text| !text.trim().is_empty());

    match classification.intent {
        Intent::ScheduleChange => {
            if let Some(context) = ride {
                if let Some(new_time) = classification.extracted_data.new_time {
                    return RoutePlan {
                        mutation: Some(RideMutation::Reschedule { pickup_time: new_time }),
                        guest_reply: format!(
                            "Your ride has been rescheduled to {}. See you then.",
                            format_date_and_time(new_time)
                        ),
                        driver_forward: None,
                    };
                }

                if let Some(adjustment) = classification.extracted_data.time_adjustment.as_deref()
                {
                    if let Some(delta_minutes) = parse_time_adjustment(adjustment) {
                        let new_time =
                            context.ride.pickup_time + Duration::minutes(delta_minutes);
                        return RoutePlan {
                            mutation: Some(RideMutation::Reschedule { pickup_time: new_time }),
                            guest_reply: format!(
                                "Your ride has been moved to {}. See you then.",
                                format_clock_time(new_time)
                            ),
                            driver_forward: None,
                        };
                    }
                }
            }

            RoutePlan {
                mutation: None,
                guest_reply: suggested.unwrap_or(ADJUST_CLARIFICATION).to_string(),
                driver_forward: None,
            }
        }

        Intent::Cancel => RoutePlan {
            mutation: ride.map(|_| RideMutation::Cancel),
            guest_reply: "Your ride has been cancelled. Just text back whenever you'd like to \
                 schedule another."
                .to_string(),
            driver_forward: None,
        },

        Intent::DriverContact => {
            if let Some(context) = ride {
                if let Some(driver_phone) = context.driver_phone.clone() {
                    return RoutePlan {
                        mutation: None,
                        guest_reply: "I've notified your driver. They'll respond shortly."
                            .to_string(),
                        driver_forward: Some(DriverForward {
                            to_phone: driver_phone,
                            body: format_driver_notification(
                                guest,
                                context,
                                message_body,
                                classification,
                            ),
                        }),
                    };
                }
            }

            RoutePlan {
                mutation: None,
                guest_reply: "I'll have someone from our team reach out to you shortly."
                    .to_string(),
                driver_forward: None,
            }
        }

        _ => {
            if classification.needs_human {
                if let Some(context) = ride {
                    if let Some(driver_phone) = context.driver_phone.clone() {
                        return RoutePlan {
                            mutation: None,
                            guest_reply: suggested
                                .unwrap_or("I've forwarded your message to your driver.")
                                .to_string(),
                            driver_forward: Some(DriverForward {
                                to_phone: driver_phone,
                                body: format_driver_notification(
                                    guest,
                                    context,
                                    message_body,
                                    classification,
                                ),
                            }),
                        };
                    }
                }
            }

            RoutePlan {
                mutation: None,
                guest_reply: suggested
                    .map(str::to_owned)
                    .unwrap_or_else(|| canned_reply(classification.intent, ride, now)),
                driver_forward: None,
            }
        }
    }
}

/// Parses a relative pickup adjustment such as "+30 minutes", "-1 hour",
/// or "30 min later" into a signed delta in minutes.
///
/// An explicit `+`/`-` sign wins; "earlier" only negates an unsigned
/// value and "later" never flips one.
pub fn parse_time_adjustment(raw: &str) -> Option<i64> {
    let text = raw.to_ascii_lowercase();
    let tokens: Vec<&str> = text.split_whitespace().collect();

    for (index, token) in tokens.iter().enumerate() {
        let (number_part, suffix) = split_numeric_prefix(token);
        let Ok(value) = number_part.parse::<i64>() else {
            continue;
        };

        let unit = if suffix.is_empty() { tokens.get(index + 1).copied().unwrap_or("") } else { suffix };
        let Some(unit_minutes) = unit_minutes(unit) else {
            continue;
        };

        let explicit_sign = number_part.starts_with('+') || number_part.starts_with('-');
        let signed = if !explicit_sign && text.contains("earlier") { -value } else { value };
        return Some(signed * unit_minutes);
    }

    None
}

fn split_numeric_prefix(token: &str) -> (&str, &str) {
    let mut end = 0;
    for (offset, character) in token.char_indices() {
        let leading_sign = offset == 0 && matches!(character, '+' | '-');
        if leading_sign || character.is_ascii_digit() {
            end = offset + character.len_utf8();
        } else {
            break;
        }
    }
    token.split_at(end)
}

fn unit_minutes(unit: &str) -> Option<i64> {
    match unit.trim_end_matches(|ch: char| !ch.is_ascii_alphanumeric()) {
        "min" | "mins" | "minute" | "minutes" => Some(1),
        "hr" | "hrs" | "hour" | "hours" => Some(60),
        _ => None,
    }
}

/// Fixed reply per intent when the classifier offered no suggestion.
fn canned_reply(intent: Intent, ride: Option<&RideContext>, now: DateTime<Utc>) -> String {
    match intent {
        Intent::EtaQuestion => match ride {
            None => "You don't have any upcoming rides scheduled. Would you like me to arrange \
                 one for you?"
                .to_string(),
            Some(context) => {
                let minutes_until = minutes_until(context.ride.pickup_time, now);
                if minutes_until < 0 {
                    "Your driver should be arriving momentarily. Please proceed to the pickup \
                     location."
                        .to_string()
                } else if minutes_until < 15 {
                    format!(
                        "Your driver will arrive in approximately {} minutes at {}.",
                        minutes_until, context.ride.pickup_location
                    )
                } else {
                    format!(
                        "Your pickup is scheduled for {}. Your driver will arrive at {}.",
                        format_clock_time(context.ride.pickup_time),
                        context.ride.pickup_location
                    )
                }
            }
        },

        Intent::Confirmation => match ride {
            None => "You're all set. Let me know if you need anything.".to_string(),
            Some(context) => format!(
                "Confirmed. Your driver will meet you at {} at {}.",
                context.ride.pickup_location,
                format_clock_time(context.ride.pickup_time)
            ),
        },

        Intent::Thanks => "My pleasure. Have a wonderful ride.".to_string(),

        Intent::LocationQuestion => match ride {
            None => "I don't see an upcoming ride on your schedule. Would you like to arrange \
                 transportation?"
                .to_string(),
            Some(context) => format!(
                "Your pickup location is {}. Your destination is {}.",
                context.ride.pickup_location, context.ride.dropoff_location
            ),
        },

        Intent::Cancel => "I've cancelled your upcoming ride. Just text back anytime you'd like \
             to schedule another."
            .to_string(),

        Intent::ScheduleChange => {
            "I've updated your pickup time. You'll receive a confirmation shortly.".to_string()
        }

        Intent::GeneralQuestion => {
            "Let me connect you with your driver who can better assist.".to_string()
        }

        Intent::DriverContact => "I'm connecting you with your driver now.".to_string(),

        Intent::Unclear => {
            "I'll connect you with your driver who can assist you directly.".to_string()
        }
    }
}

fn minutes_until(pickup_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (pickup_time - now).num_seconds();
    (seconds as f64 / 60.0).round() as i64
}

/// Formats the escalation message forwarded to the assigned driver.
pub fn format_driver_notification(
    guest: &Guest,
    context: &RideContext,
    message_body: &str,
    classification: &Classification,
) -> String {
    format!(
        "Message from {} (Room {}):\n\n\"{}\"\n\nIntent: {}\nRide: {}\n{} → {}",
        guest.name,
        guest.room_number.as_deref().unwrap_or("N/A"),
        message_body,
        classification.intent.as_str(),
        format_date_and_time(context.ride.pickup_time),
        context.ride.pickup_location,
        context.ride.dropoff_location,
    )
}
