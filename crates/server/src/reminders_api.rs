use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use curbside_core::domain::hotel::{HotelId, ReminderSettings};
use curbside_core::domain::reminder::ReminderKind;
use curbside_core::domain::ride::RideId;
use curbside_core::template::{render_template, RenderContext, DEFAULT_TEMPLATES};
use curbside_db::repositories::{
    DriverRepository, GuestRepository, HotelRepository, ReminderRepository, RideRepository,
};

use crate::guests::{error_response, repository_failure};
use crate::scheduler::{ReminderOutcome, ReminderSendError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reminders/hotel/{hotel_id}/settings", get(get_settings).put(put_settings))
        .route("/api/reminders/hotel/{hotel_id}/pending", get(pending))
        .route("/api/reminders/preview", post(preview))
        .route("/api/reminders/send/{ride_id}", post(send))
        .route("/api/reminders/ride/{ride_id}/history", get(history))
        .route("/api/reminders/variables", get(variables))
}

async fn get_settings(State(state): State<AppState>, Path(hotel_id): Path<String>) -> Response {
    match state.hotels.reminder_settings(&HotelId(hotel_id)).await {
        Ok(settings) => {
            // A hotel that never saved settings still gets the defaults.
            let settings = settings.unwrap_or_default();
            (StatusCode::OK, Json(json!({ "settings": settings }))).into_response()
        }
        Err(error) => repository_failure("fetch reminder settings", error),
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub enabled: Option<bool>,
    pub lead_time_minutes: Option<u32>,
    pub templates: Option<BTreeMap<String, String>>,
}

async fn put_settings(
    State(state): State<AppState>,
    Path(hotel_id): Path<String>,
    Json(request): Json<SettingsRequest>,
) -> Response {
    let settings = ReminderSettings {
        enabled: request.enabled.unwrap_or(true),
        lead_time_minutes: request.lead_time_minutes.unwrap_or(5),
        templates: request.templates.unwrap_or_default(),
    };

    match state.hotels.save_reminder_settings(&HotelId(hotel_id), settings).await {
        Ok(true) => {
            (StatusCode::OK, Json(json!({ "message": "Settings saved successfully" })))
                .into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Hotel not found"),
        Err(error) => repository_failure("save reminder settings", error),
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub template: String,
    pub ride_id: Option<String>,
}

async fn preview(State(state): State<AppState>, Json(request): Json<PreviewRequest>) -> Response {
    if let Some(ride_id) = &request.ride_id {
        match state.rides.find_by_id(&RideId(ride_id.clone())).await {
            Ok(Some(ride)) => {
                let guest = match state.guests.find_by_id(&ride.guest_id).await {
                    Ok(guest) => guest,
                    Err(error) => return repository_failure("load guest for preview", error),
                };
                let driver = match &ride.driver_id {
                    Some(driver_id) => match state.drivers.find_by_id(driver_id).await {
                        Ok(driver) => driver,
                        Err(error) => {
                            return repository_failure("load driver for preview", error)
                        }
                    },
                    None => None,
                };

                let context = RenderContext::from_ride(&ride, guest.as_ref(), driver.as_ref());
                let message = render_template(&request.template, &context);
                return (StatusCode::OK, Json(json!({ "preview": message }))).into_response();
            }
            Ok(None) => {}
            Err(error) => return repository_failure("load ride for preview", error),
        }
    }

    // No ride to draw from: render against representative sample data.
    let context = RenderContext {
        guest_name: Some("John Smith".to_string()),
        pickup_location: Some("Hotel Lobby".to_string()),
        dropoff_location: Some("Airport Terminal 1".to_string()),
        pickup_time: Some(Utc::now() + Duration::minutes(5)),
        driver_name: Some("James".to_string()),
        room_number: Some("1204".to_string()),
        eta_minutes: None,
        passenger_count: Some(2),
    };
    let message = render_template(&request.template, &context);
    (StatusCode::OK, Json(json!({ "preview": message }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct SendReminderRequest {
    pub kind: Option<String>,
    pub custom_message: Option<String>,
}

async fn send(
    State(state): State<AppState>,
    Path(ride_id): Path<String>,
    Json(request): Json<SendReminderRequest>,
) -> Response {
    let ride = match state.rides.find_by_id(&RideId(ride_id)).await {
        Ok(Some(ride)) => ride,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Ride not found"),
        Err(error) => return repository_failure("fetch ride", error),
    };

    let engine = state.reminder_engine();
    let now = Utc::now();

    // A caller-supplied message is rendered and logged with the `manual`
    // kind, outside the per-ride dedup rule.
    let (kind, custom_template) = match &request.custom_message {
        Some(custom_message) => (ReminderKind::Manual, Some(custom_message.as_str())),
        None => {
            let kind = match request.kind.as_deref() {
                None => ReminderKind::FiveMinute,
                Some(raw) => match ReminderKind::parse(raw) {
                    Some(kind) => kind,
                    None => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            &format!("Unknown reminder kind `{raw}`"),
                        )
                    }
                },
            };
            (kind, None)
        }
    };

    match engine.send_reminder(&ride, kind, None, custom_template, now).await {
        Ok(ReminderOutcome::Sent { message }) => (
            StatusCode::OK,
            Json(json!({ "message": "Reminder sent successfully", "sent_message": message })),
        )
            .into_response(),
        Ok(ReminderOutcome::AlreadySent) => error_response(
            StatusCode::BAD_REQUEST,
            "Reminder was already sent for this ride",
        ),
        Ok(ReminderOutcome::GuestMissing) => {
            error_response(StatusCode::NOT_FOUND, "Guest not found for ride")
        }
        Err(ReminderSendError::Sms(error)) => {
            error!(error = %error, "manual reminder dispatch failed");
            error_response(StatusCode::BAD_GATEWAY, "Failed to send reminder")
        }
        Err(ReminderSendError::Repository(error)) => {
            repository_failure("record reminder", error)
        }
    }
}

async fn history(State(state): State<AppState>, Path(ride_id): Path<String>) -> Response {
    match state.reminders.history_for_ride(&RideId(ride_id)).await {
        Ok(reminders) => {
            (StatusCode::OK, Json(json!({ "reminders": reminders }))).into_response()
        }
        Err(error) => repository_failure("fetch reminder history", error),
    }
}

/// Upcoming rides over the next day with their sent flag, for the staff
/// dashboard.
async fn pending(State(state): State<AppState>, Path(hotel_id): Path<String>) -> Response {
    let hotel_id = HotelId(hotel_id);
    let settings = match state.hotels.reminder_settings(&hotel_id).await {
        Ok(settings) => settings.unwrap_or_default(),
        Err(error) => return repository_failure("fetch reminder settings", error),
    };

    let now = Utc::now();
    let rides = match state.rides.upcoming_for_hotel(&hotel_id, now, now + Duration::hours(24)).await
    {
        Ok(rides) => rides,
        Err(error) => return repository_failure("fetch pending rides", error),
    };

    let mut entries = Vec::with_capacity(rides.len());
    for ride in rides {
        let reminder_sent = match state
            .reminders
            .exists(&ride.id, ReminderKind::FiveMinute)
            .await
        {
            Ok(sent) => sent,
            Err(error) => return repository_failure("check reminder status", error),
        };

        entries.push(json!({
            "ride": ride,
            "reminder_sent": reminder_sent,
        }));
    }

    (
        StatusCode::OK,
        Json(json!({
            "rides": entries,
            "settings": {
                "enabled": settings.enabled,
                "lead_time_minutes": settings.lead_time_minutes,
            },
        })),
    )
        .into_response()
}

async fn variables() -> Response {
    let defaults: BTreeMap<&str, &str> = DEFAULT_TEMPLATES
        .iter()
        .map(|(kind, template)| (kind.as_str(), *template))
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "variables": [
                { "key": "{guest_name}", "description": "Guest's full name" },
                { "key": "{pickup_location}", "description": "Pickup location" },
                { "key": "{dropoff_location}", "description": "Destination" },
                { "key": "{pickup_time}", "description": "Scheduled pickup time" },
                { "key": "{pickup_date}", "description": "Scheduled pickup date" },
                { "key": "{driver_name}", "description": "Assigned driver's name" },
                { "key": "{room_number}", "description": "Guest's room number" },
                { "key": "{eta}", "description": "Estimated time of arrival" },
                { "key": "{passenger_count}", "description": "Number of passengers" },
            ],
            "default_templates": defaults,
        })),
    )
        .into_response()
}
