use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use curbside_core::domain::driver::DriverId;
use curbside_core::domain::guest::GuestId;
use curbside_core::domain::hotel::HotelId;
use curbside_core::domain::ride::{Ride, RideId, RideStatus};
use curbside_core::template::format_date_and_time;
use curbside_db::repositories::{
    DriverRepository, GuestRepository, RideFilter, RideRepository,
};
use curbside_sms::SmsSender;

use crate::calendar::{delete_ride_best_effort, sync_ride_best_effort};
use crate::guests::{error_response, repository_failure};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rides", get(list).post(create))
        .route("/api/rides/{id}", get(get_by_id).patch(update).delete(cancel))
}

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub guest_id: String,
    pub driver_id: Option<String>,
    pub hotel_id: String,
    pub pickup_time: DateTime<Utc>,
    pub pickup_location: String,
    pub pickup_notes: Option<String>,
    pub dropoff_location: String,
    pub dropoff_notes: Option<String>,
    pub passenger_count: Option<u32>,
    pub special_requests: Option<String>,
    pub created_by: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateRideRequest>,
) -> Response {
    if request.guest_id.trim().is_empty()
        || request.hotel_id.trim().is_empty()
        || request.pickup_location.trim().is_empty()
        || request.dropoff_location.trim().is_empty()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: guest_id, hotel_id, pickup_time, pickup_location, dropoff_location",
        );
    }

    let hotel_id = HotelId(request.hotel_id.clone());

    // No driver requested: hand the ride to the first active driver.
    let driver_id = match &request.driver_id {
        Some(driver_id) => Some(DriverId(driver_id.clone())),
        None => match state.drivers.first_active_for_hotel(&hotel_id).await {
            Ok(driver) => driver.map(|driver| driver.id),
            Err(error) => return repository_failure("assign driver", error),
        },
    };

    let now = Utc::now();
    let ride = Ride {
        id: RideId::generate(),
        guest_id: GuestId(request.guest_id.clone()),
        driver_id,
        hotel_id,
        pickup_time: request.pickup_time,
        pickup_location: request.pickup_location,
        pickup_notes: request.pickup_notes,
        dropoff_location: request.dropoff_location,
        dropoff_notes: request.dropoff_notes,
        passenger_count: request.passenger_count.unwrap_or(1),
        status: RideStatus::Scheduled,
        driver_departed_at: None,
        completed_at: None,
        special_requests: request.special_requests,
        calendar_event_id: None,
        created_by: request.created_by.unwrap_or_else(|| "guest".to_string()),
        created_at: now,
        updated_at: now,
    };

    if let Err(error) = state.rides.insert(ride.clone()).await {
        return repository_failure("create ride", error);
    }

    sync_ride_best_effort(state.calendar.as_ref(), &ride).await;
    confirm_to_guest(&state, &ride).await;

    (StatusCode::CREATED, Json(json!({ "ride": ride }))).into_response()
}

/// Booking confirmation is best-effort: the ride exists either way and the
/// guest can always text in.
async fn confirm_to_guest(state: &AppState, ride: &Ride) {
    let guest = match state.guests.find_by_id(&ride.guest_id).await {
        Ok(Some(guest)) => guest,
        Ok(None) => return,
        Err(error) => {
            warn!(error = %error, "could not load guest for booking confirmation");
            return;
        }
    };

    let body = format!(
        "Your ride is confirmed for {}.\n\nPickup: {}\nDestination: {}\n\n\
         Reply to this number anytime to make changes or ask questions.",
        format_date_and_time(ride.pickup_time),
        ride.pickup_location,
        ride.dropoff_location,
    );
    if let Err(error) = state.sms.send(&guest.phone, &body).await {
        warn!(error = %error, "booking confirmation sms failed");
    }
}

#[derive(Debug, Deserialize)]
pub struct RideListQuery {
    pub hotel_id: Option<String>,
    pub driver_id: Option<String>,
    pub guest_id: Option<String>,
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

async fn list(State(state): State<AppState>, Query(query): Query<RideListQuery>) -> Response {
    let status = match query.status.as_deref() {
        Some(raw) => match RideStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Unknown ride status `{raw}`"),
                )
            }
        },
        None => None,
    };

    let (pickup_after, pickup_before) = match query.date {
        Some(date) => {
            let day_start = date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            (day_start, day_start.map(|start| start + Duration::days(1)))
        }
        None => (query.start_date, query.end_date),
    };

    let filter = RideFilter {
        hotel_id: query.hotel_id.map(HotelId),
        driver_id: query.driver_id.map(DriverId),
        guest_id: query.guest_id.map(GuestId),
        status,
        pickup_after,
        pickup_before,
    };

    match state.rides.list(filter).await {
        Ok(rides) => (StatusCode::OK, Json(json!({ "rides": rides }))).into_response(),
        Err(error) => repository_failure("fetch rides", error),
    }
}

async fn get_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rides.find_by_id(&RideId(id)).await {
        Ok(Some(ride)) => (StatusCode::OK, Json(json!({ "ride": ride }))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Ride not found"),
        Err(error) => repository_failure("fetch ride", error),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRideRequest {
    pub pickup_time: Option<DateTime<Utc>>,
    pub pickup_location: Option<String>,
    pub pickup_notes: Option<String>,
    pub dropoff_location: Option<String>,
    pub dropoff_notes: Option<String>,
    pub status: Option<String>,
    pub driver_id: Option<String>,
    pub passenger_count: Option<u32>,
    pub special_requests: Option<String>,
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRideRequest>,
) -> Response {
    let ride_id = RideId(id);
    let now = Utc::now();

    // Status moves through the guarded transition so concurrent writers
    // cannot resurrect a terminal ride.
    if let Some(raw_status) = &request.status {
        let Some(next) = RideStatus::parse(raw_status) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown ride status `{raw_status}`"),
            );
        };
        match state.rides.transition_status(&ride_id, next, now).await {
            Ok(true) => {}
            Ok(false) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Ride cannot move to status `{raw_status}`"),
                )
            }
            Err(error) => return repository_failure("update ride status", error),
        }
    }

    let mut ride = match state.rides.find_by_id(&ride_id).await {
        Ok(Some(ride)) => ride,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Ride not found"),
        Err(error) => return repository_failure("fetch ride", error),
    };

    let pickup_time_changed = request.pickup_time.is_some();
    if let Some(pickup_time) = request.pickup_time {
        ride.pickup_time = pickup_time;
    }
    if let Some(pickup_location) = request.pickup_location {
        ride.pickup_location = pickup_location;
    }
    if let Some(pickup_notes) = request.pickup_notes {
        ride.pickup_notes = Some(pickup_notes);
    }
    if let Some(dropoff_location) = request.dropoff_location {
        ride.dropoff_location = dropoff_location;
    }
    if let Some(dropoff_notes) = request.dropoff_notes {
        ride.dropoff_notes = Some(dropoff_notes);
    }
    if let Some(driver_id) = request.driver_id {
        ride.driver_id = Some(DriverId(driver_id));
    }
    if let Some(passenger_count) = request.passenger_count {
        ride.passenger_count = passenger_count;
    }
    if let Some(special_requests) = request.special_requests {
        ride.special_requests = Some(special_requests);
    }
    ride.updated_at = now;

    if let Err(error) = state.rides.update(ride.clone()).await {
        return repository_failure("update ride", error);
    }

    sync_ride_best_effort(state.calendar.as_ref(), &ride).await;

    if pickup_time_changed {
        notify_time_change(&state, &ride).await;
    }

    (StatusCode::OK, Json(json!({ "ride": ride }))).into_response()
}

async fn notify_time_change(state: &AppState, ride: &Ride) {
    let guest = match state.guests.find_by_id(&ride.guest_id).await {
        Ok(Some(guest)) => guest,
        _ => return,
    };

    let body = format!(
        "Your ride has been updated. New pickup time: {} at {}",
        format_date_and_time(ride.pickup_time),
        ride.pickup_location,
    );
    if let Err(error) = state.sms.send(&guest.phone, &body).await {
        warn!(error = %error, "ride update notification failed");
    }
}

async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let ride_id = RideId(id);

    let ride = match state.rides.find_by_id(&ride_id).await {
        Ok(Some(ride)) => ride,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Ride not found"),
        Err(error) => return repository_failure("fetch ride", error),
    };

    match state.rides.transition_status(&ride_id, RideStatus::Cancelled, Utc::now()).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Ride is already completed or cancelled",
            )
        }
        Err(error) => return repository_failure("cancel ride", error),
    }

    delete_ride_best_effort(state.calendar.as_ref(), &ride).await;

    if let Ok(Some(guest)) = state.guests.find_by_id(&ride.guest_id).await {
        let body = "Your ride has been cancelled. Reply to reschedule or contact the concierge.";
        if let Err(error) = state.sms.send(&guest.phone, body).await {
            warn!(error = %error, "cancellation notification failed");
        }
    }

    (StatusCode::OK, Json(json!({ "message": "Ride cancelled successfully" }))).into_response()
}
