use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use curbside_core::domain::guest::{Guest, GuestId};
use curbside_core::domain::hotel::HotelId;
use curbside_core::phone::normalize_phone;
use curbside_db::repositories::{GuestRepository, RepositoryError};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/guests", post(register))
        .route("/api/guests/{id}", get(get_by_id))
        .route("/api/guests/phone/{phone}", get(get_by_phone))
        .route("/api/guests/{id}/preferences", patch(merge_preferences))
}

#[derive(Debug, Deserialize)]
pub struct RegisterGuestRequest {
    pub name: String,
    pub phone: String,
    pub hotel_id: String,
    pub email: Option<String>,
    pub room_number: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub preferences: Option<serde_json::Value>,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterGuestRequest>,
) -> Response {
    if request.name.trim().is_empty()
        || request.phone.trim().is_empty()
        || request.hotel_id.trim().is_empty()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: name, phone, hotel_id",
        );
    }

    let normalized_phone = normalize_phone(&request.phone);
    let hotel_id = HotelId(request.hotel_id.clone());
    let now = Utc::now();

    let existing =
        match state.guests.find_by_phone_and_hotel(&normalized_phone, &hotel_id).await {
            Ok(existing) => existing,
            Err(error) => return repository_failure("look up guest", error),
        };

    if let Some(mut guest) = existing {
        guest.name = request.name;
        guest.email = request.email;
        guest.room_number = request.room_number;
        guest.check_in_date = request.check_in_date;
        guest.check_out_date = request.check_out_date;
        if let Some(preferences) = request.preferences {
            guest.preferences = preferences;
        }
        guest.updated_at = now;

        return match state.guests.update(guest.clone()).await {
            Ok(()) => {
                (StatusCode::OK, Json(json!({ "guest": guest, "updated": true })))
                    .into_response()
            }
            Err(error) => repository_failure("update guest", error),
        };
    }

    let guest = Guest {
        id: GuestId::generate(),
        hotel_id,
        name: request.name,
        phone: normalized_phone,
        email: request.email,
        room_number: request.room_number,
        check_in_date: request.check_in_date,
        check_out_date: request.check_out_date,
        preferences: request.preferences.unwrap_or_else(|| json!({})),
        created_at: now,
        updated_at: now,
    };

    match state.guests.insert(guest.clone()).await {
        Ok(()) => {
            (StatusCode::CREATED, Json(json!({ "guest": guest, "created": true })))
                .into_response()
        }
        Err(error) => repository_failure("create guest", error),
    }
}

async fn get_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.guests.find_by_id(&GuestId(id)).await {
        Ok(Some(guest)) => (StatusCode::OK, Json(json!({ "guest": guest }))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Guest not found"),
        Err(error) => repository_failure("fetch guest", error),
    }
}

async fn get_by_phone(State(state): State<AppState>, Path(phone): Path<String>) -> Response {
    let normalized_phone = normalize_phone(&phone);
    match state.guests.find_latest_by_phone(&normalized_phone).await {
        Ok(Some(guest)) => (StatusCode::OK, Json(json!({ "guest": guest }))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Guest not found"),
        Err(error) => repository_failure("fetch guest by phone", error),
    }
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub preferences: serde_json::Value,
}

async fn merge_preferences(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PreferencesRequest>,
) -> Response {
    match state
        .guests
        .merge_preferences(&GuestId(id), request.preferences, Utc::now())
        .await
    {
        Ok(Some(guest)) => (StatusCode::OK, Json(json!({ "guest": guest }))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Guest not found"),
        Err(error) => repository_failure("update preferences", error),
    }
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub(crate) fn repository_failure(action: &str, error: RepositoryError) -> Response {
    error!(error = %error, "failed to {action}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("Failed to {action}"))
}
