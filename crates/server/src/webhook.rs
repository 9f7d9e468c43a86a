use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use curbside_core::domain::guest::GuestId;
use curbside_core::domain::message::{Message, MessageDirection, MessageId};
use curbside_core::domain::ride::RideStatus;
use curbside_core::phone::normalize_phone;
use curbside_core::routing::{
    route_message, RideContext, RideMutation, RoutePlan, NOT_REGISTERED_REPLY,
};
use curbside_agent::ClassifyRequest;
use curbside_db::repositories::{
    DriverRepository, GuestRepository, HotelRepository, MessageRepository, RideRepository,
};
use curbside_sms::SmsSender;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sms/incoming", post(incoming))
        .route("/api/sms/driver", post(driver_incoming))
        .route("/api/sms/history/{guest_id}", get(history))
}

/// Form payload the messaging provider posts for each inbound SMS.
#[derive(Debug, Deserialize)]
pub struct InboundSmsForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
}

/// Empty TwiML: replies go out through the REST API, and the provider must
/// always get a fast 200 so it never retries a half-processed message.
fn twiml_ack() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        "<Response></Response>".to_string(),
    )
        .into_response()
}

async fn incoming(State(state): State<AppState>, Form(form): Form<InboundSmsForm>) -> Response {
    if let Err(error) = process_incoming(&state, &form).await {
        error!(
            from = %form.from,
            error = %error,
            "inbound sms processing failed; acknowledging provider anyway"
        );
    }
    twiml_ack()
}

async fn process_incoming(state: &AppState, form: &InboundSmsForm) -> anyhow::Result<()> {
    let normalized_phone = normalize_phone(&form.from);
    info!(from = %normalized_phone, body_length = form.body.len(), "inbound sms received");

    let Some(guest) = state.guests.find_latest_by_phone(&normalized_phone).await? else {
        // Unknown sender: fixed reply, no classification, no records.
        state.sms.send(&normalized_phone, NOT_REGISTERED_REPLY).await?;
        return Ok(());
    };

    let ride = state.rides.current_active_for_guest(&guest.id).await?;
    let driver = match ride.as_ref().and_then(|ride| ride.driver_id.clone()) {
        Some(driver_id) => state.drivers.find_by_id(&driver_id).await?,
        None => None,
    };
    let hotel = state.hotels.find_by_id(&guest.hotel_id).await?;

    let classification = state
        .classifier
        .classify(ClassifyRequest {
            guest: &guest,
            hotel_name: hotel.as_ref().map(|hotel| hotel.name.as_str()),
            ride: ride.as_ref(),
            message_body: &form.body,
        })
        .await;

    let now = Utc::now();
    state
        .messages
        .insert(Message {
            id: MessageId::generate(),
            guest_id: guest.id.clone(),
            driver_id: ride.as_ref().and_then(|ride| ride.driver_id.clone()),
            ride_id: ride.as_ref().map(|ride| ride.id.clone()),
            direction: MessageDirection::Inbound,
            from_number: normalized_phone.clone(),
            to_number: state.from_number.clone(),
            body: form.body.clone(),
            ai_handled: !classification.needs_human,
            intent: Some(classification.intent),
            confidence: Some(classification.confidence),
            provider_sid: form.message_sid.clone(),
            created_at: now,
        })
        .await?;

    let ride_context = ride.clone().map(|ride| RideContext {
        driver_name: driver.as_ref().map(|driver| driver.name.clone()),
        driver_phone: driver.as_ref().map(|driver| driver.phone.clone()),
        ride,
    });

    let plan = route_message(&classification, &guest, ride_context.as_ref(), &form.body, now);
    apply_plan(state, &guest.id, ride_context.as_ref(), &plan).await?;

    state.sms.send(&normalized_phone, &plan.guest_reply).await?;

    state
        .messages
        .insert(Message {
            id: MessageId::generate(),
            guest_id: guest.id,
            driver_id: ride.as_ref().and_then(|ride| ride.driver_id.clone()),
            ride_id: ride.map(|ride| ride.id),
            direction: MessageDirection::Outbound,
            from_number: state.from_number.clone(),
            to_number: normalized_phone,
            body: plan.guest_reply.clone(),
            ai_handled: true,
            intent: Some(classification.intent),
            confidence: None,
            provider_sid: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok(())
}

async fn apply_plan(
    state: &AppState,
    guest_id: &GuestId,
    ride_context: Option<&RideContext>,
    plan: &RoutePlan,
) -> anyhow::Result<()> {
    match (&plan.mutation, ride_context) {
        (Some(RideMutation::Reschedule { pickup_time }), Some(context)) => {
            let moved = state
                .rides
                .set_pickup_time(&context.ride.id, *pickup_time, Utc::now())
                .await?;
            if !moved {
                warn!(
                    ride_id = %context.ride.id.0,
                    "reschedule skipped: ride no longer active"
                );
            }
        }
        (Some(RideMutation::Cancel), Some(context)) => {
            let cancelled = state
                .rides
                .transition_status(&context.ride.id, RideStatus::Cancelled, Utc::now())
                .await?;
            if !cancelled {
                warn!(
                    ride_id = %context.ride.id.0,
                    "cancel skipped: ride already terminal"
                );
            }
        }
        (Some(_), None) => {
            warn!(guest_id = %guest_id.0, "mutation planned without a ride; ignoring");
        }
        (None, _) => {}
    }

    // Escalation is degraded, not fatal: the guest still gets their reply
    // even when the driver notification fails.
    if let Some(forward) = &plan.driver_forward {
        if let Err(error) = state.sms.send(&forward.to_phone, &forward.body).await {
            warn!(
                to = %forward.to_phone,
                error = %error,
                "driver notification failed; guest reply proceeds"
            );
        }
    }

    Ok(())
}

/// Form payload for the driver-facing number: relays the driver's text to
/// the guest of their next active ride.
#[derive(Debug, Deserialize)]
pub struct DriverSmsForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

async fn driver_incoming(
    State(state): State<AppState>,
    Form(form): Form<DriverSmsForm>,
) -> Response {
    if let Err(error) = process_driver_incoming(&state, &form).await {
        error!(
            from = %form.from,
            error = %error,
            "driver sms processing failed; acknowledging provider anyway"
        );
    }
    twiml_ack()
}

async fn process_driver_incoming(state: &AppState, form: &DriverSmsForm) -> anyhow::Result<()> {
    let normalized_phone = normalize_phone(&form.from);

    let Some(driver) = state.drivers.find_by_phone(&normalized_phone).await? else {
        return Ok(());
    };
    let Some(ride) = state.rides.earliest_active_for_driver(&driver.id).await? else {
        return Ok(());
    };
    let Some(guest) = state.guests.find_by_id(&ride.guest_id).await? else {
        return Ok(());
    };

    state
        .sms
        .send(&guest.phone, &format!("From your driver: {}", form.body))
        .await?;

    state
        .messages
        .insert(Message {
            id: MessageId::generate(),
            guest_id: guest.id,
            driver_id: Some(driver.id),
            ride_id: Some(ride.id),
            direction: MessageDirection::Outbound,
            from_number: state.from_number.clone(),
            to_number: guest.phone,
            body: format!("From your driver: {}", form.body),
            ai_handled: false,
            intent: None,
            confidence: None,
            provider_sid: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok(())
}

async fn history(
    State(state): State<AppState>,
    Path(guest_id): Path<String>,
) -> Response {
    match state.messages.history_for_guest(&GuestId(guest_id), 50).await {
        Ok(messages) => (StatusCode::OK, Json(json!({ "messages": messages }))).into_response(),
        Err(error) => {
            error!(error = %error, "failed to fetch message history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch messages" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use curbside_agent::{IntentClassifier, LlmClient, LlmError};
    use curbside_core::domain::driver::{Driver, DriverId};
    use curbside_core::domain::guest::{Guest, GuestId};
    use curbside_core::domain::hotel::{Hotel, HotelId, ReminderSettings};
    use curbside_core::domain::message::MessageDirection;
    use curbside_core::domain::ride::{Ride, RideId, RideStatus};
    use curbside_core::estimate::FixedSpeedEstimator;
    use curbside_db::repositories::{
        DriverRepository, GuestRepository, HotelRepository, MessageRepository, RideRepository,
        SqlDriverRepository, SqlGuestRepository, SqlHotelRepository, SqlMessageRepository,
        SqlReminderRepository, SqlRideRepository,
    };
    use curbside_db::{connect_with_settings, migrations};
    use curbside_sms::RecordingSmsSender;

    use crate::bootstrap::build_router;
    use crate::calendar::NoopCalendarSync;
    use crate::state::AppState;

    struct ScriptedLlm {
        completions: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
        ) -> Result<String, LlmError> {
            self.completions
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    async fn test_state(
        completions: Vec<Result<String, LlmError>>,
    ) -> (AppState, Arc<RecordingSmsSender>) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let sms = Arc::new(RecordingSmsSender::default());
        let llm = Arc::new(ScriptedLlm { completions: Mutex::new(completions.into()) });

        let state = AppState {
            db_pool: pool.clone(),
            guests: Arc::new(SqlGuestRepository::new(pool.clone())),
            drivers: Arc::new(SqlDriverRepository::new(pool.clone())),
            rides: Arc::new(SqlRideRepository::new(pool.clone())),
            messages: Arc::new(SqlMessageRepository::new(pool.clone())),
            reminders: Arc::new(SqlReminderRepository::new(pool.clone())),
            hotels: Arc::new(SqlHotelRepository::new(pool)),
            classifier: Arc::new(IntentClassifier::new(llm)),
            sms: sms.clone(),
            calendar: Arc::new(NoopCalendarSync),
            estimator: Arc::new(FixedSpeedEstimator::default()),
            from_number: "+15550001111".to_string(),
        };

        (state, sms)
    }

    async fn seed_conversation(state: &AppState, with_driver: bool) -> Ride {
        let now = Utc::now();
        state
            .hotels
            .insert(Hotel {
                id: HotelId("h1".to_string()),
                name: "Seaside Grand".to_string(),
                reminder_settings: ReminderSettings::default(),
                created_at: now,
            })
            .await
            .expect("insert hotel");
        state
            .guests
            .insert(Guest {
                id: GuestId("g1".to_string()),
                hotel_id: HotelId("h1".to_string()),
                name: "Ava Chen".to_string(),
                phone: "+15551234567".to_string(),
                email: None,
                room_number: Some("1204".to_string()),
                check_in_date: None,
                check_out_date: None,
                preferences: serde_json::json!({}),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert guest");

        let driver_id = if with_driver {
            state
                .drivers
                .insert(Driver {
                    id: DriverId("d1".to_string()),
                    hotel_id: HotelId("h1".to_string()),
                    name: "James Okafor".to_string(),
                    phone: "+15550009999".to_string(),
                    vehicle_info: None,
                    is_active: true,
                    created_at: now,
                })
                .await
                .expect("insert driver");
            Some(DriverId("d1".to_string()))
        } else {
            None
        };

        let ride = Ride {
            id: RideId("r1".to_string()),
            guest_id: GuestId("g1".to_string()),
            driver_id,
            hotel_id: HotelId("h1".to_string()),
            pickup_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            pickup_location: "Hotel Lobby".to_string(),
            pickup_notes: None,
            dropoff_location: "Airport Terminal 1".to_string(),
            dropoff_notes: None,
            passenger_count: 1,
            status: RideStatus::Scheduled,
            driver_departed_at: None,
            completed_at: None,
            special_requests: None,
            calendar_event_id: None,
            created_by: "staff".to_string(),
            created_at: now,
            updated_at: now,
        };
        state.rides.insert(ride.clone()).await.expect("insert ride");
        ride
    }

    async fn post_form(state: &AppState, uri: &str, body: &'static str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("build request");

        let response =
            build_router(state.clone()).oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
    }

    #[tokio::test]
    async fn unknown_sender_gets_fixed_reply_and_no_records() {
        let (state, sms) = test_state(Vec::new()).await;

        let (status, body) = post_form(
            &state,
            "/api/sms/incoming",
            "From=%2B15559990000&Body=hello&MessageSid=SM100",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<Response></Response>");

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15559990000");
        assert!(sent[0].1.contains("not registered"));

        // No guest, so no message rows were written anywhere.
        let (message_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&state.db_pool)
            .await
            .expect("count messages");
        assert_eq!(message_count, 0);
    }

    #[tokio::test]
    async fn cancel_flow_cancels_ride_and_suppresses_reminders() {
        let (state, sms) = test_state(vec![Ok(
            r#"{"intent": "cancel", "confidence": 0.97, "needs_human": false}"#.to_string(),
        )])
        .await;
        let ride = seed_conversation(&state, false).await;

        let (status, body) = post_form(
            &state,
            "/api/sms/incoming",
            "From=%2B15551234567&Body=please%20cancel&MessageSid=SM101",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<Response></Response>");

        let cancelled = state
            .rides
            .find_by_id(&ride.id)
            .await
            .expect("load ride")
            .expect("ride exists");
        assert_eq!(cancelled.status, RideStatus::Cancelled);

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("cancelled"));

        let history = state
            .messages
            .history_for_guest(&GuestId("g1".to_string()), 50)
            .await
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, MessageDirection::Outbound);
        assert_eq!(history[1].direction, MessageDirection::Inbound);

        // Even inside the lead-time window, the cancelled ride gets no
        // reminder on the next sweep.
        let sweep =
            state.reminder_engine().sweep(cancelled.pickup_time - Duration::minutes(3)).await;
        assert_eq!(sweep.attempted, 0);
        assert_eq!(sms.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn relative_reschedule_moves_pickup_time() {
        let (state, sms) = test_state(vec![Ok(r#"{
            "intent": "schedule_change",
            "confidence": 0.9,
            "extracted_data": {"time_adjustment": "+30 minutes"},
            "needs_human": false
        }"#
        .to_string())])
        .await;
        let ride = seed_conversation(&state, false).await;

        let (status, _) = post_form(
            &state,
            "/api/sms/incoming",
            "From=%2B15551234567&Body=30%20minutes%20later%20please&MessageSid=SM102",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let moved = state
            .rides
            .find_by_id(&ride.id)
            .await
            .expect("load ride")
            .expect("ride exists");
        assert_eq!(moved.pickup_time, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("moved to"));
    }

    #[tokio::test]
    async fn classifier_failure_still_answers_the_guest() {
        let (state, sms) = test_state(vec![Err(LlmError::Transport(
            "connection refused".to_string(),
        ))])
        .await;
        seed_conversation(&state, false).await;

        let (status, body) = post_form(
            &state,
            "/api/sms/incoming",
            "From=%2B15551234567&Body=%3F%3F%3F&MessageSid=SM103",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<Response></Response>");

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].1.is_empty(), "guest must never be left without a reply");

        let history = state
            .messages
            .history_for_guest(&GuestId("g1".to_string()), 50)
            .await
            .expect("history");
        let inbound = history
            .iter()
            .find(|message| message.direction == MessageDirection::Inbound)
            .expect("inbound logged");
        assert!(!inbound.ai_handled, "fallback is flagged for a human");
    }

    #[tokio::test]
    async fn needs_human_forwards_to_driver_and_replies() {
        let (state, sms) = test_state(vec![Ok(r#"{
            "intent": "general_question",
            "confidence": 0.6,
            "suggested_response": "Checking with your driver now.",
            "needs_human": true
        }"#
        .to_string())])
        .await;
        seed_conversation(&state, true).await;

        let (status, _) = post_form(
            &state,
            "/api/sms/incoming",
            "From=%2B15551234567&Body=can%20you%20fit%20a%20surfboard&MessageSid=SM104",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 2);
        // Driver forward goes out during plan application, then the reply.
        assert_eq!(sent[0].0, "+15550009999");
        assert!(sent[0].1.contains("surfboard"));
        assert_eq!(sent[1].0, "+15551234567");
        assert_eq!(sent[1].1, "Checking with your driver now.");
    }

    #[tokio::test]
    async fn driver_webhook_relays_to_guest() {
        let (state, sms) = test_state(Vec::new()).await;
        seed_conversation(&state, true).await;

        let (status, body) = post_form(
            &state,
            "/api/sms/driver",
            "From=%2B15550009999&Body=On%20my%20way",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<Response></Response>");

        let sent = sms.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15551234567");
        assert_eq!(sent[0].1, "From your driver: On my way");
    }

    #[tokio::test]
    async fn unknown_driver_is_acknowledged_silently() {
        let (state, sms) = test_state(Vec::new()).await;
        seed_conversation(&state, false).await;

        let (status, body) = post_form(
            &state,
            "/api/sms/driver",
            "From=%2B15557770000&Body=who%20is%20this",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<Response></Response>");
        assert!(sms.sent().await.is_empty());
    }
}

