use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use tracing::error;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/analytics/hotel/{hotel_id}/drivers", get(driver_metrics))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct DriverMetrics {
    id: String,
    name: String,
    phone: String,
    vehicle_info: Option<String>,
    total_rides: u64,
    completed_rides: u64,
    cancelled_rides: u64,
    total_passengers: u64,
    avg_ride_duration_minutes: f64,
    estimated_miles: f64,
    cancellation_rate: f64,
    avg_passengers_per_ride: f64,
}

/// Per-driver activity over a date range. Distance has no tracking source,
/// so it comes from the configured estimator over completed-ride durations.
async fn driver_metrics(
    State(state): State<AppState>,
    Path(hotel_id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let end_date = query.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start_date = query.start_date.unwrap_or(end_date - Duration::days(30));

    let range_start = start_date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    let range_end =
        (end_date + Duration::days(1)).and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    let (Some(range_start), Some(range_end)) = (range_start, range_end) else {
        return super::guests::error_response(StatusCode::BAD_REQUEST, "Invalid date range");
    };

    let driver_rows = match sqlx::query(
        "SELECT id, name, phone, vehicle_info FROM drivers \
         WHERE hotel_id = ? AND is_active = 1 ORDER BY created_at ASC",
    )
    .bind(&hotel_id)
    .fetch_all(&state.db_pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => return metrics_failure(error),
    };

    let mut metrics: HashMap<String, DriverMetrics> = driver_rows
        .into_iter()
        .map(|row| {
            let id: String = row.get("id");
            (
                id.clone(),
                DriverMetrics {
                    id,
                    name: row.get("name"),
                    phone: row.get("phone"),
                    vehicle_info: row.get("vehicle_info"),
                    ..DriverMetrics::default()
                },
            )
        })
        .collect();

    let ride_rows = match sqlx::query(
        "SELECT driver_id, status, passenger_count, driver_departed_at, completed_at \
         FROM rides \
         WHERE hotel_id = ? AND driver_id IS NOT NULL \
           AND pickup_time >= ? AND pickup_time < ?",
    )
    .bind(&hotel_id)
    .bind(range_start.to_rfc3339())
    .bind(range_end.to_rfc3339())
    .fetch_all(&state.db_pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => return metrics_failure(error),
    };

    let mut completed_durations: HashMap<String, Vec<Duration>> = HashMap::new();
    for row in ride_rows {
        let driver_id: String = row.get("driver_id");
        let Some(entry) = metrics.get_mut(&driver_id) else {
            continue;
        };

        let status: String = row.get("status");
        let passenger_count: i64 = row.get("passenger_count");

        match status.as_str() {
            "cancelled" => entry.cancelled_rides += 1,
            "completed" => {
                entry.total_rides += 1;
                entry.completed_rides += 1;
                entry.total_passengers += passenger_count.max(0) as u64;

                let departed: Option<String> = row.get("driver_departed_at");
                let completed: Option<String> = row.get("completed_at");
                if let Some(duration) = ride_duration(departed.as_deref(), completed.as_deref())
                {
                    completed_durations.entry(driver_id).or_default().push(duration);
                }
            }
            _ => entry.total_rides += 1,
        }
    }

    for (driver_id, durations) in completed_durations {
        let Some(entry) = metrics.get_mut(&driver_id) else {
            continue;
        };

        let total = durations.iter().fold(Duration::zero(), |total, duration| total + *duration);
        entry.avg_ride_duration_minutes = round1(
            total.num_seconds() as f64 / 60.0 / durations.len() as f64,
        );
        entry.estimated_miles = round1(state.estimator.estimate_miles(total));
    }

    for entry in metrics.values_mut() {
        let attempted = entry.total_rides + entry.cancelled_rides;
        if attempted > 0 {
            entry.cancellation_rate =
                round1(entry.cancelled_rides as f64 / attempted as f64 * 100.0);
        }
        if entry.completed_rides > 0 {
            entry.avg_passengers_per_ride =
                round1(entry.total_passengers as f64 / entry.completed_rides as f64);
        }
    }

    let mut drivers: Vec<DriverMetrics> = metrics.into_values().collect();
    drivers.sort_by(|a, b| b.total_rides.cmp(&a.total_rides).then(a.id.cmp(&b.id)));

    (
        StatusCode::OK,
        Json(json!({
            "drivers": drivers,
            "date_range": { "start": start_date, "end": end_date },
        })),
    )
        .into_response()
}

fn ride_duration(departed: Option<&str>, completed: Option<&str>) -> Option<Duration> {
    let departed = DateTime::parse_from_rfc3339(departed?).ok()?.with_timezone(&Utc);
    let completed = DateTime::parse_from_rfc3339(completed?).ok()?.with_timezone(&Utc);
    (completed > departed).then(|| completed - departed)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn metrics_failure(error: sqlx::Error) -> Response {
    error!(error = %error, "failed to compute driver metrics");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to fetch analytics" })),
    )
        .into_response()
}
