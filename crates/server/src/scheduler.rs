use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use curbside_core::domain::hotel::ReminderSettings;
use curbside_core::domain::reminder::{ReminderKind, ReminderRecord, ReminderRecordId};
use curbside_core::domain::ride::Ride;
use curbside_core::template::{render_template, RenderContext};
use curbside_db::repositories::{
    DriverRepository, GuestRepository, HotelRepository, ReminderInsert, ReminderRepository,
    RepositoryError, RideRepository,
};
use curbside_sms::{SmsError, SmsSender};

#[derive(Debug, Error)]
pub enum ReminderSendError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Sms(#[from] SmsError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent { message: String },
    AlreadySent,
    GuestMissing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub hotels: usize,
    pub attempted: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
}

/// Sends ride reminders. Shared by the periodic sweep and the manual-send
/// API so both paths leave the same audit trail.
pub struct ReminderEngine {
    hotels: Arc<dyn HotelRepository>,
    rides: Arc<dyn RideRepository>,
    guests: Arc<dyn GuestRepository>,
    drivers: Arc<dyn DriverRepository>,
    reminders: Arc<dyn ReminderRepository>,
    sms: Arc<dyn SmsSender>,
}

impl ReminderEngine {
    pub fn new(
        hotels: Arc<dyn HotelRepository>,
        rides: Arc<dyn RideRepository>,
        guests: Arc<dyn GuestRepository>,
        drivers: Arc<dyn DriverRepository>,
        reminders: Arc<dyn ReminderRepository>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self { hotels, rides, guests, drivers, reminders, sms }
    }

    /// One pass over every reminder-enabled hotel. A failing ride is
    /// logged and left eligible for the next tick; a failing hotel is
    /// logged and skipped. The sweep itself never errors.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();

        let hotels = match self.hotels.list_reminder_enabled().await {
            Ok(hotels) => hotels,
            Err(error) => {
                warn!(error = %error, "reminder sweep could not list hotels; skipping tick");
                return stats;
            }
        };
        stats.hotels = hotels.len();

        for hotel in hotels {
            let lead_minutes = i64::from(hotel.reminder_settings.lead_time_minutes);
            let window_end = now + Duration::minutes(lead_minutes);

            let due = match self
                .rides
                .due_for_reminder(&hotel.id, ReminderKind::FiveMinute, now, window_end)
                .await
            {
                Ok(due) => due,
                Err(error) => {
                    warn!(
                        hotel_id = %hotel.id.0,
                        error = %error,
                        "reminder sweep could not query due rides; skipping hotel"
                    );
                    continue;
                }
            };

            for ride in due {
                stats.attempted += 1;
                let outcome = self
                    .send_reminder(
                        &ride,
                        ReminderKind::FiveMinute,
                        Some(&hotel.reminder_settings),
                        None,
                        now,
                    )
                    .await;

                match outcome {
                    Ok(ReminderOutcome::Sent { .. }) => {
                        stats.sent += 1;
                        info!(
                            ride_id = %ride.id.0,
                            hotel_id = %hotel.id.0,
                            kind = ReminderKind::FiveMinute.as_str(),
                            "reminder sent"
                        );
                    }
                    Ok(ReminderOutcome::AlreadySent) => stats.already_sent += 1,
                    Ok(ReminderOutcome::GuestMissing) => {
                        stats.failed += 1;
                        warn!(ride_id = %ride.id.0, "reminder skipped: guest record missing");
                    }
                    Err(error) => {
                        stats.failed += 1;
                        warn!(
                            ride_id = %ride.id.0,
                            error = %error,
                            "reminder dispatch failed; ride stays eligible for retry"
                        );
                    }
                }
            }
        }

        stats
    }

    /// Sends one reminder and records it. The ReminderRecord is written
    /// only after a successful dispatch, so a provider failure leaves the
    /// ride eligible for retry; a uniqueness rejection on the record is
    /// reported as [`ReminderOutcome::AlreadySent`], not an error.
    pub async fn send_reminder(
        &self,
        ride: &Ride,
        kind: ReminderKind,
        settings: Option<&ReminderSettings>,
        custom_template: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReminderOutcome, ReminderSendError> {
        if kind.deduplicated() && self.reminders.exists(&ride.id, kind).await? {
            return Ok(ReminderOutcome::AlreadySent);
        }

        let Some(guest) = self.guests.find_by_id(&ride.guest_id).await? else {
            return Ok(ReminderOutcome::GuestMissing);
        };
        let driver = match &ride.driver_id {
            Some(driver_id) => self.drivers.find_by_id(driver_id).await?,
            None => None,
        };

        let loaded_settings;
        let settings = match settings {
            Some(settings) => settings,
            None => {
                loaded_settings =
                    self.hotels.reminder_settings(&ride.hotel_id).await?.unwrap_or_default();
                &loaded_settings
            }
        };

        let template = custom_template.unwrap_or_else(|| settings.template_for(kind));
        let message =
            render_template(template, &RenderContext::from_ride(ride, Some(&guest), driver.as_ref()));

        self.sms.send(&guest.phone, &message).await?;

        let inserted = self
            .reminders
            .insert(ReminderRecord {
                id: ReminderRecordId::generate(),
                ride_id: ride.id.clone(),
                kind,
                message_sent: message.clone(),
                sent_at: now,
            })
            .await?;

        match inserted {
            ReminderInsert::Recorded => Ok(ReminderOutcome::Sent { message }),
            ReminderInsert::AlreadySent => Ok(ReminderOutcome::AlreadySent),
        }
    }
}

/// Lifecycle-managed reminder sweep task.
///
/// `stop` guarantees no tick starts after it returns: the shutdown signal
/// wins the race against the next tick, and an in-flight sweep is awaited
/// to completion before the task exits.
pub struct ReminderScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ReminderScheduler {
    pub fn start(engine: Arc<ReminderEngine>, tick_interval: StdDuration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("reminder scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = engine.sweep(Utc::now()).await;
                        debug!(
                            hotels = stats.hotels,
                            attempted = stats.attempted,
                            sent = stats.sent,
                            already_sent = stats.already_sent,
                            failed = stats.failed,
                            "reminder sweep complete"
                        );
                    }
                }
            }
        });

        info!(tick_interval_secs = tick_interval.as_secs(), "reminder scheduler started");
        Self { handle, shutdown }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
