use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use curbside_agent::{HttpLlmClient, IntentClassifier, LlmError};
use curbside_core::config::{AppConfig, ConfigError, LoadOptions};
use curbside_core::estimate::FixedSpeedEstimator;
use curbside_db::repositories::{
    SqlDriverRepository, SqlGuestRepository, SqlHotelRepository, SqlMessageRepository,
    SqlReminderRepository, SqlRideRepository,
};
use curbside_db::{connect_with_settings, migrations, DbPool};
use curbside_sms::{NoopSmsSender, SmsError, SmsSender, TwilioSmsSender};

use crate::calendar::NoopCalendarSync;
use crate::state::AppState;
use crate::{analytics, guests, health, reminders_api, rides, webhook};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub sms_transport: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("sms client setup failed: {0}")]
    Sms(#[source] SmsError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let classifier = Arc::new(IntentClassifier::new(Arc::new(llm)));

    let (sms, sms_transport): (Arc<dyn SmsSender>, &'static str) =
        if config.twilio.is_configured() {
            let sender =
                TwilioSmsSender::from_config(&config.twilio).map_err(BootstrapError::Sms)?;
            (Arc::new(sender), "twilio")
        } else {
            (Arc::new(NoopSmsSender), "noop")
        };
    info!(
        event_name = "system.bootstrap.sms_transport",
        transport_mode = sms_transport,
        "sms transport selected"
    );

    let state = AppState {
        db_pool: db_pool.clone(),
        guests: Arc::new(SqlGuestRepository::new(db_pool.clone())),
        drivers: Arc::new(SqlDriverRepository::new(db_pool.clone())),
        rides: Arc::new(SqlRideRepository::new(db_pool.clone())),
        messages: Arc::new(SqlMessageRepository::new(db_pool.clone())),
        reminders: Arc::new(SqlReminderRepository::new(db_pool.clone())),
        hotels: Arc::new(SqlHotelRepository::new(db_pool.clone())),
        classifier,
        sms,
        calendar: Arc::new(NoopCalendarSync),
        estimator: Arc::new(FixedSpeedEstimator::default()),
        from_number: config.twilio.from_number.clone(),
    };

    Ok(Application { config, db_pool, state, sms_transport })
}

pub fn build_router(state: AppState) -> Router {
    let db_pool = state.db_pool.clone();

    Router::new()
        .merge(webhook::router())
        .merge(guests::router())
        .merge(rides::router())
        .merge(reminders_api::router())
        .merge(analytics::router())
        .with_state(state)
        .merge(health::router(db_pool))
        .layer(TraceLayer::new_for_http())
}
