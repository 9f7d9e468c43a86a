use std::time::Instant;

use curbside_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use curbside_db::{connect_with_settings, migrations};

use super::{block_on, CommandResult};

const BASELINE_TABLES: &[&str] =
    &["hotels", "guests", "drivers", "rides", "messages", "ride_reminders"];

/// Exercises the startup data path against a throwaway in-memory database.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        overrides: ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failed(format!("config: {error}")),
    };

    let outcome = block_on(async {
        let mut report = Vec::new();

        let started = Instant::now();
        let pool = connect_with_settings(&config.database.url, 1, config.database.timeout_secs)
            .await
            .map_err(|error| format!("connect: {error}"))?;
        report.push(format!("connect: ok ({:?})", started.elapsed()));

        let started = Instant::now();
        migrations::run_pending(&pool)
            .await
            .map_err(|error| format!("migrate: {error}"))?;
        report.push(format!("migrate: ok ({:?})", started.elapsed()));

        let started = Instant::now();
        for table in BASELINE_TABLES {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .map_err(|error| format!("schema check: {error}"))?;
            if count != 1 {
                return Err(format!("schema check: table `{table}` missing"));
            }
        }
        report.push(format!("schema: ok ({:?})", started.elapsed()));

        pool.close().await;
        Ok::<_, String>(report.join("\n"))
    });

    match outcome {
        Ok(Ok(report)) => CommandResult::ok(report),
        Ok(Err(message)) | Err(message) => CommandResult::failed(message),
    }
}
