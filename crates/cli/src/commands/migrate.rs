use curbside_core::config::{AppConfig, LoadOptions};
use curbside_db::{connect_with_settings, migrations};

use super::{block_on, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failed(format!("config: {error}")),
    };

    let outcome = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("connect: {error}"))?;

        migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
        pool.close().await;
        Ok::<_, String>(())
    });

    match outcome {
        Ok(Ok(())) => CommandResult::ok(format!(
            "migrations applied: database `{}` is up to date",
            config.database.url
        )),
        Ok(Err(message)) | Err(message) => CommandResult::failed(message),
    }
}
