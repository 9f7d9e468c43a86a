use curbside_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config: {error}"),
    };

    let llm_key = if config.llm.api_key.is_some() { "(set)" } else { "(unset)" };
    let twilio_sid =
        if config.twilio.account_sid.is_empty() { "(unset)" } else { "(set)" };

    [
        format!("database.url = {}", config.database.url),
        format!("database.max_connections = {}", config.database.max_connections),
        format!("server.bind_address = {}", config.server.bind_address),
        format!("server.port = {}", config.server.port),
        format!("llm.provider = {:?}", config.llm.provider),
        format!("llm.model = {}", config.llm.model),
        format!("llm.api_key = {llm_key}"),
        format!("llm.timeout_secs = {}", config.llm.timeout_secs),
        format!("twilio.account_sid = {twilio_sid}"),
        "twilio.auth_token = (redacted)".to_string(),
        format!("twilio.from_number = {}", config.twilio.from_number),
        format!("reminders.tick_interval_secs = {}", config.reminders.tick_interval_secs),
        format!(
            "reminders.default_lead_time_minutes = {}",
            config.reminders.default_lead_time_minutes
        ),
        format!("logging.level = {}", config.logging.level),
        format!("logging.format = {:?}", config.logging.format),
    ]
    .join("\n")
}
