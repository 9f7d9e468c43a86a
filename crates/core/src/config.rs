use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub twilio: TwilioConfig,
    pub reminders: RemindersConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

impl TwilioConfig {
    /// Credentials present means outbound SMS goes through the real
    /// provider; otherwise bootstrap wires the no-op sender.
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.from_number.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct RemindersConfig {
    pub tick_interval_secs: u64,
    pub default_lead_time_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub reminder_tick_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://curbside.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                model: "claude-sonnet-4-20250514".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            twilio: TwilioConfig {
                account_sid: String::new(),
                auth_token: String::new().into(),
                from_number: String::new(),
            },
            reminders: RemindersConfig { tick_interval_secs: 60, default_lead_time_minutes: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected anthropic|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("curbside.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides_from(|key| env::var(key).ok())?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(twilio) = patch.twilio {
            if let Some(account_sid) = twilio.account_sid {
                self.twilio.account_sid = account_sid;
            }
            if let Some(auth_token_value) = twilio.auth_token {
                self.twilio.auth_token = auth_token_value.into();
            }
            if let Some(from_number) = twilio.from_number {
                self.twilio.from_number = from_number;
            }
        }

        if let Some(reminders) = patch.reminders {
            if let Some(tick_interval_secs) = reminders.tick_interval_secs {
                self.reminders.tick_interval_secs = tick_interval_secs;
            }
            if let Some(default_lead_time_minutes) = reminders.default_lead_time_minutes {
                self.reminders.default_lead_time_minutes = default_lead_time_minutes;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CURBSIDE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = lookup("CURBSIDE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CURBSIDE_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(provider) = lookup("CURBSIDE_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(api_key) = lookup("CURBSIDE_LLM_API_KEY") {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(base_url) = lookup("CURBSIDE_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(model) = lookup("CURBSIDE_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(account_sid) = lookup("CURBSIDE_TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = account_sid;
        }
        if let Some(auth_token) = lookup("CURBSIDE_TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = auth_token.into();
        }
        if let Some(from_number) = lookup("CURBSIDE_TWILIO_FROM_NUMBER") {
            self.twilio.from_number = from_number;
        }
        if let Some(port) = lookup("CURBSIDE_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "CURBSIDE_SERVER_PORT".to_string(),
                value: port,
            })?;
        }
        if let Some(tick) = lookup("CURBSIDE_REMINDER_TICK_SECS") {
            self.reminders.tick_interval_secs =
                tick.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "CURBSIDE_REMINDER_TICK_SECS".to_string(),
                    value: tick,
                })?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key_value) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key_value.into());
        }
        if let Some(account_sid) = overrides.twilio_account_sid {
            self.twilio.account_sid = account_sid;
        }
        if let Some(auth_token_value) = overrides.twilio_auth_token {
            self.twilio.auth_token = auth_token_value.into();
        }
        if let Some(from_number) = overrides.twilio_from_number {
            self.twilio.from_number = from_number;
        }
        if let Some(tick_interval_secs) = overrides.reminder_tick_interval_secs {
            self.reminders.tick_interval_secs = tick_interval_secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.reminders.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "reminders.tick_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.twilio.from_number.is_empty() && !self.twilio.from_number.starts_with('+') {
            return Err(ConfigError::Validation(
                "twilio.from_number must be in E.164 form (leading +)".to_string(),
            ));
        }

        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let default = PathBuf::from("curbside.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    llm: Option<LlmPatch>,
    twilio: Option<TwilioPatch>,
    reminders: Option<RemindersPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TwilioPatch {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemindersPatch {
    tick_interval_secs: Option<u64>,
    default_lead_time_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
