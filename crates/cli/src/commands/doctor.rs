use curbside_core::config::{AppConfig, LoadOptions};
use curbside_db::connect_with_settings;
use serde_json::json;

use super::{block_on, CommandResult};

struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

pub fn run(json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(Check {
                name: "config",
                ok: true,
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(Check { name: "config", ok: false, detail: error.to_string() });
            None
        }
    };

    if let Some(config) = &config {
        let database = block_on(async {
            let pool = connect_with_settings(
                &config.database.url,
                config.database.max_connections,
                config.database.timeout_secs,
            )
            .await
            .map_err(|error| error.to_string())?;
            let result = sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&pool)
                .await
                .map_err(|error| error.to_string());
            pool.close().await;
            result
        });
        checks.push(match database {
            Ok(Ok(_)) => Check {
                name: "database",
                ok: true,
                detail: format!("connected to `{}`", config.database.url),
            },
            Ok(Err(detail)) | Err(detail) => Check { name: "database", ok: false, detail },
        });

        checks.push(Check {
            name: "sms",
            ok: true,
            detail: if config.twilio.is_configured() {
                "twilio credentials configured".to_string()
            } else {
                "no credentials; outbound sms will be dropped (noop)".to_string()
            },
        });

        checks.push(Check {
            name: "llm",
            ok: true,
            detail: if config.llm.api_key.is_some() {
                format!("{:?} api key configured", config.llm.provider)
            } else {
                "no api key; classification will use the fallback path".to_string()
            },
        });
    }

    let all_ok = checks.iter().all(|check| check.ok);

    let output = if json {
        json!({
            "ok": all_ok,
            "checks": checks
                .iter()
                .map(|check| json!({
                    "name": check.name,
                    "ok": check.ok,
                    "detail": check.detail,
                }))
                .collect::<Vec<_>>(),
        })
        .to_string()
    } else {
        checks
            .iter()
            .map(|check| {
                format!("[{}] {}: {}", if check.ok { "ok" } else { "fail" }, check.name, check.detail)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    CommandResult { exit_code: u8::from(!all_ok), output }
}
