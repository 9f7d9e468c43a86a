use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use curbside_core::config::TwilioConfig;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("sms transport failed: {0}")]
    Transport(String),
    #[error("sms provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("sms provider response was malformed: {0}")]
    MalformedResponse(String),
}

/// Outbound dispatch port. Returns the provider-assigned delivery id.
/// Failures propagate to the caller; only the reminder scheduler downgrades
/// them to retry-next-tick.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError>;
}

/// Sender used when no provider credentials are configured. Logs the
/// message and reports success so every flow stays exercisable locally.
#[derive(Default)]
pub struct NoopSmsSender;

#[async_trait]
impl SmsSender for NoopSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        info!(to, body_length = body.len(), "sms sending disabled; dropping message");
        Ok("noop".to_string())
    }
}

const TWILIO_BASE_URL: &str = "https://api.twilio.com";

/// Twilio REST implementation: form-encoded POST with basic auth.
pub struct TwilioSmsSender {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSmsSender {
    pub fn from_config(config: &TwilioConfig) -> Result<Self, SmsError> {
        Self::with_base_url(config, TWILIO_BASE_URL)
    }

    pub fn with_base_url(config: &TwilioConfig, base_url: &str) -> Result<Self, SmsError> {
        let client =
            Client::builder().build().map_err(|error| SmsError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.expose_secret().to_string(),
            from_number: config.from_number.clone(),
        })
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|error| SmsError::Transport(error.to_string()))?;

        let status = response.status();
        let payload =
            response.text().await.map_err(|error| SmsError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(SmsError::Status { status: status.as_u16(), body: payload });
        }

        let parsed: serde_json::Value = serde_json::from_str(&payload)
            .map_err(|error| SmsError::MalformedResponse(error.to_string()))?;
        let sid = parsed["sid"]
            .as_str()
            .ok_or_else(|| SmsError::MalformedResponse("missing sid".to_string()))?;

        info!(to, sid, "sms dispatched");
        Ok(sid.to_string())
    }
}

/// Test double that records every send and can be scripted to fail.
#[derive(Default)]
pub struct RecordingSmsSender {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    sent: Vec<(String, String)>,
    failures: Vec<SmsError>,
    counter: u64,
}

impl RecordingSmsSender {
    pub fn failing_once(error: SmsError) -> Self {
        Self { state: Mutex::new(RecordingState { failures: vec![error], ..Default::default() }) }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        let mut state = self.state.lock().await;
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }

        state.counter += 1;
        let sid = format!("SM{:08}", state.counter);
        state.sent.push((to.to_string(), body.to_string()));
        Ok(sid)
    }
}

#[cfg(test)]
mod tests {
    use super::{NoopSmsSender, RecordingSmsSender, SmsError, SmsSender};

    #[tokio::test]
    async fn noop_sender_reports_success() {
        let sender = NoopSmsSender;
        let sid = sender.send("+15551234567", "hello").await.expect("noop send");
        assert_eq!(sid, "noop");
    }

    #[tokio::test]
    async fn recording_sender_captures_messages_in_order() {
        let sender = RecordingSmsSender::default();
        sender.send("+15551234567", "first").await.expect("send first");
        sender.send("+15550009999", "second").await.expect("send second");

        let sent = sender.sent().await;
        assert_eq!(
            sent,
            vec![
                ("+15551234567".to_string(), "first".to_string()),
                ("+15550009999".to_string(), "second".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_then_clears() {
        let sender =
            RecordingSmsSender::failing_once(SmsError::Transport("provider down".to_string()));

        let first = sender.send("+15551234567", "hello").await;
        assert!(matches!(first, Err(SmsError::Transport(_))));

        let second = sender.send("+15551234567", "hello").await;
        assert!(second.is_ok());
        assert_eq!(sender.sent().await.len(), 1);
    }
}
