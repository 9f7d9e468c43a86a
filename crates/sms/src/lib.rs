//! Messaging-provider boundary.
//!
//! Everything that leaves the system as an SMS goes through the
//! [`SmsSender`] port: guest replies, driver escalations, confirmations,
//! and reminders. The Twilio implementation posts to the provider's REST
//! API; the no-op implementation keeps local development and unconfigured
//! deployments send-free without changing any call sites.

pub mod sender;

pub use sender::{NoopSmsSender, RecordingSmsSender, SmsError, SmsSender, TwilioSmsSender};
