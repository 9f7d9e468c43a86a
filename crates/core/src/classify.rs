use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of guest intents the conversation pipeline understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ScheduleChange,
    Cancel,
    EtaQuestion,
    LocationQuestion,
    DriverContact,
    GeneralQuestion,
    Confirmation,
    Thanks,
    Unclear,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleChange => "schedule_change",
            Self::Cancel => "cancel",
            Self::EtaQuestion => "eta_question",
            Self::LocationQuestion => "location_question",
            Self::DriverContact => "driver_contact",
            Self::GeneralQuestion => "general_question",
            Self::Confirmation => "confirmation",
            Self::Thanks => "thanks",
            Self::Unclear => "unclear",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "schedule_change" => Some(Self::ScheduleChange),
            "cancel" => Some(Self::Cancel),
            "eta_question" => Some(Self::EtaQuestion),
            "location_question" => Some(Self::LocationQuestion),
            "driver_contact" => Some(Self::DriverContact),
            "general_question" => Some(Self::GeneralQuestion),
            "confirmation" => Some(Self::Confirmation),
            "thanks" => Some(Self::Thanks),
            "unclear" => Some(Self::Unclear),
            _ => None,
        }
    }
}

/// Structured details the classifier pulled out of the guest message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub new_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_adjustment: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self.new_time.is_none() && self.time_adjustment.is_none() && self.question.is_none()
    }
}

/// The validated result of one classification call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    #[serde(default)]
    pub extracted_data: ExtractedData,
    #[serde(default)]
    pub suggested_response: Option<String>,
    pub needs_human: bool,
}

impl Classification {
    /// The safe result used whenever classification fails for any reason.
    /// A guest message must never go unanswered because the language
    /// service misbehaved.
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Unclear,
            confidence: 0.0,
            extracted_data: ExtractedData::default(),
            suggested_response: Some("I'll connect you with your driver right away.".to_string()),
            needs_human: true,
        }
    }
}
