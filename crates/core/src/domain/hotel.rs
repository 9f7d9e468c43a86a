use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::reminder::ReminderKind;
use crate::template::default_template;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotelId(pub String);

impl HotelId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Per-hotel reminder configuration. Template overrides are keyed by
/// reminder kind; missing entries fall back to the built-in defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub lead_time_minutes: u32,
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self { enabled: true, lead_time_minutes: 5, templates: BTreeMap::new() }
    }
}

impl ReminderSettings {
    pub fn template_for(&self, kind: ReminderKind) -> &str {
        self.templates.get(kind.as_str()).map(String::as_str).unwrap_or(default_template(kind))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: HotelId,
    pub name: String,
    pub reminder_settings: ReminderSettings,
    pub created_at: DateTime<Utc>,
}
