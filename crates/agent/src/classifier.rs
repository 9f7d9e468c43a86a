use std::sync::Arc;

use tracing::warn;

use curbside_core::classify::Classification;
use curbside_core::domain::guest::Guest;
use curbside_core::domain::ride::Ride;
use curbside_core::template::format_date_and_time;

use crate::llm::LlmClient;

const SYSTEM_PROMPT: &str = "You are an assistant for a luxury hotel transportation service. \
Your job is to understand guest SMS messages and determine their intent.\n\n\
You must respond with valid JSON containing:\n\
- intent: one of \"schedule_change\", \"cancel\", \"eta_question\", \"location_question\", \
\"driver_contact\", \"general_question\", \"confirmation\", \"thanks\", \"unclear\"\n\
- confidence: number between 0 and 1\n\
- extracted_data: object with any relevant extracted info like:\n\
  - new_time: ISO 8601 UTC datetime if they're rescheduling to an absolute time\n\
  - time_adjustment: string like \"+30 minutes\" or \"-1 hour\" for relative changes\n\
  - question: the specific question if asking something\n\
- suggested_response: your suggested text response to the guest (keep it concise, warm, \
professional)\n\
- needs_human: boolean - true if this should be escalated to the driver\n\n\
Be concise and luxurious in tone. Never use emojis. Be warm but professional.";

/// Everything the classifier knows about the sender of one message.
#[derive(Clone, Copy, Debug)]
pub struct ClassifyRequest<'a> {
    pub guest: &'a Guest,
    pub hotel_name: Option<&'a str>,
    pub ride: Option<&'a Ride>,
    pub message_body: &'a str,
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classifies one guest message. Never returns an error: any
    /// completion or validation failure degrades to
    /// [`Classification::fallback`], which escalates to a human and still
    /// answers the guest.
    pub async fn classify(&self, request: ClassifyRequest<'_>) -> Classification {
        let user_prompt = build_user_prompt(&request);

        let raw = match self.llm.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(error = %error, "classification call failed; using fallback");
                return Classification::fallback();
            }
        };

        match parse_classification(&raw) {
            Ok(classification) => classification,
            Err(reason) => {
                warn!(reason = %reason, "classification output rejected; using fallback");
                Classification::fallback()
            }
        }
    }
}

fn build_user_prompt(request: &ClassifyRequest<'_>) -> String {
    let guest = request.guest;
    let ride_block = match request.ride {
        Some(ride) => format!(
            "Upcoming ride:\n- Pickup time: {}\n- Pickup location: {}\n- Destination: {}\n- Status: {}",
            format_date_and_time(ride.pickup_time),
            ride.pickup_location,
            ride.dropoff_location,
            ride.status.as_str(),
        ),
        None => "No upcoming rides scheduled.".to_string(),
    };

    format!(
        "Guest info:\n- Name: {}\n- Current hotel: {}\n- Room: {}\n\n{}\n\nGuest message: \"{}\"\n\n\
         Parse this message and respond with JSON only.",
        guest.name,
        request.hotel_name.unwrap_or("Luxury Hotel"),
        guest.room_number.as_deref().unwrap_or("N/A"),
        ride_block,
        request.message_body,
    )
}

/// Locates the JSON payload inside the raw completion and validates it
/// against the strict schema. The model may wrap its answer in fenced code
/// blocks or commentary; anything that does not deserialize cleanly is
/// rejected rather than partially trusted.
fn parse_classification(raw: &str) -> Result<Classification, String> {
    let payload = extract_json_payload(raw);

    let classification: Classification =
        serde_json::from_str(payload).map_err(|error| error.to_string())?;

    if !(0.0..=1.0).contains(&classification.confidence) {
        return Err(format!("confidence {} out of range", classification.confidence));
    }

    Ok(classification)
}

fn extract_json_payload(raw: &str) -> &str {
    if let Some(fenced) = between(raw, "```json", "```") {
        return fenced.trim();
    }
    if let Some(fenced) = between(raw, "```", "```") {
        return fenced.trim();
    }

    // Last resort: the outermost braces, in case the model added prose.
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => raw[start..=end].trim(),
        _ => raw.trim(),
    }
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let length = text[start..].find(close)?;
    Some(&text[start..start + length])
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;

    use curbside_core::classify::Intent;
    use curbside_core::domain::guest::{Guest, GuestId};
    use curbside_core::domain::hotel::HotelId;
    use curbside_core::domain::ride::{Ride, RideId, RideStatus};

    use crate::llm::{LlmClient, LlmError};

    use super::{build_user_prompt, ClassifyRequest, IntentClassifier};

    struct ScriptedLlm {
        completions: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        fn with_script(completions: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                completions: Mutex::new(completions.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        async fn prompts(&self) -> Vec<(String, String)> {
            self.prompts.lock().await.clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, LlmError> {
            self.prompts
                .lock()
                .await
                .push((system_prompt.to_string(), user_prompt.to_string()));
            self.completions
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    fn guest() -> Guest {
        let now = Utc::now();
        Guest {
            id: GuestId("g1".to_string()),
            hotel_id: HotelId("h1".to_string()),
            name: "Ava Chen".to_string(),
            phone: "+15551234567".to_string(),
            email: None,
            room_number: Some("1204".to_string()),
            check_in_date: None,
            check_out_date: None,
            preferences: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn ride() -> Ride {
        let now = Utc::now();
        Ride {
            id: RideId("r1".to_string()),
            guest_id: GuestId("g1".to_string()),
            driver_id: None,
            hotel_id: HotelId("h1".to_string()),
            pickup_time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            pickup_location: "Hotel Lobby".to_string(),
            pickup_notes: None,
            dropoff_location: "Airport Terminal 1".to_string(),
            dropoff_notes: None,
            passenger_count: 1,
            status: RideStatus::Scheduled,
            driver_departed_at: None,
            completed_at: None,
            special_requests: None,
            calendar_event_id: None,
            created_by: "staff".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn request<'a>(guest: &'a Guest, ride: Option<&'a Ride>) -> ClassifyRequest<'a> {
        ClassifyRequest {
            guest,
            hotel_name: Some("Seaside Grand"),
            ride,
            message_body: "can we do 30 minutes later?",
        }
    }

    #[tokio::test]
    async fn parses_a_clean_json_completion() {
        let llm = ScriptedLlm::with_script(vec![Ok(r#"{
            "intent": "schedule_change",
            "confidence": 0.93,
            "extracted_data": {"time_adjustment": "+30 minutes"},
            "suggested_response": "Of course.",
            "needs_human": false
        }"#
        .to_string())]);
        let classifier = IntentClassifier::new(llm.clone());

        let guest = guest();
        let ride = ride();
        let classification = classifier.classify(request(&guest, Some(&ride))).await;

        assert_eq!(classification.intent, Intent::ScheduleChange);
        assert_eq!(
            classification.extracted_data.time_adjustment.as_deref(),
            Some("+30 minutes")
        );
        assert!(!classification.needs_human);
    }

    #[tokio::test]
    async fn unwraps_markdown_fenced_payloads() {
        let llm = ScriptedLlm::with_script(vec![Ok(
            "Here is the result:\n```json\n{\"intent\": \"thanks\", \"confidence\": 1.0, \
             \"needs_human\": false}\n```\nLet me know if you need more."
                .to_string(),
        )]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;
        assert_eq!(classification.intent, Intent::Thanks);
    }

    #[tokio::test]
    async fn unwraps_anonymous_fences_and_surrounding_prose() {
        let llm = ScriptedLlm::with_script(vec![Ok(
            "```\n{\"intent\": \"cancel\", \"confidence\": 0.8, \"needs_human\": false}\n```"
                .to_string(),
        )]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;
        assert_eq!(classification.intent, Intent::Cancel);
    }

    #[tokio::test]
    async fn service_error_degrades_to_fallback() {
        let llm = ScriptedLlm::with_script(vec![Err(LlmError::Transport(
            "connection refused".to_string(),
        ))]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;

        assert_eq!(classification.intent, Intent::Unclear);
        assert_eq!(classification.confidence, 0.0);
        assert!(classification.needs_human);
        assert!(classification.suggested_response.is_some());
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_fallback() {
        let llm = ScriptedLlm::with_script(vec![Ok("I think they want to cancel".to_string())]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;
        assert_eq!(classification.intent, Intent::Unclear);
        assert!(classification.needs_human);
    }

    #[tokio::test]
    async fn unknown_intent_degrades_to_fallback() {
        let llm = ScriptedLlm::with_script(vec![Ok(
            r#"{"intent": "book_spa", "confidence": 0.9, "needs_human": false}"#.to_string(),
        )]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;
        assert_eq!(classification.intent, Intent::Unclear);
    }

    #[tokio::test]
    async fn out_of_range_confidence_degrades_to_fallback() {
        let llm = ScriptedLlm::with_script(vec![Ok(
            r#"{"intent": "thanks", "confidence": 7.5, "needs_human": false}"#.to_string(),
        )]);
        let classifier = IntentClassifier::new(llm);

        let guest = guest();
        let classification = classifier.classify(request(&guest, None)).await;
        assert_eq!(classification.intent, Intent::Unclear);
    }

    #[tokio::test]
    async fn prompt_carries_ride_context_when_present() {
        let llm = ScriptedLlm::with_script(vec![Ok(
            r#"{"intent": "eta_question", "confidence": 0.9, "needs_human": false}"#.to_string(),
        )]);
        let classifier = IntentClassifier::new(llm.clone());

        let guest = guest();
        let ride = ride();
        classifier.classify(request(&guest, Some(&ride))).await;

        let prompts = llm.prompts().await;
        assert_eq!(prompts.len(), 1);
        let (system, user) = &prompts[0];
        assert!(system.contains("respond with valid JSON"));
        assert!(user.contains("Hotel Lobby"));
        assert!(user.contains("Seaside Grand"));
        assert!(user.contains("can we do 30 minutes later?"));
    }

    #[test]
    fn prompt_notes_missing_ride_context() {
        let guest = guest();
        let prompt = build_user_prompt(&request(&guest, None));
        assert!(prompt.contains("No upcoming rides scheduled."));
    }
}
