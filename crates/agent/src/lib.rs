//! Language-understanding boundary for guest conversations.
//!
//! This crate turns a raw guest SMS plus conversational context into a
//! validated [`curbside_core::Classification`]:
//!
//! 1. **Prompting** (`classifier`) - render guest/ride context into the
//!    system and user prompts
//! 2. **Completion** (`llm`) - pluggable `LlmClient` port with an HTTP
//!    implementation, bounded by the configured timeout
//! 3. **Validation** (`classifier`) - locate the JSON payload in the raw
//!    completion (fenced or not) and deserialize it against the strict
//!    schema
//!
//! # Safety principle
//!
//! The model is strictly a translator. Ride mutations, reply selection, and
//! escalation decisions are made deterministically by the routing policy in
//! `curbside-core`; a classification failure degrades to a safe fallback
//! (`unclear`, escalate to a human) and never to an unanswered guest.

pub mod classifier;
pub mod llm;

pub use classifier::{ClassifyRequest, IntentClassifier};
pub use llm::{HttpLlmClient, LlmClient, LlmError};
