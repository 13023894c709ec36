//! Typed survey-response records and their document mapping.
//!
//! Like the user profile, the record's field names live only here. The
//! on-wire shape keeps the legacy conventions: `answeredAt` is epoch seconds,
//! absent text answers may appear as empty strings in old records, and
//! records written before ownership was tracked carry no user id.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::backend::Document;

const F_SESSION_ID: &str = "sessionID";
const F_USER_ID: &str = "userID";
const F_FEEDBACK: &str = "feedback";
const F_MAIN_BENEFIT: &str = "mainBenefit";
const F_IMPROVEMENT_SUGGESTIONS: &str = "improvementSuggestions";
const F_USAGE_COUNT_AT_SURVEY: &str = "usageCountAtSurvey";
const F_ANSWERED_AT: &str = "answeredAt";

const KNOWN_FIELDS: &[&str] = &[
    F_SESSION_ID,
    F_USER_ID,
    F_FEEDBACK,
    F_MAIN_BENEFIT,
    F_IMPROVEMENT_SUGGESTIONS,
    F_USAGE_COUNT_AT_SURVEY,
    F_ANSWERED_AT,
];

/// Owner id stamped on legacy records that predate ownership tracking.
pub const UNKNOWN_USER_ID: &str = "NO ID";

/// The fixed choice set of the survey's multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmfFeedback {
    VeryDisappointed,
    SomewhatDisappointed,
    NotDisappointed,
}

impl PmfFeedback {
    pub fn as_str(self) -> &'static str {
        match self {
            PmfFeedback::VeryDisappointed => "Very disappointed",
            PmfFeedback::SomewhatDisappointed => "Somewhat disappointed",
            PmfFeedback::NotDisappointed => "Not disappointed",
        }
    }

    pub fn parse(s: &str) -> Option<PmfFeedback> {
        match s.trim().to_lowercase().as_str() {
            "very disappointed" => Some(PmfFeedback::VeryDisappointed),
            "somewhat disappointed" => Some(PmfFeedback::SomewhatDisappointed),
            "not disappointed" => Some(PmfFeedback::NotDisappointed),
            _ => None,
        }
    }
}

/// One user's answer to one presentation of the survey. `session_id` is the
/// upsert key: at most one record exists per session per user.
#[derive(Debug, Clone, PartialEq)]
pub struct PmfResponse {
    pub session_id: String,
    pub user_id: String,
    pub feedback: Option<PmfFeedback>,
    pub main_benefit: Option<String>,
    pub improvement_suggestions: Option<String>,
    pub usage_count_at_survey: Option<i64>,
    pub answered_at: DateTime<Utc>,
    /// Fields this library does not model, e.g. the legacy
    /// `accessDateCount`. Carried through decode, merge, and re-encode
    /// untouched so an upsert never strips what an older client wrote.
    pub metadata: Document,
}

/// The answer fields a single survey step supplies. `None` means "not
/// answered in this step", and an upsert leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct PmfAnswers {
    pub feedback: Option<PmfFeedback>,
    pub main_benefit: Option<String>,
    pub improvement_suggestions: Option<String>,
}

impl PmfResponse {
    /// Decodes a record from its raw map form. `None` when the entry lacks a
    /// session id or a readable timestamp; such entries are skipped, not
    /// surfaced as errors.
    pub fn from_value(value: &Value) -> Option<PmfResponse> {
        let map = value.as_object()?;
        let session_id = map.get(F_SESSION_ID)?.as_str()?.to_string();
        let answered_at = decode_epoch_seconds(map.get(F_ANSWERED_AT)?)?;

        let text_field = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Some(PmfResponse {
            session_id,
            user_id: map
                .get(F_USER_ID)
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_USER_ID)
                .to_string(),
            feedback: text_field(F_FEEDBACK).as_deref().and_then(PmfFeedback::parse),
            main_benefit: text_field(F_MAIN_BENEFIT),
            improvement_suggestions: text_field(F_IMPROVEMENT_SUGGESTIONS),
            usage_count_at_survey: map.get(F_USAGE_COUNT_AT_SURVEY).and_then(Value::as_i64),
            answered_at,
            metadata: map
                .iter()
                .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Document::new();
        map.insert(F_SESSION_ID.to_string(), json!(self.session_id));
        map.insert(F_USER_ID.to_string(), json!(self.user_id));
        if let Some(feedback) = self.feedback {
            map.insert(F_FEEDBACK.to_string(), json!(feedback.as_str()));
        }
        if let Some(benefit) = &self.main_benefit {
            map.insert(F_MAIN_BENEFIT.to_string(), json!(benefit));
        }
        if let Some(suggestions) = &self.improvement_suggestions {
            map.insert(F_IMPROVEMENT_SUGGESTIONS.to_string(), json!(suggestions));
        }
        if let Some(count) = self.usage_count_at_survey {
            map.insert(F_USAGE_COUNT_AT_SURVEY.to_string(), json!(count));
        }
        map.insert(
            F_ANSWERED_AT.to_string(),
            json!(self.answered_at.timestamp() as f64),
        );
        for (k, v) in &self.metadata {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// Merges one step's answers into this record, preserving fields the
    /// step did not supply, and refreshes the timestamp and usage snapshot.
    pub fn merge(&mut self, answers: &PmfAnswers, usage_count: Option<i64>, now: DateTime<Utc>) {
        if let Some(feedback) = answers.feedback {
            self.feedback = Some(feedback);
        }
        if let Some(benefit) = &answers.main_benefit {
            self.main_benefit = Some(benefit.clone());
        }
        if let Some(suggestions) = &answers.improvement_suggestions {
            self.improvement_suggestions = Some(suggestions.clone());
        }
        self.usage_count_at_survey = usage_count;
        self.answered_at = now;
    }
}

fn decode_epoch_seconds(value: &Value) -> Option<DateTime<Utc>> {
    let secs = value.as_f64()?;
    Utc.timestamp_opt(secs as i64, 0).single()
}
