//! Persistence of survey-response records inside the per-user document.
//!
//! The records live as an array field on the user document, so every
//! mutation is a read-modify-write of the whole array. There is no optimistic
//! concurrency check: concurrent upserts on the same user document are
//! last-write-wins (accepted: a single device answering a single survey is
//! the expected write pattern).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{Document, DocumentStore};
use crate::errors::StoreError;
use crate::survey::response::{PmfAnswers, PmfResponse};
use crate::users::USERS_COLLECTION;

const F_PMF_RESPONSES: &str = "pmfResponses";

pub struct PmfResponseStore {
    docs: Arc<dyn DocumentStore>,
}

impl PmfResponseStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    async fn load_responses(&self, user_id: &str) -> Result<Vec<Value>, StoreError> {
        let doc = self.docs.get_document(USERS_COLLECTION, user_id).await?;
        Ok(doc
            .and_then(|d| d.get(F_PMF_RESPONSES).cloned())
            .and_then(|v| match v {
                Value::Array(arr) => Some(arr),
                _ => None,
            })
            .unwrap_or_default())
    }

    async fn write_responses(
        &self,
        user_id: &str,
        responses: Vec<Value>,
    ) -> Result<(), StoreError> {
        let mut fields = serde_json::Map::new();
        fields.insert(F_PMF_RESPONSES.to_string(), Value::Array(responses));
        self.docs
            .set_fields(USERS_COLLECTION, user_id, fields, true)
            .await
    }

    /// Upserts one survey step's answers into the record keyed by
    /// `session_id`.
    ///
    /// An existing record keeps every field the step did not supply; a new
    /// record is appended otherwise. Either way `answeredAt` and the usage
    /// snapshot are refreshed.
    pub async fn upsert(
        &self,
        user_id: &str,
        session_id: &str,
        answers: &PmfAnswers,
        usage_count: Option<i64>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut responses = self.load_responses(user_id).await?;

        let existing = responses
            .iter()
            .position(|v| v.get("sessionID").and_then(Value::as_str) == Some(session_id));

        match existing {
            Some(idx) => {
                // Decode, merge, re-encode through the typed record so field
                // handling stays in one place. An undecodable entry is
                // replaced outright.
                let merged = match PmfResponse::from_value(&responses[idx]) {
                    Some(mut record) => {
                        record.merge(answers, usage_count, now);
                        record
                    }
                    None => new_record(user_id, session_id, answers, usage_count, now),
                };
                responses[idx] = merged.to_value();
            }
            None => {
                responses
                    .push(new_record(user_id, session_id, answers, usage_count, now).to_value());
            }
        }

        self.write_responses(user_id, responses).await?;
        info!("stored PMF response for session {session_id}");
        Ok(())
    }

    /// Removes the record for `session_id` under one user. This is the production
    /// deletion path. `NotFound` when the user has no such record.
    pub async fn delete_by_session_scoped(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let mut responses = self.load_responses(user_id).await?;
        let before = responses.len();
        responses.retain(|v| v.get("sessionID").and_then(Value::as_str) != Some(session_id));
        if responses.len() == before {
            return Err(StoreError::NotFound(format!("pmf session {session_id}")));
        }
        self.write_responses(user_id, responses).await?;
        info!("deleted PMF response {session_id} for user {user_id}");
        Ok(())
    }

    /// Removes the first record matching `session_id` across *all* user
    /// documents, in scan order, and returns the owning user id.
    ///
    /// Linear in total user count and order-dependent when a session id
    /// somehow appears under several users. Debug/admin use only; production
    /// callers know the owner and use the scoped variant.
    pub async fn delete_by_session(&self, session_id: &str) -> Result<String, StoreError> {
        let users = self.docs.list_documents(USERS_COLLECTION).await?;
        for (user_id, doc) in users {
            let has_match = doc
                .get(F_PMF_RESPONSES)
                .and_then(Value::as_array)
                .is_some_and(|arr| {
                    arr.iter()
                        .any(|v| v.get("sessionID").and_then(Value::as_str) == Some(session_id))
                });
            if has_match {
                self.delete_by_session_scoped(&user_id, session_id).await?;
                return Ok(user_id);
            }
        }
        Err(StoreError::NotFound(format!("pmf session {session_id}")))
    }

    /// Every parseable response across users with a non-empty record array.
    /// Administrative reporting only.
    pub async fn fetch_all(&self) -> Result<Vec<PmfResponse>, StoreError> {
        let users = self.docs.list_documents(USERS_COLLECTION).await?;
        let mut all = Vec::new();
        for (user_id, doc) in users {
            let Some(arr) = doc.get(F_PMF_RESPONSES).and_then(Value::as_array) else {
                continue;
            };
            let parsed: Vec<_> = arr.iter().filter_map(PmfResponse::from_value).collect();
            debug!("user {user_id} has {} PMF responses", parsed.len());
            all.extend(parsed);
        }
        Ok(all)
    }

    /// Responses for a single user, newest answers included as stored.
    pub async fn fetch_for_user(&self, user_id: &str) -> Result<Vec<PmfResponse>, StoreError> {
        Ok(self
            .load_responses(user_id)
            .await?
            .iter()
            .filter_map(PmfResponse::from_value)
            .collect())
    }

    /// Ids of the users holding at least one response. Administrative.
    pub async fn users_with_responses(&self) -> Result<Vec<String>, StoreError> {
        // The hosted store's equality queries cannot express "non-empty
        // array", so this filters a full listing like fetch_all does.
        let users = self.docs.list_documents(USERS_COLLECTION).await?;
        Ok(users
            .into_iter()
            .filter(|(_, doc)| {
                doc.get(F_PMF_RESPONSES)
                    .and_then(Value::as_array)
                    .is_some_and(|arr| !arr.is_empty())
            })
            .map(|(id, _)| id)
            .collect())
    }
}

fn new_record(
    user_id: &str,
    session_id: &str,
    answers: &PmfAnswers,
    usage_count: Option<i64>,
    now: chrono::DateTime<Utc>,
) -> PmfResponse {
    PmfResponse {
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        feedback: answers.feedback,
        main_benefit: answers.main_benefit.clone(),
        improvement_suggestions: answers.improvement_suggestions.clone(),
        usage_count_at_survey: usage_count,
        answered_at: now,
        metadata: Document::new(),
    }
}

/// Seeds a user document whose only content is a response array.
#[cfg(test)]
fn responses_doc(responses: &[Value]) -> Document {
    let mut doc = Document::new();
    doc.insert(F_PMF_RESPONSES.to_string(), Value::Array(responses.to_vec()));
    doc
}
