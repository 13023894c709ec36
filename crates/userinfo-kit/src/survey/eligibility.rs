//! The survey eligibility engine.
//!
//! Decides, from the locally persisted counters and the remote usage history,
//! whether to present the survey now. The decision is always a clean boolean
//! plus a human-readable reason. A data problem makes the user ineligible,
//! it never bubbles an error into the host's check.
//!
//! The rules are ordered and the first match decides. The ordering is
//! load-bearing: the first-time rule short-circuits the cooldown and growth
//! gates so a brand-new qualifying user does not wait 90 days, while every
//! later presentation goes through the full cooldown + growth + decline gate.
//!
//! The eligibility read and the "shown" write are not one remote
//! transaction: two devices racing the same account can both pass and both
//! record shown. Accepted: the expected pattern is one survey per install.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{AuthProvider, DocumentStore};
use crate::config::ReleaseChannel;
use crate::errors::StoreError;
use crate::prefs::{
    Prefs, HAS_ANSWERED_PMF, LAST_DECLINED_ACCESS_COUNT, LAST_PMF_SHOWN_TIMESTAMP,
    USAGE_COUNT_AT_LAST_SURVEY,
};
use crate::survey::records::PmfResponseStore;
use crate::survey::response::PmfAnswers;
use crate::users::USERS_COLLECTION;

const NINETY_DAYS_SECS: f64 = 90.0 * 24.0 * 60.0 * 60.0;
/// Usage count that qualifies a never-surveyed user.
const FIRST_SURVEY_USAGE: i64 = 4;
/// Required usage growth between presentations.
const REQUIRED_GROWTH: i64 = 10;
/// Required usage growth after an explicit decline.
const REQUIRED_GROWTH_AFTER_DECLINE: i64 = 3;

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub eligible: bool,
    pub reason: String,
}

impl Decision {
    fn show(reason: &str) -> Self {
        Decision {
            eligible: true,
            reason: reason.to_string(),
        }
    }

    fn skip(reason: &str) -> Self {
        Decision {
            eligible: false,
            reason: reason.to_string(),
        }
    }
}

pub struct PmfEngine {
    auth: Arc<dyn AuthProvider>,
    docs: Arc<dyn DocumentStore>,
    prefs: Arc<Prefs>,
    records: PmfResponseStore,
    channel: ReleaseChannel,
    /// One presentation instance per engine: the upsert key every answer of
    /// this survey run lands under.
    session_id: String,
    /// Usage count from the most recent remote fetch, snapshotted into
    /// stored responses.
    last_usage_count: tokio::sync::Mutex<Option<i64>>,
}

impl PmfEngine {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        docs: Arc<dyn DocumentStore>,
        prefs: Arc<Prefs>,
        channel: ReleaseChannel,
    ) -> Self {
        Self {
            auth,
            records: PmfResponseStore::new(docs.clone()),
            docs,
            prefs,
            channel,
            session_id: Uuid::new_v4().to_string(),
            last_usage_count: tokio::sync::Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether to present the survey now. `force` skips the usage gates (for
    /// internal builds) but never wins over the production-channel gate, and
    /// a forced presentation is not recorded as shown.
    pub async fn should_show(&self, force: bool) -> Decision {
        if self.channel.is_production() {
            return Decision::skip("No PMF show: production channel");
        }
        if force {
            debug!("forced PMF presentation");
            return Decision::show("Force show PMF");
        }

        let Some(uid) = self.auth.current_user_id().await else {
            return Decision::skip("No PMF show: user ID not found");
        };

        match self.evaluate(&uid).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("PMF eligibility check failed: {e}");
                Decision::skip(&format!("No PMF show: error retrieving user data: {e}"))
            }
        }
    }

    async fn evaluate(&self, uid: &str) -> Result<Decision, StoreError> {
        let last_shown = self.prefs.get_f64(LAST_PMF_SHOWN_TIMESTAMP).await?;
        let usage_at_last_survey = self.prefs.get_i64(USAGE_COUNT_AT_LAST_SURVEY).await?;
        let last_declined = self.prefs.get_i64(LAST_DECLINED_ACCESS_COUNT).await?;

        let Some(total_usage) = self.fetch_usage_count(uid).await? else {
            return Ok(Decision::skip(
                "No PMF show: invalid access dates format or missing data",
            ));
        };
        *self.last_usage_count.lock().await = Some(total_usage);

        if usage_at_last_survey == 0 && total_usage >= FIRST_SURVEY_USAGE {
            self.record_shown(total_usage).await?;
            return Ok(Decision::show("Eligible for the first PMF survey"));
        }

        let since_last_shown = Utc::now().timestamp() as f64 - last_shown;
        if since_last_shown < NINETY_DAYS_SECS {
            return Ok(Decision::skip(
                "No PMF show: not enough time since last survey",
            ));
        }

        if total_usage - usage_at_last_survey < REQUIRED_GROWTH {
            return Ok(Decision::skip(
                "No PMF show: not enough additional usage since last survey",
            ));
        }

        if last_declined > 0 && total_usage - last_declined < REQUIRED_GROWTH_AFTER_DECLINE {
            return Ok(Decision::skip(
                "No PMF show: not enough access dates since last PMF decline",
            ));
        }

        self.record_shown(total_usage).await?;
        Ok(Decision::show("User is eligible to be shown the PMF survey"))
    }

    /// The user's total usage count from the remote document, or `None` when
    /// the document or its access-date field is missing/malformed. A single
    /// non-string element poisons the whole history: counting off a partially
    /// readable array could record shown state from bad data.
    async fn fetch_usage_count(&self, uid: &str) -> Result<Option<i64>, StoreError> {
        let Some(doc) = self.docs.get_document(USERS_COLLECTION, uid).await? else {
            return Ok(None);
        };
        let Some(Value::Array(dates)) = doc.get("accessDates") else {
            return Ok(None);
        };
        if !dates.iter().all(Value::is_string) {
            return Ok(None);
        }
        Ok(Some(dates.len() as i64))
    }

    /// Stamps the shown timestamp and the usage snapshot together; a single
    /// decision produces both writes.
    async fn record_shown(&self, current_usage: i64) -> Result<(), StoreError> {
        let now = Utc::now().timestamp() as f64;
        self.prefs
            .set_many(&[
                (LAST_PMF_SHOWN_TIMESTAMP, json!(now)),
                (USAGE_COUNT_AT_LAST_SURVEY, json!(current_usage)),
            ])
            .await?;
        info!("PMF survey recorded: timestamp {now}, usage count {current_usage}");
        Ok(())
    }

    /// Records an explicit decline: the current usage count becomes the
    /// decline snapshot. Deliberately does not touch the shown timestamp, so
    /// a re-trigger after a decline is governed by the decline rule alone.
    pub async fn decline(&self) -> Result<(), StoreError> {
        let uid = self
            .auth
            .current_user_id()
            .await
            .ok_or_else(|| StoreError::Backend("no authenticated user".to_string()))?;
        let Some(total_usage) = self.fetch_usage_count(&uid).await? else {
            return Err(StoreError::Backend(
                "invalid access dates format or missing data".to_string(),
            ));
        };
        self.prefs
            .set(LAST_DECLINED_ACCESS_COUNT, json!(total_usage))
            .await?;
        info!("PMF declined at usage count {total_usage}");
        Ok(())
    }

    /// Marks the survey fully answered. The flag is persisted but not
    /// consulted by any gating rule; see the engine tests for the pinned
    /// behavior.
    pub async fn mark_answered(&self) -> Result<(), StoreError> {
        self.prefs.set(HAS_ANSWERED_PMF, json!(true)).await
    }

    /// Persists one survey step's answers under this engine's session,
    /// snapshotting the usage count from the last eligibility fetch.
    pub async fn store_response(&self, answers: &PmfAnswers) -> Result<(), StoreError> {
        let uid = self
            .auth
            .current_user_id()
            .await
            .ok_or_else(|| StoreError::Backend("no authenticated user".to_string()))?;
        let usage_count = *self.last_usage_count.lock().await;
        self.records
            .upsert(&uid, &self.session_id, answers, usage_count)
            .await
    }

    /// Clears the answered/declined flags. Test and debug tooling only.
    pub async fn reset_local_state(&self) -> Result<(), StoreError> {
        self.prefs.remove(HAS_ANSWERED_PMF).await?;
        self.prefs.remove(LAST_DECLINED_ACCESS_COUNT).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryAuth, MemoryDocumentStore};
    use crate::backend::Document;
    use crate::survey::response::PmfFeedback;

    struct Fixture {
        _dir: tempfile::TempDir,
        auth: Arc<MemoryAuth>,
        docs: Arc<MemoryDocumentStore>,
        prefs: Arc<Prefs>,
        engine: PmfEngine,
    }

    async fn fixture(channel: ReleaseChannel) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let auth = Arc::new(MemoryAuth::new());
        let docs = Arc::new(MemoryDocumentStore::new());
        let prefs = Arc::new(Prefs::new(dir.path().join("prefs.json")).unwrap());
        let engine = PmfEngine::new(auth.clone(), docs.clone(), prefs.clone(), channel);
        Fixture {
            _dir: dir,
            auth,
            docs,
            prefs,
            engine,
        }
    }

    async fn seed_usage(f: &Fixture, uid: &str, days: usize) {
        let dates: Vec<Value> = (0..days).map(|i| json!(format!("2026-01-{:02}", i + 1))).collect();
        let mut doc = Document::new();
        doc.insert("accessDates".into(), Value::Array(dates));
        f.docs.seed(USERS_COLLECTION, uid, doc).await;
        f.auth.force_sign_in(uid).await;
    }

    fn days_ago(days: f64) -> f64 {
        Utc::now().timestamp() as f64 - days * 24.0 * 60.0 * 60.0
    }

    #[tokio::test]
    async fn test_first_time_threshold() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 3).await;
        assert!(!f.engine.should_show(false).await.eligible);

        seed_usage(&f, "u1", 4).await;
        let decision = f.engine.should_show(false).await;
        assert!(decision.eligible, "reason: {}", decision.reason);

        // Eligibility recorded the shown state atomically.
        assert_eq!(f.prefs.get_i64(USAGE_COUNT_AT_LAST_SURVEY).await.unwrap(), 4);
        assert!(f.prefs.get_f64(LAST_PMF_SHOWN_TIMESTAMP).await.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_regardless_of_growth() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 60).await;
        f.prefs
            .set_many(&[
                (LAST_PMF_SHOWN_TIMESTAMP, json!(days_ago(10.0))),
                (USAGE_COUNT_AT_LAST_SURVEY, json!(10)),
            ])
            .await
            .unwrap();

        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("not enough time"));
    }

    #[tokio::test]
    async fn test_usage_growth_gate() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 15).await;
        f.prefs
            .set_many(&[
                (LAST_PMF_SHOWN_TIMESTAMP, json!(days_ago(100.0))),
                (USAGE_COUNT_AT_LAST_SURVEY, json!(10)),
            ])
            .await
            .unwrap();

        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("additional usage"));
    }

    #[tokio::test]
    async fn test_decline_cooldown_blocks_even_when_other_gates_pass() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 21).await;
        f.prefs
            .set_many(&[
                (LAST_PMF_SHOWN_TIMESTAMP, json!(days_ago(100.0))),
                (USAGE_COUNT_AT_LAST_SURVEY, json!(10)),
                (LAST_DECLINED_ACCESS_COUNT, json!(20)),
            ])
            .await
            .unwrap();

        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("decline"));
    }

    #[tokio::test]
    async fn test_all_gates_passing_is_eligible_and_records_shown() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 25).await;
        f.prefs
            .set_many(&[
                (LAST_PMF_SHOWN_TIMESTAMP, json!(days_ago(100.0))),
                (USAGE_COUNT_AT_LAST_SURVEY, json!(10)),
                (LAST_DECLINED_ACCESS_COUNT, json!(20)),
            ])
            .await
            .unwrap();

        let decision = f.engine.should_show(false).await;
        assert!(decision.eligible, "reason: {}", decision.reason);
        assert_eq!(
            f.prefs.get_i64(USAGE_COUNT_AT_LAST_SURVEY).await.unwrap(),
            25
        );
    }

    #[tokio::test]
    async fn test_no_identity_is_ineligible() {
        let f = fixture(ReleaseChannel::Staging).await;
        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("user ID not found"));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_usage_history_is_ineligible() {
        let f = fixture(ReleaseChannel::Staging).await;
        f.auth.force_sign_in("u1").await;
        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("access dates"));

        // Present but not an array.
        let mut doc = Document::new();
        doc.insert("accessDates".into(), json!("2026-01-01"));
        f.docs.seed(USERS_COLLECTION, "u1", doc).await;
        assert!(!f.engine.should_show(false).await.eligible);
    }

    #[tokio::test]
    async fn test_non_string_access_dates_are_rejected_not_counted() {
        let f = fixture(ReleaseChannel::Staging).await;
        f.auth.force_sign_in("u1").await;

        // Four elements, so counting them would clear the first-time gate.
        let mut doc = Document::new();
        doc.insert("accessDates".into(), json!([1, 2, 3, 4]));
        f.docs.seed(USERS_COLLECTION, "u1", doc).await;

        let decision = f.engine.should_show(false).await;
        assert!(!decision.eligible);
        assert!(decision.reason.contains("access dates"));
        // Malformed history must not record shown state.
        assert_eq!(f.prefs.get_f64(LAST_PMF_SHOWN_TIMESTAMP).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_production_channel_wins_over_force() {
        let f = fixture(ReleaseChannel::Production).await;
        seed_usage(&f, "u1", 50).await;
        assert!(!f.engine.should_show(true).await.eligible);
        assert!(!f.engine.should_show(false).await.eligible);
    }

    #[tokio::test]
    async fn test_force_does_not_record_shown() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 1).await;
        let decision = f.engine.should_show(true).await;
        assert!(decision.eligible);
        assert_eq!(f.prefs.get_f64(LAST_PMF_SHOWN_TIMESTAMP).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_decline_snapshots_current_usage_only() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 7).await;
        f.engine.decline().await.unwrap();
        assert_eq!(f.prefs.get_i64(LAST_DECLINED_ACCESS_COUNT).await.unwrap(), 7);
        // Decline leaves the shown timestamp alone.
        assert_eq!(f.prefs.get_f64(LAST_PMF_SHOWN_TIMESTAMP).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_mark_answered_does_not_gate_eligibility() {
        // Known discrepancy, pinned on purpose: the answered flag is written
        // but never read by the rules, so an answered user who qualifies is
        // still offered the survey.
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 10).await;
        f.engine.mark_answered().await.unwrap();
        assert!(f.prefs.get_bool(HAS_ANSWERED_PMF).await.unwrap());

        let decision = f.engine.should_show(false).await;
        assert!(decision.eligible, "reason: {}", decision.reason);
    }

    #[tokio::test]
    async fn test_store_response_uses_engine_session_and_usage_snapshot() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 10).await;
        assert!(f.engine.should_show(false).await.eligible);

        f.engine
            .store_response(&PmfAnswers {
                feedback: Some(PmfFeedback::VeryDisappointed),
                ..Default::default()
            })
            .await
            .unwrap();
        f.engine
            .store_response(&PmfAnswers {
                main_benefit: Some("quick lookups".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let responses = f.engine.records.fetch_for_user("u1").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].session_id, f.engine.session_id());
        assert_eq!(responses[0].usage_count_at_survey, Some(10));
        assert_eq!(responses[0].feedback, Some(PmfFeedback::VeryDisappointed));
        assert_eq!(responses[0].main_benefit.as_deref(), Some("quick lookups"));
    }

    #[tokio::test]
    async fn test_reset_local_state_clears_answer_and_decline_flags() {
        let f = fixture(ReleaseChannel::Staging).await;
        seed_usage(&f, "u1", 7).await;
        f.engine.mark_answered().await.unwrap();
        f.engine.decline().await.unwrap();

        f.engine.reset_local_state().await.unwrap();
        assert!(!f.prefs.get_bool(HAS_ANSWERED_PMF).await.unwrap());
        assert_eq!(
            f.prefs.get_i64(LAST_DECLINED_ACCESS_COUNT).await.unwrap(),
            0
        );
    }
}
