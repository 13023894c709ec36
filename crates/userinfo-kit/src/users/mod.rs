//! Typed user profile documents and the directory operations over them.
//!
//! The remote document is a loose field map; `UserProfile` is the single
//! typed boundary over it. All field names live here, nowhere else, so a
//! typo is a compile error rather than a silently absent field.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::backend::{ArrayOp, Document, DocumentStore, QueryOp};
use crate::errors::StoreError;

pub const USERS_COLLECTION: &str = "users";

/// Field names of the per-user document. The survey module owns
/// `pmfResponses` and it is deliberately not mapped here.
const F_EMAIL: &str = "email";
const F_FIRST_NAME: &str = "firstName";
const F_LAST_NAME: &str = "lastName";
const F_UID: &str = "uid";
const F_SIGN_UP_DATE: &str = "signUpDate";
const F_ACCESS_DATES: &str = "accessDates";
const F_PROFILE_PICTURE_URL: &str = "profilePictureURL";

const KNOWN_FIELDS: &[&str] = &[
    F_EMAIL,
    F_FIRST_NAME,
    F_LAST_NAME,
    F_UID,
    F_SIGN_UP_DATE,
    F_ACCESS_DATES,
    F_PROFILE_PICTURE_URL,
    "pmfResponses",
];

/// One user's profile document.
///
/// `access_dates` is the usage history: the ordered list of `%Y-%m-%d`
/// strings recorded once per day of app use. Its length is the usage count
/// the survey gating rules consume.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sign_up_date: Option<String>,
    pub access_dates: Vec<String>,
    pub profile_picture_url: Option<String>,
    /// Host-specific fields this library does not model.
    pub metadata: Document,
}

impl UserProfile {
    /// Decodes a profile from its raw document. Unrecognized fields are kept
    /// in `metadata` rather than dropped.
    pub fn from_document(doc_id: &str, doc: &Document) -> Self {
        let str_field = |key: &str| doc.get(key).and_then(Value::as_str).map(String::from);
        let access_dates = doc
            .get(F_ACCESS_DATES)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let metadata = doc
            .iter()
            .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        UserProfile {
            id: str_field(F_UID).unwrap_or_else(|| doc_id.to_string()),
            email: str_field(F_EMAIL),
            first_name: str_field(F_FIRST_NAME),
            last_name: str_field(F_LAST_NAME),
            sign_up_date: str_field(F_SIGN_UP_DATE),
            access_dates,
            profile_picture_url: str_field(F_PROFILE_PICTURE_URL),
            metadata,
        }
    }

    /// Encodes the mapped fields back into a document. `None` fields are
    /// omitted, not written as null.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(F_UID.to_string(), json!(self.id));
        if let Some(email) = &self.email {
            doc.insert(F_EMAIL.to_string(), json!(email));
        }
        if let Some(first) = &self.first_name {
            doc.insert(F_FIRST_NAME.to_string(), json!(first));
        }
        if let Some(last) = &self.last_name {
            doc.insert(F_LAST_NAME.to_string(), json!(last));
        }
        if let Some(date) = &self.sign_up_date {
            doc.insert(F_SIGN_UP_DATE.to_string(), json!(date));
        }
        doc.insert(F_ACCESS_DATES.to_string(), json!(self.access_dates));
        if let Some(url) = &self.profile_picture_url {
            doc.insert(F_PROFILE_PICTURE_URL.to_string(), json!(url));
        }
        for (k, v) in &self.metadata {
            doc.insert(k.clone(), v.clone());
        }
        doc
    }
}

/// Today's access-date string, the unit the usage history is recorded in.
pub fn today_string() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Directory operations over the users collection.
pub struct UserDirectory {
    docs: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        let doc = self
            .docs
            .get_document(USERS_COLLECTION, user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("users/{user_id}")))?;
        Ok(UserProfile::from_document(user_id, &doc))
    }

    /// Looks a user up by exact email. `NotFound` when no document matches;
    /// if several do (should not happen), scan order picks one.
    pub async fn find_by_email(&self, email: &str) -> Result<UserProfile, StoreError> {
        let matches = self
            .docs
            .query(USERS_COLLECTION, F_EMAIL, QueryOp::Eq, json!(email))
            .await?;
        matches
            .first()
            .map(|(id, doc)| UserProfile::from_document(id, doc))
            .ok_or_else(|| StoreError::NotFound(format!("user with email {email}")))
    }

    pub async fn fetch_all(&self) -> Result<Vec<UserProfile>, StoreError> {
        let docs = self.docs.list_documents(USERS_COLLECTION).await?;
        Ok(docs
            .iter()
            .map(|(id, doc)| UserProfile::from_document(id, doc))
            .collect())
    }

    /// Creates the profile document for a freshly registered account, with
    /// the sign-up day as the first usage entry.
    pub async fn create_user(
        &self,
        user_id: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(), StoreError> {
        let today = today_string();
        let profile = UserProfile {
            id: user_id.to_string(),
            email: Some(email.to_string()),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            sign_up_date: Some(today.clone()),
            access_dates: vec![today],
            profile_picture_url: None,
            metadata: Document::new(),
        };
        self.docs
            .set_fields(USERS_COLLECTION, user_id, profile.to_document(), false)
            .await?;
        info!("created user document for {user_id}");
        Ok(())
    }

    /// Appends today to the usage history. Array-union semantics make this
    /// idempotent within a day.
    pub async fn record_access_today(&self, user_id: &str) -> Result<(), StoreError> {
        self.docs
            .update_field(
                USERS_COLLECTION,
                user_id,
                F_ACCESS_DATES,
                ArrayOp::Union,
                vec![json!(today_string())],
            )
            .await
    }

    /// Points the profile at a freshly stored image URL.
    pub async fn set_profile_picture_url(
        &self,
        user_id: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        let mut fields = Document::new();
        fields.insert(F_PROFILE_PICTURE_URL.to_string(), json!(url));
        self.docs
            .set_fields(USERS_COLLECTION, user_id, fields, true)
            .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.docs.delete_document(USERS_COLLECTION, user_id).await?;
        info!("deleted user document {user_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryDocumentStore;

    fn directory() -> (Arc<MemoryDocumentStore>, UserDirectory) {
        let docs = Arc::new(MemoryDocumentStore::new());
        (docs.clone(), UserDirectory::new(docs))
    }

    #[tokio::test]
    async fn test_create_then_fetch_round_trips() {
        let (_docs, dir) = directory();
        dir.create_user("u1", "a@b.com", "Ada", "Lovelace")
            .await
            .unwrap();

        let profile = dir.fetch_user("u1").await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("a@b.com"));
        assert_eq!(profile.first_name.as_deref(), Some("Ada"));
        assert_eq!(profile.access_dates.len(), 1);
        assert_eq!(profile.sign_up_date.as_deref(), Some(&*today_string()));
    }

    #[tokio::test]
    async fn test_record_access_today_is_idempotent_per_day() {
        let (_docs, dir) = directory();
        dir.create_user("u1", "a@b.com", "Ada", "Lovelace")
            .await
            .unwrap();

        dir.record_access_today("u1").await.unwrap();
        dir.record_access_today("u1").await.unwrap();

        let profile = dir.fetch_user("u1").await.unwrap();
        // Sign-up already recorded today; the unions add nothing.
        assert_eq!(profile.access_dates, vec![today_string()]);
    }

    #[tokio::test]
    async fn test_unknown_fields_survive_in_metadata() {
        let (docs, dir) = directory();
        let mut doc = Document::new();
        doc.insert("email".into(), json!("x@y.com"));
        doc.insert("fcmToken".into(), json!("token-123"));
        docs.seed(USERS_COLLECTION, "u2", doc).await;

        let profile = dir.fetch_user("u2").await.unwrap();
        assert_eq!(profile.metadata.get("fcmToken"), Some(&json!("token-123")));
        // And the mapper writes it back out.
        assert_eq!(
            profile.to_document().get("fcmToken"),
            Some(&json!("token-123"))
        );
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let (_docs, dir) = directory();
        dir.create_user("u1", "a@b.com", "Ada", "Lovelace")
            .await
            .unwrap();

        let profile = dir.find_by_email("a@b.com").await.unwrap();
        assert_eq!(profile.id, "u1");
        assert!(dir.find_by_email("z@b.com").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_missing_user_is_not_found() {
        let (_docs, dir) = directory();
        assert!(dir.fetch_user("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_set_profile_picture_preserves_other_fields() {
        let (_docs, dir) = directory();
        dir.create_user("u1", "a@b.com", "Ada", "Lovelace")
            .await
            .unwrap();
        dir.set_profile_picture_url("u1", "http://img/u1")
            .await
            .unwrap();

        let profile = dir.fetch_user("u1").await.unwrap();
        assert_eq!(profile.profile_picture_url.as_deref(), Some("http://img/u1"));
        assert_eq!(profile.email.as_deref(), Some("a@b.com"));
    }
}
