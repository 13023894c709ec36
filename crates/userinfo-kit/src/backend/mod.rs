//! Collaborator seams: the hosted auth service, document database, and blob
//! store this library is built against.
//!
//! Each collaborator is a trait carried as `Arc<dyn ...>`, constructed once at
//! host startup and injected into the components that need it. Tests swap in
//! the in-memory fakes from [`memory`] without any global-state resets.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::errors::{AuthError, StoreError};

/// A remote document: a flat field map, as the hosted database returns it.
pub type Document = serde_json::Map<String, Value>;

/// Array-field mutation operators supported by the hosted document database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    /// Add the values not already present (set semantics).
    Union,
    /// Remove every occurrence of the values.
    Remove,
}

/// Equality/range operators for simple single-field queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Lt,
    Gt,
}

/// Hosted authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user's id, or `None` when nobody is authenticated.
    async fn current_user_id(&self) -> Option<String>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError>;

    /// Creates the account and returns the new user id.
    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;
}

/// Hosted document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `None` when the document does not exist. This is an expected outcome, not an
    /// error.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Writes `fields`; with `merge` the document's other fields survive,
    /// without it the document is replaced.
    async fn set_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Array-union / array-remove on a single field.
    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: ArrayOp,
        values: Vec<Value>,
    ) -> Result<(), StoreError>;

    /// Single-field query. Scan order across documents is unspecified.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        op: QueryOp,
        value: Value,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    /// Every document in a collection, in unspecified scan order.
    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Hosted blob store, as the image tier consumes it.
///
/// No retry policy: transient network failures surface as a single
/// `Transport` outcome per call.
#[async_trait]
pub trait RemoteImageStore: Send + Sync {
    /// Uploads and resolves a durable download URL. Both steps must succeed;
    /// an upload whose URL resolution fails still reports failure (the blob
    /// is orphaned but retrievable by path on a retry with the same path).
    async fn put(&self, bytes: Bytes, path: &str) -> Result<String, StoreError>;

    /// Fetches the object, failing with `SizeExceeded` past the fixed
    /// download cap.
    async fn get(&self, path: &str) -> Result<Bytes, StoreError>;

    /// Deletes by durable URL or bare path.
    async fn delete(&self, url_or_path: &str) -> Result<(), StoreError>;
}
