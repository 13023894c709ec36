//! In-memory fakes for the collaborator seams.
//!
//! Used by the crate's own tests and handy for host prototyping. They honor
//! the same contracts as the hosted services, including the download cap on
//! the blob store, and count calls so tests can assert on tier traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{AuthError, StoreError};

use super::{ArrayOp, AuthProvider, Document, DocumentStore, QueryOp, RemoteImageStore};

/// Fake auth service: an email → (password, user id) table plus a current
/// session slot.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, (String, String)>>,
    current: Mutex<Option<String>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a signed-in session directly, bypassing credentials.
    pub async fn force_sign_in(&self, user_id: &str) {
        *self.current.lock().await = Some(user_id.to_string());
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn current_user_id(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let accounts = self.accounts.lock().await;
        match accounts.get(email) {
            Some((stored, uid)) if stored == password => {
                let uid = uid.clone();
                drop(accounts);
                *self.current.lock().await = Some(uid.clone());
                Ok(uid)
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(AuthError::EmailTaken(email.to_string()));
        }
        let uid = Uuid::new_v4().to_string();
        accounts.insert(email.to_string(), (password.to_string(), uid.clone()));
        drop(accounts);
        *self.current.lock().await = Some(uid.clone());
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.current.lock().await = None;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            Ok(())
        } else {
            Err(AuthError::Backend(format!("no account for {email}")))
        }
    }
}

/// Fake document database: collection → id → field map. Scan order follows
/// `HashMap` iteration and is deliberately unspecified, matching the hosted
/// service's contract.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document directly, for test fixtures.
    pub async fn seed(&self, collection: &str, id: &str, fields: Document) {
        let mut cols = self.collections.lock().await;
        cols.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let cols = self.collections.lock().await;
        Ok(cols.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn set_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        let doc = cols
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        if merge {
            for (k, v) in fields {
                doc.insert(k, v);
            }
        } else {
            *doc = fields;
        }
        Ok(())
    }

    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: ArrayOp,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        let doc = cols
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        let slot = doc
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let arr = match slot {
            Value::Array(arr) => arr,
            _ => {
                return Err(StoreError::Backend(format!("field {field} is not an array")));
            }
        };
        match op {
            ArrayOp::Union => {
                for v in values {
                    if !arr.contains(&v) {
                        arr.push(v);
                    }
                }
            }
            ArrayOp::Remove => {
                arr.retain(|existing| !values.contains(existing));
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        op: QueryOp,
        value: Value,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let cols = self.collections.lock().await;
        let Some(docs) = cols.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (id, doc) in docs {
            let Some(candidate) = doc.get(field) else {
                continue;
            };
            let matches = match op {
                QueryOp::Eq => candidate == &value,
                QueryOp::Lt => compare_values(candidate, &value) == Some(std::cmp::Ordering::Less),
                QueryOp::Gt => {
                    compare_values(candidate, &value) == Some(std::cmp::Ordering::Greater)
                }
            };
            if matches {
                out.push((id.clone(), doc.clone()));
            }
        }
        Ok(out)
    }

    async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let cols = self.collections.lock().await;
        Ok(cols
            .get(collection)
            .map(|c| c.iter().map(|(id, d)| (id.clone(), d.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        if let Some(c) = cols.get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Fake blob store honoring the same download cap as the hosted service, with
/// call counters so tests can assert the cache actually short-circuits remote
/// traffic.
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Bytes>>,
    max_get_bytes: u64,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryImageStore {
    pub fn new(max_get_bytes: u64) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            max_get_bytes,
            get_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }

    pub async fn seed(&self, path: &str, bytes: Bytes) {
        self.objects.lock().await.insert(path.to_string(), bytes);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteImageStore for MemoryImageStore {
    async fn put(&self, bytes: Bytes, path: &str) -> Result<String, StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().await.insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }

    async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().await;
        let bytes = objects
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if bytes.len() as u64 > self.max_get_bytes {
            return Err(StoreError::SizeExceeded {
                actual: bytes.len() as u64,
                limit: self.max_get_bytes,
            });
        }
        Ok(bytes.clone())
    }

    async fn delete(&self, url_or_path: &str) -> Result<(), StoreError> {
        let path = url_or_path
            .strip_prefix("memory://")
            .unwrap_or(url_or_path);
        let removed = self.objects.lock().await.remove(path);
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }
}
