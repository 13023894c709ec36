//! Installation-scoped scalar state.
//!
//! A small JSON map persisted under the cache directory, standing in for the
//! platform preference store the survey counters originally lived in. Values
//! are read from disk on every access and written back atomically, so
//! concurrent readers never see a torn file.

use std::path::PathBuf;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::StoreError;

/// Fixed keys for the survey gating counters.
pub const HAS_ANSWERED_PMF: &str = "hasAnsweredPMF";
pub const LAST_DECLINED_ACCESS_COUNT: &str = "lastDeclinedAccessCount";
pub const LAST_PMF_SHOWN_TIMESTAMP: &str = "lastPMFShownTimestamp";
pub const USAGE_COUNT_AT_LAST_SURVEY: &str = "usageCountAtLastSurvey";

pub struct Prefs {
    path: PathBuf,
}

impl Prefs {
    /// Opens the prefs file at `path`, creating parent directories as needed.
    /// A missing file reads as an empty map.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    async fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|e| StoreError::Backend(format!("corrupt prefs file: {e}")))
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(map)
            .map_err(|e| StoreError::Backend(format!("prefs encode failed: {e}")))?;
        let tmp = self.path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .read_map()
            .await?
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub async fn get_i64(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .read_map()
            .await?
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    pub async fn get_f64(&self, key: &str) -> Result<f64, StoreError> {
        Ok(self
            .read_map()
            .await?
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(0.0))
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    /// Sets several keys in one write, so values that must move together
    /// (shown timestamp + usage snapshot) land atomically.
    pub async fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        let mut map = self.read_map().await?;
        for (key, value) in entries {
            map.insert(key.to_string(), value.clone());
        }
        self.write_map(&map).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
