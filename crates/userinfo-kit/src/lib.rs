//! Embedded user-account toolkit: account flows over a hosted auth service,
//! typed user profile documents, a two-tier (local disk + remote object
//! store) image cache, and a usage-gated in-app survey engine.
//!
//! There is no server or CLI in here; a host application constructs the
//! pieces once at startup and injects them where needed:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use userinfo_kit::auth::AccountManager;
//! use userinfo_kit::backend::memory::{MemoryAuth, MemoryDocumentStore};
//! use userinfo_kit::config::Config;
//! use userinfo_kit::images::local::LocalImageCache;
//! use userinfo_kit::images::s3::S3ImageStore;
//! use userinfo_kit::images::ImageStore;
//! use userinfo_kit::prefs::Prefs;
//! use userinfo_kit::survey::PmfEngine;
//! use userinfo_kit::users::UserDirectory;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//!
//! // Hosted collaborators (in-memory stand-ins shown here).
//! let auth = Arc::new(MemoryAuth::new());
//! let docs = Arc::new(MemoryDocumentStore::new());
//!
//! let users = Arc::new(UserDirectory::new(docs.clone()));
//! let accounts = AccountManager::new(auth.clone(), users.clone());
//!
//! let images = ImageStore::new(
//!     LocalImageCache::new(config.cache_dir.join("images"))?,
//!     Arc::new(S3ImageStore::from_config(&config).await),
//! );
//!
//! let prefs = Arc::new(Prefs::new(config.cache_dir.join("prefs.json"))?);
//! let pmf = PmfEngine::new(auth, docs, prefs, config.release_channel);
//! # let _ = (accounts, images, pmf);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod images;
pub mod prefs;
pub mod survey;
pub mod users;

pub use crate::auth::AccountManager;
pub use crate::config::{Config, ReleaseChannel};
pub use crate::errors::{AuthError, StoreError};
pub use crate::images::ImageStore;
pub use crate::prefs::Prefs;
pub use crate::survey::{Decision, PmfAnswers, PmfEngine, PmfFeedback, PmfResponse};
pub use crate::users::{UserDirectory, UserProfile};
