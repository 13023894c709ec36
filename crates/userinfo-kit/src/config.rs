use std::path::PathBuf;

use anyhow::{Context, Result};

/// Distribution channel the host is running under. The PMF survey is a
/// test/staging-only gate: `Production` forces every eligibility check to
/// ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseChannel {
    Production,
    Staging,
}

impl ReleaseChannel {
    pub fn is_production(self) -> bool {
        self == ReleaseChannel::Production
    }
}

/// Library configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the local image cache and the prefs file.
    pub cache_dir: PathBuf,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub release_channel: ReleaseChannel,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let channel = match std::env::var("RELEASE_CHANNEL").as_deref() {
            Ok("production") => ReleaseChannel::Production,
            _ => ReleaseChannel::Staging,
        };

        Ok(Config {
            cache_dir: PathBuf::from(require_env("USERINFO_CACHE_DIR")?),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            release_channel: channel,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
