use thiserror::Error;

/// Storage-tier error type, shared by the local cache, the remote object
/// store, and the document-store seam.
///
/// `NotFound` is an expected outcome that drives fallback logic; callers
/// match on it rather than treating it as a fault. `SizeExceeded` is kept
/// distinct from `Transport` so a caller could request a smaller rendition
/// instead of retrying blindly.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object is {actual} bytes, exceeds the {limit} byte download cap")]
    SizeExceeded { actual: u64, limit: u64 },

    #[error("bytes are not a decodable image")]
    Decode,

    #[error("source is not an encodable image")]
    Encode,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for the expected-miss case, as opposed to a real fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors surfaced by the auth collaborator and the account flows built on it.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authenticated user")]
    NotAuthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("an account already exists for {0}")]
    EmailTaken(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("auth backend error: {0}")]
    Backend(String),
}
