//! Account flows over the hosted auth service: registration, login, and
//! password reset, kept in lockstep with the user profile documents.

pub mod validation;

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::AuthProvider;
use crate::errors::AuthError;
use crate::users::UserDirectory;

pub struct AccountManager {
    auth: Arc<dyn AuthProvider>,
    users: Arc<UserDirectory>,
}

impl AccountManager {
    pub fn new(auth: Arc<dyn AuthProvider>, users: Arc<UserDirectory>) -> Self {
        Self { auth, users }
    }

    /// Registers an account and creates its profile document.
    ///
    /// The profile write is best-effort after the account exists: a failure
    /// there leaves a signed-in account whose document is created lazily on
    /// next use, so it is logged rather than unwound.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, AuthError> {
        let email = email.trim();
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if !validation::is_email_valid(email) {
            return Err(AuthError::Validation(
                "Please provide a valid email address.".into(),
            ));
        }
        if !validation::is_password_valid(password) {
            return Err(AuthError::Validation(
                "Password must be at least 8 characters.".into(),
            ));
        }
        if !validation::is_name_valid(first_name) || !validation::is_name_valid(last_name) {
            return Err(AuthError::Validation(
                "Name must be between 2 and 20 characters.".into(),
            ));
        }

        let uid = self.auth.sign_up(email, password).await?;
        if let Err(e) = self
            .users
            .create_user(&uid, email, first_name, last_name)
            .await
        {
            warn!("account {uid} created but profile write failed: {e}");
        } else {
            info!("registered account {uid}");
        }
        Ok(uid)
    }

    /// Signs in and stamps today into the usage history.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let uid = self.auth.sign_in(email.trim(), password).await?;
        if let Err(e) = self.users.record_access_today(&uid).await {
            warn!("login for {uid} succeeded but access-date write failed: {e}");
        }
        Ok(uid)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() || !validation::is_email_valid(email) {
            return Err(AuthError::Validation(
                "Please provide a valid email address.".into(),
            ));
        }
        self.auth.send_password_reset(email).await
    }
}
