//! Errors delivered to the login callback

use std::sync::Arc;

use thiserror::Error;

use crate::api::ProfileError;
use crate::auth::AuthError;
use crate::models::LoginSuccess;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error("profile fetch failed: {0}")]
    Profile(#[from] ProfileError),

    #[error("a sign-in attempt is already in progress")]
    AttemptInProgress,
}

/// Outcome of one sign-in attempt
pub type AuthResult = Result<LoginSuccess, LoginError>;

/// Receives the outcome of every sign-in attempt.
pub type AuthCallback = Arc<dyn Fn(AuthResult) + Send + Sync>;
