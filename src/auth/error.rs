//! Errors raised by the identity library adapter

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable session; the user has to sign in interactively.
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    #[error("invalid authority {0}")]
    InvalidAuthority(String),

    #[error("authorization server returned {code}: {description}")]
    Server { code: String, description: String },

    #[error("state parameter in the redirect response does not match the request")]
    StateMismatch,

    #[error("no sign-in request is pending for this redirect response")]
    NoPendingRequest,

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("timed out waiting for the sign-in redirect")]
    Timeout,

    #[error("token request failed: {0}")]
    Request(String),

    #[error("token cache unavailable: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AuthError {
    pub(crate) fn cache(err: anyhow::Error) -> Self {
        Self::Cache(format!("{:#}", err))
    }
}
