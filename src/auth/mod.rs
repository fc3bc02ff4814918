//! Identity library seam
//!
//! The orchestrator never talks OAuth directly. It drives an [`AuthClient`],
//! built by an [`AuthClientFactory`] from [`ClientSettings`]. The bundled
//! implementation ([`OAuthClient`]) runs the authorization-code flow with PKCE
//! against the Microsoft identity platform using the `oauth2` crate.

pub mod error;
pub mod id_token;
pub mod oauth;
mod redirect;
pub mod tokens;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::AuthResponse;

pub use error::AuthError;
pub use oauth::{OAuthClient, OAuthClientFactory};
pub use tokens::{PendingRedirect, TokenCache, TokenStore};

/// Authority used when no tenant URL is configured (multi-tenant + personal).
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Prompt behaviour hint forwarded to the authorize endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    Login,
    #[value(name = "select_account")]
    SelectAccount,
    Consent,
    None,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Login => "login",
            Prompt::SelectAccount => "select_account",
            Prompt::Consent => "consent",
            Prompt::None => "none",
        }
    }
}

/// Which interactive flow a token acquisition belongs to.
///
/// Decides where a failed silent acquisition falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Popup,
    Redirect,
}

/// Construction parameters for an [`AuthClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub client_id: String,
    /// Authority override (tenant URL)
    pub authority: Option<String>,
    pub redirect_uri: Option<String>,
    /// Reject authorities that are not known Microsoft login hosts
    pub validate_authority: bool,
    /// Return to the page that started the sign-in once a redirect completes
    pub navigate_to_login_request_url: bool,
}

impl ClientSettings {
    /// Settings for an embedded control: authority checked, host owns navigation.
    pub fn new(client_id: String, authority: Option<String>, redirect_uri: Option<String>) -> Self {
        Self {
            client_id,
            authority,
            redirect_uri,
            validate_authority: true,
            navigate_to_login_request_url: false,
        }
    }
}

/// Interactive sign-in parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRequest {
    pub scopes: Vec<String>,
    pub prompt: Option<Prompt>,
    pub extra_query_parameters: BTreeMap<String, String>,
}

/// Token acquisition parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub scopes: Vec<String>,
    pub extra_query_parameters: BTreeMap<String, String>,
}

/// Operations the orchestrator needs from an identity library.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Sign in through a popup-style interaction and return the id token response.
    async fn login_popup(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError>;

    /// Start a redirect sign-in. Completion arrives through
    /// [`AuthClient::take_redirect_response`] once the flow resumes.
    async fn login_redirect(&self, request: &LoginRequest) -> Result<(), AuthError>;

    async fn acquire_token_silent(&self, request: &TokenRequest)
        -> Result<AuthResponse, AuthError>;

    async fn acquire_token_popup(&self, request: &TokenRequest)
        -> Result<AuthResponse, AuthError>;

    async fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<(), AuthError>;

    /// Result of the redirect flow this client was resumed with, at most once.
    ///
    /// `None` when nothing is pending.
    async fn take_redirect_response(&self) -> Option<Result<AuthResponse, AuthError>>;
}

/// Builds [`AuthClient`] instances for a configuration snapshot.
pub trait AuthClientFactory: Send + Sync {
    fn build(&self, settings: &ClientSettings) -> Result<Arc<dyn AuthClient>, AuthError>;
}
