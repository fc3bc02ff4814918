//! Microsoft Graph access for profile enrichment

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::UserProfile;

pub use client::{GraphClient, GRAPH_BASE};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("401 Unauthorized for {0}; the access token was rejected")]
    Unauthorized(String),

    #[error("HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("failed to parse profile response: {0}")]
    Decode(String),
}

/// Fetches the signed-in user's profile with a bearer token.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ProfileError>;
}
