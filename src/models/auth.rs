//! Token responses and login results

use serde::{Deserialize, Serialize};

use super::UserProfile;

/// Account the token was issued to, read from the id token claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub home_account_id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
}

/// Token-bearing response from the identity library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub scopes: Vec<String>,
    /// Expiry as unix seconds
    pub expires_on: Option<u64>,
    pub id_token: Option<String>,
    pub account: Option<Account>,
    pub tenant_id: Option<String>,
    pub unique_id: Option<String>,
    pub from_cache: bool,
}

/// Successful sign-in delivered to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccess {
    pub auth_response: AuthResponse,
    /// Present only when profile enrichment was requested.
    pub user_data: Option<UserProfile>,
}

impl LoginSuccess {
    pub fn new(auth_response: AuthResponse) -> Self {
        Self {
            auth_response,
            user_data: None,
        }
    }

    pub fn with_user_data(auth_response: AuthResponse, user_data: UserProfile) -> Self {
        Self {
            auth_response,
            user_data: Some(user_data),
        }
    }

    /// Flat JSON object of profile fields overlaid by token fields.
    ///
    /// On a key collision the token response wins.
    pub fn merged(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = match self
            .user_data
            .as_ref()
            .and_then(|u| serde_json::to_value(u).ok())
        {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Ok(serde_json::Value::Object(token)) = serde_json::to_value(&self.auth_response) {
            out.extend(token);
        }
        out
    }
}
