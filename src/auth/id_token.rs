//! Id token claims
//!
//! Claims are decoded for display only. Signature validation is left to the
//! identity provider and whatever consumes the token downstream.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::models::Account;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    /// Object id of the user in the tenant
    pub oid: Option<String>,
    /// Tenant id
    pub tid: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
}

impl IdTokenClaims {
    pub fn account(&self) -> Account {
        let home_account_id = match (&self.oid, &self.tid) {
            (Some(oid), Some(tid)) => Some(format!("{}.{}", oid, tid)),
            (Some(oid), None) => Some(oid.clone()),
            _ => None,
        };
        Account {
            home_account_id,
            username: self.preferred_username.clone(),
            name: self.name.clone(),
        }
    }
}

/// Decode the payload segment of a JWT. `None` if it is not a well-formed token.
pub fn decode_claims(id_token: &str) -> Option<IdTokenClaims> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn fake_id_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.", header, payload)
    }

    #[test]
    fn test_decode_claims() {
        let token = fake_id_token(serde_json::json!({
            "oid": "00000000-0000-0000-66f3-3332eca7ea81",
            "tid": "9188040d-6c67-4c5b-b112-36a304b66dad",
            "name": "Megan Bowen",
            "preferred_username": "megan@contoso.com"
        }));

        let claims = decode_claims(&token).unwrap();
        let account = claims.account();
        assert_eq!(account.username.as_deref(), Some("megan@contoso.com"));
        assert_eq!(account.name.as_deref(), Some("Megan Bowen"));
        assert_eq!(
            account.home_account_id.as_deref(),
            Some("00000000-0000-0000-66f3-3332eca7ea81.9188040d-6c67-4c5b-b112-36a304b66dad")
        );
    }

    #[test]
    fn test_decode_claims_rejects_garbage() {
        assert!(decode_claims("not-a-jwt").is_none());
        assert!(decode_claims("a.!!!.c").is_none());
    }
}
