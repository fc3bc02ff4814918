//! User-related models

use serde::{Deserialize, Serialize};

/// Signed-in user's profile as returned by Graph `/me`.
///
/// Only the common fields are typed; everything else the endpoint returns is
/// kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_keeps_unknown_fields() {
        let json = serde_json::json!({
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users/$entity",
            "id": "87d349ed-44d7-43e1-9a83-5f2406dee5bd",
            "displayName": "Adele Vance",
            "jobTitle": "Retail Manager",
            "mail": null
        });

        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Adele Vance"));
        assert_eq!(profile.mail, None);
        assert_eq!(profile.extra["jobTitle"], "Retail Manager");
        assert!(profile.extra.contains_key("@odata.context"));
    }
}
