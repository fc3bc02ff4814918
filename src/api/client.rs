//! Authenticated HTTP client for Microsoft Graph

use async_trait::async_trait;

use super::{ProfileError, ProfileFetcher};
use crate::models::UserProfile;

pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Graph client. The access token is supplied per call.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_BASE)
    }

    /// Client against another Graph root (national clouds, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// GET request to Microsoft Graph API (bearer auth).
    pub async fn get(&self, path: &str, token: &str) -> Result<reqwest::Response, ProfileError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Graph GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProfileError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        check_response(resp, &url).await
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileFetcher for GraphClient {
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ProfileError> {
        let resp = self.get("/me", access_token).await?;
        resp.json::<UserProfile>()
            .await
            .map_err(|e| ProfileError::Decode(e.to_string()))
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, ProfileError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProfileError::Unauthorized(url.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProfileError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_profile_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "48d31887-5fad-4d73-a9f5-3c356e68a038",
                "displayName": "A",
                "userPrincipalName": "a@contoso.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let graph = GraphClient::with_base_url(format!("{}/v1.0/", server.uri()));
        let profile = graph.fetch_profile("T2").await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("A"));
        assert_eq!(profile.user_principal_name.as_deref(), Some("a@contoso.com"));
    }

    #[tokio::test]
    async fn test_fetch_profile_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = GraphClient::with_base_url(server.uri())
            .fetch_profile("bad")
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_fetch_profile_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;

        let err = GraphClient::with_base_url(server.uri())
            .fetch_profile("T")
            .await
            .unwrap_err();
        match err {
            ProfileError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "try later");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_profile_rejects_non_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1, 2]"))
            .mount(&server)
            .await;

        let err = GraphClient::with_base_url(server.uri())
            .fetch_profile("T")
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_profile_connection_refused() {
        let err = GraphClient::with_base_url("http://127.0.0.1:9")
            .fetch_profile("T")
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Request { .. }));
    }
}
