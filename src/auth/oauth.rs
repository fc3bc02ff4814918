//! OAuth2 authorization code flow (PKCE) for the Microsoft identity platform

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, Client, ClientId, CsrfToken, ExtraTokenFields,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::id_token::decode_claims;
use super::redirect::{parse_redirect_response, LoopbackListener};
use super::tokens::expires_at;
use super::{
    AuthClient, AuthClientFactory, AuthError, ClientSettings, LoginRequest, PendingRedirect,
    Prompt, TokenCache, TokenRequest, TokenStore, DEFAULT_AUTHORITY,
};
use crate::models::AuthResponse;

/// Hosts accepted when authority validation is on
const TRUSTED_HOSTS: &[&str] = &[
    "login.microsoftonline.com",
    "login.microsoftonline.us",
    "login.partner.microsoftonline.cn",
    "login.chinacloudapi.cn",
    "login.microsoftonline.de",
    "login.windows.net",
    "login-us.microsoftonline.com",
    "sts.windows.net",
];

/// Scopes added to every interactive sign-in
const OIDC_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Redirect target for the out-of-process (redirect) strategy
const NATIVE_CLIENT_REDIRECT: &str = "https://login.microsoftonline.com/common/oauth2/nativeclient";

/// How long a popup sign-in waits for the browser to come back
const INTERACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Id token returned next to the access token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type MsTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type MsClient = Client<
    BasicErrorResponse,
    MsTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Resolve the authority URL, rejecting untrusted ones when `validate` is set.
fn parse_authority(raw: Option<&str>, validate: bool) -> Result<String, AuthError> {
    let raw = raw.unwrap_or(DEFAULT_AUTHORITY).trim_end_matches('/');
    let url = Url::parse(raw).map_err(|e| AuthError::InvalidAuthority(format!("{}: {}", raw, e)))?;

    if validate {
        let trusted = url
            .host_str()
            .map_or(false, |host| TRUSTED_HOSTS.contains(&host));
        if url.scheme() != "https" || !trusted {
            return Err(AuthError::InvalidAuthority(format!(
                "{} is not a trusted Microsoft login host",
                raw
            )));
        }
        let has_tenant = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map_or(false, |tenant| !tenant.is_empty());
        if !has_tenant {
            return Err(AuthError::InvalidAuthority(format!("{} names no tenant", raw)));
        }
    }

    Ok(raw.to_string())
}

/// `scopes` followed by each of `extra` not already present (case-insensitive).
fn with_scopes(scopes: &[String], extra: &[&str]) -> Vec<String> {
    let mut out = scopes.to_vec();
    for scope in extra {
        if !out.iter().any(|s| s.eq_ignore_ascii_case(scope)) {
            out.push(scope.to_string());
        }
    }
    out
}

fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => {
            let code = resp.error().to_string();
            let description = resp.error_description().cloned().unwrap_or_default();
            if code == "invalid_grant" || code == "interaction_required" {
                AuthError::InteractionRequired(description)
            } else {
                AuthError::Server { code, description }
            }
        }
        other => AuthError::Request(other.to_string()),
    }
}

fn to_auth_response(token: &MsTokenResponse, requested: &[String]) -> AuthResponse {
    let scopes = token
        .scopes()
        .map(|granted| granted.iter().map(|s| s.as_str().to_string()).collect())
        .unwrap_or_else(|| requested.to_vec());
    let id_token = token.extra_fields().id_token.clone();
    let claims = id_token.as_deref().and_then(decode_claims);

    AuthResponse {
        access_token: token.access_token().secret().to_string(),
        token_type: "Bearer".to_string(),
        scopes,
        expires_on: token.expires_in().map(|d| expires_at(d.as_secs())),
        id_token,
        account: claims.as_ref().map(|c| c.account()),
        tenant_id: claims.as_ref().and_then(|c| c.tid.clone()),
        unique_id: claims.as_ref().and_then(|c| c.oid.clone()),
        from_cache: false,
    }
}

/// [`AuthClient`] backed by the `oauth2` crate and a [`TokenCache`].
///
/// Popup interactions print the sign-in URL and wait on a loopback listener.
/// Redirect interactions print the URL, save the request to the cache and
/// return; the flow resumes when a later client is given the final URL.
pub struct OAuthClient {
    client_id: String,
    authority: String,
    redirect_uri: Option<String>,
    cache: Mutex<TokenCache>,
    redirect_response: Mutex<Option<String>>,
}

impl OAuthClient {
    pub fn new(settings: &ClientSettings, cache: TokenCache) -> Result<Self, AuthError> {
        let authority = parse_authority(settings.authority.as_deref(), settings.validate_authority)?;
        tracing::debug!(
            "OAuth client for {} at {} (navigate to request URL: {})",
            settings.client_id,
            authority,
            settings.navigate_to_login_request_url
        );

        Ok(Self {
            client_id: settings.client_id.clone(),
            authority,
            redirect_uri: settings.redirect_uri.clone(),
            cache: Mutex::new(cache),
            redirect_response: Mutex::new(None),
        })
    }

    /// Resume a redirect sign-in with the URL the browser ended up on.
    pub fn with_redirect_response(self, url: Option<String>) -> Self {
        *self
            .redirect_response
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = url;
        self
    }

    fn oauth_client(&self, redirect_uri: Option<&str>) -> Result<MsClient, AuthError> {
        let auth_url = AuthUrl::new(format!("{}/oauth2/v2.0/authorize", self.authority))
            .map_err(|e| AuthError::InvalidAuthority(e.to_string()))?;
        let token_url = TokenUrl::new(format!("{}/oauth2/v2.0/token", self.authority))
            .map_err(|e| AuthError::InvalidAuthority(e.to_string()))?;

        let client = MsClient::new(
            ClientId::new(self.client_id.clone()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        match redirect_uri {
            Some(uri) => {
                let redirect = RedirectUrl::new(uri.to_string())
                    .map_err(|e| AuthError::InvalidResponse(format!("redirect URI {}: {}", uri, e)))?;
                Ok(client.set_redirect_uri(redirect))
            }
            None => Ok(client),
        }
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut TokenCache) -> T) -> T {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn take_redirect_url(&self) -> Option<String> {
        self.redirect_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn authorize_url(
        &self,
        client: &MsClient,
        scopes: &[String],
        prompt: Option<Prompt>,
        extra: &BTreeMap<String, String>,
    ) -> (String, CsrfToken, PkceCodeVerifier) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(challenge);
        for scope in with_scopes(scopes, OIDC_SCOPES) {
            request = request.add_scope(Scope::new(scope));
        }
        if let Some(prompt) = prompt {
            request = request.add_extra_param("prompt", prompt.as_str());
        }
        for (name, value) in extra {
            request = request.add_extra_param(name.clone(), value.clone());
        }
        let (url, csrf) = request.url();
        (url.to_string(), csrf, verifier)
    }

    async fn interactive_popup(
        &self,
        scopes: &[String],
        prompt: Option<Prompt>,
        extra: &BTreeMap<String, String>,
    ) -> Result<AuthResponse, AuthError> {
        let listener = LoopbackListener::bind(self.redirect_uri.as_deref()).await?;
        let client = self.oauth_client(Some(listener.redirect_uri()))?;
        let (url, csrf, verifier) = self.authorize_url(&client, scopes, prompt, extra);

        println!();
        println!("To sign in, visit: {}", url);
        println!();
        tracing::info!("Waiting for authentication...");

        let redirected = listener.wait_for_redirect(INTERACTION_TIMEOUT).await?;
        let code = parse_redirect_response(&redirected, csrf.secret())?;
        self.redeem_code(&client, code, verifier, scopes, extra).await
    }

    fn interactive_redirect(
        &self,
        scopes: &[String],
        prompt: Option<Prompt>,
        extra: &BTreeMap<String, String>,
    ) -> Result<(), AuthError> {
        let redirect_uri = self
            .redirect_uri
            .clone()
            .unwrap_or_else(|| NATIVE_CLIENT_REDIRECT.to_string());
        let client = self.oauth_client(Some(&redirect_uri))?;
        let (url, csrf, verifier) = self.authorize_url(&client, scopes, prompt, extra);

        self.with_cache(|cache| {
            cache.set_pending_redirect(PendingRedirect {
                state: csrf.secret().to_string(),
                pkce_verifier: verifier.secret().to_string(),
                redirect_uri,
                scopes: scopes.to_vec(),
                extra_query_parameters: extra.clone(),
            });
            cache.save()
        })
        .map_err(AuthError::cache)?;

        println!();
        println!("To sign in, visit: {}", url);
        println!("Then run again with --redirect-response '<URL the browser ended up on>'.");
        println!();
        Ok(())
    }

    async fn redeem_code(
        &self,
        client: &MsClient,
        code: String,
        verifier: PkceCodeVerifier,
        scopes: &[String],
        extra: &BTreeMap<String, String>,
    ) -> Result<AuthResponse, AuthError> {
        let mut request = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier);
        for (name, value) in extra {
            request = request.add_extra_param(name.clone(), value.clone());
        }

        let token = request
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        Ok(self.remember(&token, scopes))
    }

    /// Cache a fresh token response and convert it.
    fn remember(&self, token: &MsTokenResponse, requested: &[String]) -> AuthResponse {
        let response = to_auth_response(token, requested);
        let saved = self.with_cache(|cache| {
            if let Some(refresh_token) = token.refresh_token() {
                cache.set_refresh_token(refresh_token.secret().to_string());
            }
            cache.store_access_token(response.clone());
            cache.save()
        });
        if let Err(e) = saved {
            tracing::warn!("Failed to persist token cache: {:#}", e);
        }
        response
    }

    async fn complete_redirect(&self, url: &str) -> Result<AuthResponse, AuthError> {
        let pending = self
            .with_cache(|cache| {
                let pending = cache.take_pending_redirect();
                cache.save().map(|_| pending)
            })
            .map_err(AuthError::cache)?
            .ok_or(AuthError::NoPendingRequest)?;

        let code = parse_redirect_response(url, &pending.state)?;
        let client = self.oauth_client(Some(&pending.redirect_uri))?;
        self.redeem_code(
            &client,
            code,
            PkceCodeVerifier::new(pending.pkce_verifier),
            &pending.scopes,
            &pending.extra_query_parameters,
        )
        .await
    }
}

#[async_trait]
impl AuthClient for OAuthClient {
    async fn login_popup(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError> {
        self.interactive_popup(
            &request.scopes,
            request.prompt,
            &request.extra_query_parameters,
        )
        .await
    }

    async fn login_redirect(&self, request: &LoginRequest) -> Result<(), AuthError> {
        self.interactive_redirect(
            &request.scopes,
            request.prompt,
            &request.extra_query_parameters,
        )
    }

    async fn acquire_token_silent(
        &self,
        request: &TokenRequest,
    ) -> Result<AuthResponse, AuthError> {
        if let Some(hit) = self.with_cache(|cache| cache.find_access_token(&request.scopes)) {
            tracing::debug!("Access token served from cache");
            return Ok(AuthResponse {
                from_cache: true,
                ..hit
            });
        }

        let refresh_token = self
            .with_cache(|cache| cache.get_refresh_token())
            .ok_or_else(|| {
                AuthError::InteractionRequired("no signed-in account in the token cache".into())
            })?;

        tracing::info!("Refreshing access token...");
        let client = self.oauth_client(None)?;
        let refresh_token = RefreshToken::new(refresh_token);
        let mut refresh = client.exchange_refresh_token(&refresh_token);
        for scope in with_scopes(&request.scopes, &["offline_access"]) {
            refresh = refresh.add_scope(Scope::new(scope));
        }
        for (name, value) in &request.extra_query_parameters {
            refresh = refresh.add_extra_param(name.clone(), value.clone());
        }

        let token = refresh
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        Ok(self.remember(&token, &request.scopes))
    }

    async fn acquire_token_popup(
        &self,
        request: &TokenRequest,
    ) -> Result<AuthResponse, AuthError> {
        self.interactive_popup(&request.scopes, None, &request.extra_query_parameters)
            .await
    }

    async fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<(), AuthError> {
        self.interactive_redirect(&request.scopes, None, &request.extra_query_parameters)
    }

    async fn take_redirect_response(&self) -> Option<Result<AuthResponse, AuthError>> {
        let url = self.take_redirect_url()?;
        tracing::debug!("Completing redirect sign-in");
        Some(self.complete_redirect(&url).await)
    }
}

/// Builds [`OAuthClient`]s with a token cache per application id.
pub struct OAuthClientFactory {
    persist: bool,
    redirect_response: Mutex<Option<String>>,
}

impl OAuthClientFactory {
    /// Clients whose cache lives in the platform cache directory
    pub fn new() -> Self {
        Self {
            persist: true,
            redirect_response: Mutex::new(None),
        }
    }

    /// Clients whose cache lives only as long as the client
    pub fn in_memory() -> Self {
        Self {
            persist: false,
            redirect_response: Mutex::new(None),
        }
    }

    /// Hand the redirect URL to the next client built (once).
    pub fn with_redirect_response(self, url: Option<String>) -> Self {
        *self
            .redirect_response
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = url;
        self
    }
}

impl Default for OAuthClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthClientFactory for OAuthClientFactory {
    fn build(&self, settings: &ClientSettings) -> Result<Arc<dyn AuthClient>, AuthError> {
        let cache = if self.persist {
            TokenCache::default_path(&settings.client_id)
                .and_then(TokenCache::load_from)
                .map_err(AuthError::cache)?
        } else {
            TokenCache::in_memory()
        };
        let redirect_response = self
            .redirect_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let client = OAuthClient::new(settings, cache)?.with_redirect_response(redirect_response);
        Ok(Arc::new(client))
    }
}
