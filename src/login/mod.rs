//! Sign-in orchestration
//!
//! [`LoginOrchestrator`] owns the identity client for the current
//! configuration and runs a sign-in attempt end to end:
//!
//! 1. `mount` completes a redirect sign-in the process was resumed with.
//! 2. `login` (the button's activation handler) picks popup or redirect.
//! 3. After an interactive sign-in the Graph token is acquired silently,
//!    falling back to the same interactive strategy when that fails.
//! 4. With `with_user_data` the Graph profile is fetched and attached.
//!
//! Every outcome reaches the caller through the [`AuthCallback`], except
//! configuration errors (malformed client id, rejected authority) which are only
//! visible in the debug log.

mod debug;
mod error;
#[cfg(test)]
mod log_capture;
mod scopes;
mod strategy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::api::{GraphClient, ProfileFetcher};
use crate::auth::{
    AuthClient, AuthClientFactory, ClientSettings, Interaction, LoginRequest, TokenRequest,
};
use crate::config::LoginConfig;
use crate::models::{AuthResponse, LoginSuccess};
use crate::tui::LoginButton;

pub use debug::{DebugLog, DEBUG_TARGET};
pub use error::{AuthCallback, AuthResult, LoginError};
pub use scopes::{normalize_scopes, BASELINE_SCOPE};
pub use strategy::{is_legacy_browser, StrategySelector, UserAgentStrategy, USER_AGENT_ENV};

const MISSING_CLIENT_ID: &str = "clientID broken or not provided";

fn client_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[a-z0-9]{8}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{12}")
            .unwrap_or_else(|e| unreachable!("client id pattern is valid: {}", e))
    })
}

/// Whether `client_id` looks like an application id (GUID shaped).
pub fn is_valid_client_id(client_id: &str) -> bool {
    client_id_pattern().is_match(client_id)
}

/// Build the identity client for `config`, or `None` if it cannot have one.
pub fn build_client(
    factory: &dyn AuthClientFactory,
    config: &LoginConfig,
) -> Option<Arc<dyn AuthClient>> {
    try_build_client(factory, config).ok()
}

/// Like [`build_client`], keeping the reason there is no client.
fn try_build_client(
    factory: &dyn AuthClientFactory,
    config: &LoginConfig,
) -> Result<Arc<dyn AuthClient>, String> {
    let client_id = config
        .client_id
        .as_deref()
        .filter(|id| is_valid_client_id(id))
        .ok_or_else(|| MISSING_CLIENT_ID.to_string())?;
    let settings = ClientSettings::new(
        client_id.to_string(),
        config.tenant_url.clone(),
        config.redirect_uri.clone(),
    );

    factory.build(&settings).map_err(|e| {
        tracing::debug!("Identity client construction failed: {}", e);
        DebugLog::new(config.debug).failure("Initialization", &e);
        e.to_string()
    })
}

/// Clears the in-flight flag when an attempt ends.
struct Attempt<'a>(&'a AtomicBool);

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct LoginOrchestrator {
    config: LoginConfig,
    /// The identity client, or why there is none
    client: Result<Arc<dyn AuthClient>, String>,
    factory: Arc<dyn AuthClientFactory>,
    profile: Arc<dyn ProfileFetcher>,
    strategy: Arc<dyn StrategySelector>,
    callback: AuthCallback,
    in_flight: AtomicBool,
}

impl LoginOrchestrator {
    /// Orchestrator using Graph for profiles and `MS_LOGIN_USER_AGENT` for
    /// strategy selection.
    pub fn new(
        config: LoginConfig,
        factory: Arc<dyn AuthClientFactory>,
        callback: AuthCallback,
    ) -> Self {
        let client = try_build_client(factory.as_ref(), &config);
        Self {
            config,
            client,
            factory,
            profile: Arc::new(GraphClient::new()),
            strategy: Arc::new(UserAgentStrategy::from_env()),
            callback,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_profile_fetcher(mut self, profile: Arc<dyn ProfileFetcher>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn StrategySelector>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    pub fn has_client(&self) -> bool {
        self.client.is_ok()
    }

    /// Scopes sent to the identity client
    pub fn scopes(&self) -> Vec<String> {
        normalize_scopes(&self.config.graph_scopes)
    }

    /// The control to render; activating it should call [`Self::login`].
    pub fn button(&self) -> LoginButton<'_> {
        LoginButton::new(self.config.button_theme).class_name(self.config.class_name.as_deref())
    }

    /// Apply a new configuration. The identity client is rebuilt only when
    /// the client id, tenant or redirect URI changed.
    pub fn update_config(&mut self, config: LoginConfig) {
        if self.config.identity_changed(&config) {
            tracing::debug!("Identity settings changed, rebuilding client");
            self.client = try_build_client(self.factory.as_ref(), &config);
        }
        self.config = config;
    }

    fn log(&self) -> DebugLog {
        DebugLog::new(self.config.debug)
    }

    fn begin_attempt(&self) -> Option<Attempt<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Attempt(&self.in_flight))
    }

    fn deliver(&self, result: AuthResult) {
        (self.callback)(result);
    }

    fn fail(&self, error: LoginError) {
        self.log().failure("Login failed", &error);
        self.deliver(Err(error));
    }

    fn login_request(&self) -> LoginRequest {
        LoginRequest {
            scopes: self.scopes(),
            prompt: self.config.prompt,
            extra_query_parameters: self.config.extra_query_parameters.clone(),
        }
    }

    fn token_request(&self) -> TokenRequest {
        TokenRequest {
            scopes: self.scopes(),
            extra_query_parameters: self.config.extra_query_parameters.clone(),
        }
    }

    /// Complete a redirect sign-in, if the client was resumed with one.
    ///
    /// Returns whether a redirect response was handled.
    pub async fn mount(&self) -> bool {
        let log = self.log();
        let client = match &self.client {
            Ok(client) => client.clone(),
            Err(reason) => {
                log.failure("Initialization", reason);
                return false;
            }
        };
        let Some(_attempt) = self.begin_attempt() else {
            self.fail(LoginError::AttemptInProgress);
            return false;
        };

        match client.take_redirect_response().await {
            None => false,
            Some(Ok(response)) => {
                log.step_with("Sign-in with redirect succeeded", &describe(&response));
                self.acquire_token(client.as_ref(), Interaction::Redirect)
                    .await;
                true
            }
            Some(Err(e)) => {
                log.failure("Sign-in with redirect failed", &e);
                self.deliver(Err(e.into()));
                true
            }
        }
    }

    /// Start a sign-in. Bound to the button's activation.
    pub async fn login(&self) {
        let log = self.log();
        let client = match &self.client {
            Ok(client) => client.clone(),
            Err(reason) => {
                log.failure("Login failed", reason);
                return;
            }
        };
        let Some(_attempt) = self.begin_attempt() else {
            self.fail(LoginError::AttemptInProgress);
            return;
        };

        log.step("Login started");
        if self.config.force_redirect_strategy || self.strategy.prefers_redirect() {
            self.redirect_login(client.as_ref()).await;
        } else {
            self.popup_login(client.as_ref()).await;
        }
    }

    async fn popup_login(&self, client: &dyn AuthClient) {
        let log = self.log();
        log.step("Sign-in with popup started");
        match client.login_popup(&self.login_request()).await {
            Ok(response) => {
                log.step_with("Sign-in with popup succeeded", &describe(&response));
                self.acquire_token(client, Interaction::Popup).await;
            }
            Err(e) => {
                log.failure("Sign-in with popup failed", &e);
                self.deliver(Err(e.into()));
            }
        }
    }

    async fn redirect_login(&self, client: &dyn AuthClient) {
        self.log().step("Sign-in with redirect started");
        if let Err(e) = client.login_redirect(&self.login_request()).await {
            self.fail(e.into());
        }
    }

    /// Silent acquisition first, then the interactive strategy of `interaction`.
    async fn acquire_token(&self, client: &dyn AuthClient, interaction: Interaction) {
        let log = self.log();
        let request = self.token_request();

        log.step("Silent token acquisition started");
        let response = match client.acquire_token_silent(&request).await {
            Ok(response) => response,
            Err(e) => {
                log.failure("Silent token acquisition failed", &e);
                match interaction {
                    Interaction::Redirect => {
                        log.step("Token acquisition with redirect started");
                        // Completion comes back through `mount`.
                        if let Err(e) = client.acquire_token_redirect(&request).await {
                            self.fail(e.into());
                        }
                        return;
                    }
                    Interaction::Popup => {
                        log.step("Token acquisition with popup started");
                        match client.acquire_token_popup(&request).await {
                            Ok(response) => response,
                            Err(e) => {
                                self.fail(e.into());
                                return;
                            }
                        }
                    }
                }
            }
        };

        log.step_with("Token acquisition succeeded", &describe(&response));
        self.finish(response).await;
    }

    async fn finish(&self, response: AuthResponse) {
        let log = self.log();
        if !self.config.with_user_data {
            log.step("Login succeeded");
            self.deliver(Ok(LoginSuccess::new(response)));
            return;
        }

        log.step("Profile fetch started");
        match self.profile.fetch_profile(&response.access_token).await {
            Ok(profile) => {
                log.step_with(
                    "Profile fetch succeeded",
                    &profile.display_name.as_deref().unwrap_or("(no display name)"),
                );
                log.step("Login succeeded");
                self.deliver(Ok(LoginSuccess::with_user_data(response, profile)));
            }
            Err(e) => self.fail(e.into()),
        }
    }
}

/// Loggable summary of a token response; never includes the token itself.
fn describe(response: &AuthResponse) -> String {
    let who = response
        .account
        .as_ref()
        .and_then(|a| a.username.as_deref())
        .unwrap_or("unknown account");
    format!(
        "{} [{}]{}",
        who,
        response.scopes.join(" "),
        if response.from_cache { " (cached)" } else { "" }
    )
}
