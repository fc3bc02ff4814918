//! Popup vs redirect strategy selection

/// Environment variable holding the user agent of the browser used to sign in.
pub const USER_AGENT_ENV: &str = "MS_LOGIN_USER_AGENT";

/// Markers of browsers whose popup handling is unreliable.
const LEGACY_MARKERS: &[&str] = &["msie ", "trident/", "edge/"];

/// Whether `user_agent` identifies Internet Explorer or legacy (EdgeHTML) Edge.
pub fn is_legacy_browser(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    LEGACY_MARKERS.iter().any(|marker| ua.contains(marker))
}

/// Decides the default interactive strategy.
pub trait StrategySelector: Send + Sync {
    /// `true` when popups should be avoided in favour of a full redirect.
    fn prefers_redirect(&self) -> bool;
}

/// Selects the redirect strategy for legacy browsers.
#[derive(Debug, Clone, Default)]
pub struct UserAgentStrategy {
    user_agent: String,
}

impl UserAgentStrategy {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    /// User agent from `MS_LOGIN_USER_AGENT`, empty if unset.
    pub fn from_env() -> Self {
        Self::new(std::env::var(USER_AGENT_ENV).unwrap_or_default())
    }
}

impl StrategySelector for UserAgentStrategy {
    fn prefers_redirect(&self) -> bool {
        is_legacy_browser(&self.user_agent)
    }
}
