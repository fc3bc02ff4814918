//! Login configuration and its on-disk storage

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::auth::Prompt;
use crate::tui::ButtonTheme;

/// Everything the login control is configured with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Application (client) id registered with the identity platform
    pub client_id: Option<String>,
    /// Authority override, e.g. `https://login.microsoftonline.com/<tenant>`
    pub tenant_url: Option<String>,
    pub redirect_uri: Option<String>,
    /// Permission scopes requested for the Graph token
    pub graph_scopes: Vec<String>,
    /// Passed verbatim to every authorize and token request
    pub extra_query_parameters: BTreeMap<String, String>,
    /// Fetch the Graph profile after sign-in
    pub with_user_data: bool,
    /// Always use the redirect strategy
    pub force_redirect_strategy: bool,
    pub prompt: Option<Prompt>,
    /// Emit a log entry for every sign-in step
    pub debug: bool,
    pub button_theme: ButtonTheme,
    /// Label shown on the button frame
    pub class_name: Option<String>,
}

impl LoginConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    /// Whether `other` needs a different identity client than `self`.
    pub fn identity_changed(&self, other: &LoginConfig) -> bool {
        self.client_id != other.client_id
            || self.tenant_url != other.tenant_url
            || self.redirect_uri != other.redirect_uri
    }

    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ms-login", "ms-login")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        let config: LoginConfig = toml::from_str(
            r#"
client_id = "12345678-1234-1234-1234-123456789012"
tenant_url = "https://login.microsoftonline.com/contoso.onmicrosoft.com"
graph_scopes = ["Mail.Read", "User.Read"]
with_user_data = true
prompt = "select_account"
button_theme = "dark_short"

[extra_query_parameters]
domain_hint = "contoso.com"
"#,
        )
        .unwrap();

        assert_eq!(config.graph_scopes, vec!["Mail.Read", "User.Read"]);
        assert!(config.with_user_data);
        assert!(!config.force_redirect_strategy);
        assert_eq!(config.prompt, Some(Prompt::SelectAccount));
        assert_eq!(config.button_theme, ButtonTheme::DarkShort);
        assert_eq!(config.extra_query_parameters["domain_hint"], "contoso.com");
    }

    #[test]
    fn test_identity_changed() {
        let base = LoginConfig::new("12345678-1234-1234-1234-123456789012");

        let mut other = base.clone();
        other.with_user_data = true;
        other.graph_scopes.push("Mail.Read".into());
        assert!(!base.identity_changed(&other));

        other.redirect_uri = Some("http://localhost:3000".into());
        assert!(base.identity_changed(&other));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("ms-login-does-not-exist/config.toml");
        assert_eq!(LoginConfig::load_from(&path).unwrap(), LoginConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "ms-login-config-test-{}/config.toml",
            std::process::id()
        ));
        let mut config = LoginConfig::new("12345678-1234-1234-1234-123456789012");
        config.debug = true;
        config
            .extra_query_parameters
            .insert("login_hint".into(), "a@contoso.com".into());
        config.save_to(&path).unwrap();

        assert_eq!(LoginConfig::load_from(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
