//! ms-login - Sign in with Microsoft from the terminal

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ms_login::auth::{OAuthClientFactory, Prompt, TokenCache, TokenStore};
use ms_login::login::{is_valid_client_id, UserAgentStrategy};
use ms_login::tui::{self, ButtonTheme, Outcome};
use ms_login::{AuthCallback, AuthResult, LoginConfig, LoginOrchestrator};

#[derive(Parser)]
#[command(name = "ms-login")]
#[command(about = "Sign in with a Microsoft account from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and print the result as JSON
    Login(LoginArgs),

    /// Show the sign-in button and sign in when it is activated
    Button(LoginArgs),

    /// Show cached sign-in state
    Status {
        /// Application (client) id, defaults to the configured one
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Clear cached tokens and any pending redirect sign-in
    Logout {
        /// Application (client) id, defaults to the configured one
        #[arg(long)]
        client_id: Option<String>,
    },
}

/// Overrides for the configured login settings
#[derive(Args)]
struct LoginArgs {
    /// Application (client) id
    #[arg(long)]
    client_id: Option<String>,

    /// Authority, e.g. https://login.microsoftonline.com/<tenant>
    #[arg(long)]
    tenant_url: Option<String>,

    /// Redirect URI registered for the application
    #[arg(long)]
    redirect_uri: Option<String>,

    /// Graph permission scope (repeatable)
    #[arg(short, long = "scope")]
    scopes: Vec<String>,

    /// Fetch the Graph profile after signing in
    #[arg(long)]
    with_user_data: bool,

    /// Always use the redirect flow
    #[arg(long)]
    force_redirect: bool,

    #[arg(long, value_enum)]
    prompt: Option<Prompt>,

    /// Extra authorize/token query parameter as KEY=VALUE (repeatable)
    #[arg(long = "extra", value_parser = parse_key_value)]
    extra: Vec<(String, String)>,

    /// Log every sign-in step
    #[arg(short, long)]
    debug: bool,

    /// Browser user agent used to pick popup or redirect (default: $MS_LOGIN_USER_AGENT)
    #[arg(long)]
    user_agent: Option<String>,

    /// URL the browser was redirected to, to complete a redirect sign-in
    #[arg(long)]
    redirect_response: Option<String>,

    #[arg(long, value_enum)]
    theme: Option<ButtonTheme>,

    /// Label shown on the button frame
    #[arg(long)]
    class_name: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl LoginArgs {
    fn apply(&self, config: &mut LoginConfig) {
        if let Some(id) = &self.client_id {
            config.client_id = Some(id.clone());
        }
        if let Some(url) = &self.tenant_url {
            config.tenant_url = Some(url.clone());
        }
        if let Some(uri) = &self.redirect_uri {
            config.redirect_uri = Some(uri.clone());
        }
        if !self.scopes.is_empty() {
            config.graph_scopes = self.scopes.clone();
        }
        config.extra_query_parameters.extend(self.extra.iter().cloned());
        config.with_user_data |= self.with_user_data;
        config.force_redirect_strategy |= self.force_redirect;
        config.debug |= self.debug;
        if self.prompt.is_some() {
            config.prompt = self.prompt;
        }
        if let Some(theme) = self.theme {
            config.button_theme = theme;
        }
        if let Some(class_name) = &self.class_name {
            config.class_name = Some(class_name.clone());
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LoginConfig> {
    match path {
        Some(path) => LoginConfig::load_from(path),
        None => LoginConfig::load(),
    }
}

/// Run one sign-in, through the button when `button` is set.
async fn sign_in(config: LoginConfig, args: &LoginArgs, button: bool) -> Result<()> {
    let factory = OAuthClientFactory::new().with_redirect_response(args.redirect_response.clone());
    let strategy = match &args.user_agent {
        Some(ua) => UserAgentStrategy::new(ua.clone()),
        None => UserAgentStrategy::from_env(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<AuthResult>();
    let callback: AuthCallback = Arc::new(move |result| {
        let _ = tx.send(result);
    });
    let orchestrator =
        LoginOrchestrator::new(config, Arc::new(factory), callback).with_strategy(Arc::new(strategy));
    if !orchestrator.has_client() {
        tracing::warn!("No usable client id configured; run with --debug for details");
    }

    if !orchestrator.mount().await {
        if button {
            match tui::run(orchestrator.button())? {
                Outcome::Activated => orchestrator.login().await,
                Outcome::Cancelled => return Ok(()),
            }
        } else {
            orchestrator.login().await;
        }
    }

    match rx.try_recv() {
        Ok(Ok(success)) => {
            let merged = serde_json::Value::Object(success.merged());
            println!("{}", serde_json::to_string_pretty(&merged)?);
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) if orchestrator.has_client() => {
            println!("Finish signing in in the browser, then run again with --redirect-response <URL>.");
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn cache_for(client_id: Option<String>, config: &LoginConfig) -> Result<TokenCache> {
    let Some(client_id) = client_id.or_else(|| config.client_id.clone()) else {
        bail!("No client id given or configured");
    };
    if !is_valid_client_id(&client_id) {
        bail!("'{}' is not a valid client id", client_id);
    }
    let path = TokenCache::default_path(&client_id)?;
    TokenCache::load_from(path)
}

fn status(cache: &TokenCache) {
    if let Some(path) = cache.path() {
        println!("Cache: {}", path.display());
    }
    let tokens = cache.access_tokens();
    if tokens.is_empty() && cache.get_refresh_token().is_none() {
        println!("Not signed in");
    }
    for token in tokens {
        let who = token
            .account
            .as_ref()
            .and_then(|a| a.username.as_deref())
            .unwrap_or("unknown account");
        let state = if ms_login::auth::tokens::is_expired(token.expires_on) {
            "expired"
        } else {
            "valid"
        };
        println!("  {} [{}] {}", who, token.scopes.join(" "), state);
    }
    if cache.get_refresh_token().is_some() {
        println!("Refresh token: present");
    }
    if cache.has_pending_redirect() {
        println!("A redirect sign-in is waiting for --redirect-response");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Login(args) => {
            args.apply(&mut config);
            sign_in(config, &args, false).await?;
        }
        Commands::Button(args) => {
            args.apply(&mut config);
            sign_in(config, &args, true).await?;
        }
        Commands::Status { client_id } => {
            status(&cache_for(client_id, &config)?);
        }
        Commands::Logout { client_id } => {
            tracing::info!("Clearing cached tokens...");
            let mut cache = cache_for(client_id, &config)?;
            cache.clear_tokens();
            cache.save()?;
            println!("Signed out");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("domain_hint=contoso.com").unwrap(),
            ("domain_hint".to_string(), "contoso.com".to_string())
        );
        assert_eq!(
            parse_key_value("state=a=b").unwrap(),
            ("state".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_args_override_config() {
        let cli = Cli::parse_from([
            "ms-login",
            "login",
            "--client-id",
            "12345678-1234-1234-1234-123456789012",
            "-s",
            "Mail.Read",
            "--extra",
            "login_hint=a@contoso.com",
            "--prompt",
            "select_account",
            "--with-user-data",
        ]);
        let Commands::Login(args) = cli.command else {
            panic!("expected login");
        };

        let mut config = LoginConfig {
            graph_scopes: vec!["Calendars.Read".into()],
            debug: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(
            config.client_id.as_deref(),
            Some("12345678-1234-1234-1234-123456789012")
        );
        assert_eq!(config.graph_scopes, vec!["Mail.Read"]);
        assert_eq!(config.extra_query_parameters["login_hint"], "a@contoso.com");
        assert_eq!(config.prompt, Some(Prompt::SelectAccount));
        assert!(config.with_user_data);
        assert!(config.debug);
        assert!(!config.force_redirect_strategy);
    }
}
