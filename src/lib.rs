//! Sign in with Microsoft
//!
//! A "Sign in with Microsoft" control for terminal applications and the
//! OAuth2/OpenID Connect flow behind it: popup or redirect sign-in, silent
//! token acquisition with interactive fallback and, optionally, the user's
//! Microsoft Graph profile.

pub mod api;
pub mod auth;
pub mod config;
pub mod login;
pub mod models;
pub mod tui;

pub use config::LoginConfig;
pub use login::{AuthCallback, AuthResult, LoginError, LoginOrchestrator};
pub use models::{AuthResponse, LoginSuccess, UserProfile};
