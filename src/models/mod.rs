//! Data models for sign-in results

mod auth;
mod user;

pub use auth::*;
pub use user::*;
