//! Terminal rendering of the sign-in control
//!
//! The button is drawn in an inline viewport below the shell prompt rather
//! than taking over the whole screen.

mod app;
mod button;

pub use app::{run, Outcome};
pub use button::{ButtonContent, ButtonTheme, LoginButton};
