//! Step-by-step debug log of a sign-in
//!
//! Entries go through `tracing` under the `ms_login::debug` target, grouped in
//! an `ms_login_debug` span. Normal steps are INFO and failures ERROR, which the
//! fmt layer renders green and red.

use std::fmt::Display;

pub const DEBUG_TARGET: &str = "ms_login::debug";

/// Debug log switch. Disabled logs emit nothing.
#[derive(Debug, Clone, Copy)]
pub struct DebugLog {
    enabled: bool,
}

impl DebugLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn step(&self, name: &str) {
        self.emit(name, None, false);
    }

    pub fn step_with(&self, name: &str, content: &dyn Display) {
        self.emit(name, Some(content), false);
    }

    pub fn failure(&self, name: &str, content: &dyn Display) {
        self.emit(name, Some(content), true);
    }

    fn emit(&self, name: &str, content: Option<&dyn Display>, is_error: bool) {
        if !self.enabled {
            return;
        }
        let group = tracing::info_span!("ms_login_debug");
        let _entered = group.enter();
        match (is_error, content) {
            (false, None) => tracing::info!(target: DEBUG_TARGET, "{}", name),
            (false, Some(content)) => {
                tracing::info!(target: DEBUG_TARGET, content = %content, "{}", name)
            }
            (true, None) => tracing::error!(target: DEBUG_TARGET, "{}", name),
            (true, Some(content)) => {
                tracing::error!(target: DEBUG_TARGET, content = %content, "{}", name)
            }
        }
    }
}
