//! The shared-secret gate connections pass before reaching the service.

use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
struct GateState {
    password: String,
    /// Set once the bootstrap skip is consumed. Nobody can authenticate
    /// with a password afterwards.
    skipped: bool,
}

/// Password state shared by every connection of one provider.
///
/// With `auto_password`, the first successful `provider-auth` sets the
/// password, or the first connection may skip authentication entirely
/// and lock everyone else out.
#[derive(Debug)]
pub struct PasswordGate {
    auto_password: bool,
    wants_auth: bool,
    state: Mutex<GateState>,
}

impl PasswordGate {
    pub fn new(password: impl Into<String>, auto_password: bool) -> Self {
        let password = password.into();
        Self {
            auto_password,
            wants_auth: auto_password || !password.is_empty(),
            state: Mutex::new(GateState {
                password,
                skipped: false,
            }),
        }
    }

    /// False when connections start out authenticated.
    pub fn wants_auth(&self) -> bool {
        self.wants_auth
    }

    /// Checks a `provider-auth` credential. With auto-password and no
    /// password yet, `credential` becomes the password.
    ///
    /// Empty credentials never pass.
    pub fn check(&self, credential: &str) -> bool {
        if credential.is_empty() {
            return false;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.skipped {
            return false;
        }
        if state.password == credential {
            return true;
        }
        if state.password.is_empty() && self.auto_password {
            state.password = credential.to_string();
            tracing::info!("provider password set by first authentication");
            return true;
        }
        false
    }

    /// Consumes the one-time skip. Only available with auto-password
    /// while no password has been set.
    pub fn check_skip(&self) -> bool {
        if !self.auto_password {
            return false;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.skipped || !state.password.is_empty() {
            return false;
        }
        state.skipped = true;
        tracing::info!("provider authentication skipped by first connection");
        true
    }
}
