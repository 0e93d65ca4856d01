use serde::Serialize;

use crate::models::User;

/// Snapshot of the client-side session.
///
/// `is_authenticated` implies `user.is_some()`. `is_initialized` flips to
/// true once, after the startup check, and never goes back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SessionState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub is_initialized: bool,
    pub is_logging_out: bool,
}

impl SessionState {
    pub(crate) fn sign_in(&mut self, user: User) {
        self.user = Some(user);
        self.is_authenticated = true;
    }

    pub(crate) fn sign_out(&mut self) {
        self.user = None;
        self.is_authenticated = false;
    }

    /// Convenience for guards and tests.
    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            is_initialized: true,
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            is_initialized: true,
            ..Default::default()
        }
    }
}
