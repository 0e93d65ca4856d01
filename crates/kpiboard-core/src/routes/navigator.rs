use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use tracing::{debug, warn};

use super::guard::{resolve, Outcome, Route};
use crate::auth::SessionState;

/// Upper bound on chained guard redirects for a single visit.
const MAX_REDIRECTS: usize = 4;

/// Forced navigation that bypasses the guards, used when the session
/// becomes unrecoverable (the refresh token was rejected).
pub trait HardRedirect: Send + Sync {
    fn hard_redirect(&self, route: Route);
}

#[derive(Debug)]
struct History {
    entries: Vec<Route>,
    hard_redirects: usize,
}

/// Navigation history driven by the route guards.
#[derive(Debug)]
pub struct Navigator {
    history: Mutex<History>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    /// A fresh history starting at `/`.
    pub fn new() -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![Route::Root],
                hard_redirects: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        // History is plain data, a poisoned lock is still consistent
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Route {
        self.lock().entries.last().copied().unwrap_or(Route::Root)
    }

    pub fn entries(&self) -> Vec<Route> {
        self.lock().entries.clone()
    }

    /// Number of forced redirects since startup.
    pub fn hard_redirect_count(&self) -> usize {
        self.lock().hard_redirects
    }

    /// Navigate to `route`, following guard redirects until a view renders.
    ///
    /// Redirects replace the history entry that triggered them, so going
    /// back never lands on a guarded page.
    pub fn visit(&self, route: Route, state: &SessionState) -> Result<Outcome> {
        self.lock().entries.push(route);
        self.settle(state)
    }

    /// Re-evaluate the current entry, e.g. after the session changed.
    pub fn settle(&self, state: &SessionState) -> Result<Outcome> {
        let mut history = self.lock();
        for _ in 0..=MAX_REDIRECTS {
            let current = history.entries.last().copied().unwrap_or(Route::Root);
            match resolve(current, state) {
                Outcome::Redirect { to, replace } => {
                    debug!(from = %current, to = %to, "Guard redirect");
                    if replace {
                        history.entries.pop();
                    }
                    history.entries.push(to);
                }
                outcome => return Ok(outcome),
            }
        }
        Err(anyhow::anyhow!("Too many redirects from {}", route_of(&history)))
    }

    /// Pop the current entry. Returns the new current route, if any remains.
    pub fn back(&self) -> Option<Route> {
        let mut history = self.lock();
        if history.entries.len() <= 1 {
            return None;
        }
        history.entries.pop();
        history.entries.last().copied()
    }
}

fn route_of(history: &History) -> Route {
    history.entries.last().copied().unwrap_or(Route::Root)
}

impl HardRedirect for Navigator {
    fn hard_redirect(&self, route: Route) {
        warn!(to = %route, "Session ended, forcing navigation");
        let mut history = self.lock();
        history.entries.push(route);
        history.hard_redirects += 1;
    }
}
