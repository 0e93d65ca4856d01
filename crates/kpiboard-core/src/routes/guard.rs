use std::str::FromStr;

use serde::Serialize;

use crate::auth::SessionState;

/// Every navigable view of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Root,
    Home,
    Login,
    Register,
    Dashboard,
}

impl Route {
    pub const ALL: [Route; 5] = [Route::Root, Route::Home, Route::Login, Route::Register, Route::Dashboard];

    pub fn path(self) -> &'static str {
        match self {
            Route::Root => "/",
            Route::Home => "/home",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
        }
    }

    pub fn guard(self) -> Guard {
        match self {
            Route::Root => Guard::RootRedirect,
            Route::Home => Guard::Open,
            Route::Login | Route::Register => Guard::PublicOnly,
            Route::Dashboard => Guard::Protected,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl FromStr for Route {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let path = match trimmed.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        Route::ALL
            .into_iter()
            .find(|r| r.path() == path)
            .ok_or_else(|| anyhow::anyhow!("Unknown route: {}", trimmed))
    }
}

/// How a route decides whether it may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Always renders (marketing pages)
    Open,
    /// Only for authenticated users
    Protected,
    /// Only for anonymous users (login, registration)
    PublicOnly,
    /// Never renders; forwards to dashboard or home
    RootRedirect,
}

/// Result of evaluating a route against the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    /// Session not initialized yet; show a neutral loading state
    Loading,
    Render { route: Route },
    /// Navigate elsewhere; `replace` swaps the current history entry
    Redirect { to: Route, replace: bool },
}

/// Global gate: nothing is evaluated before initialization.
pub fn gate(state: &SessionState) -> Option<Outcome> {
    (!state.is_initialized).then_some(Outcome::Loading)
}

pub fn protected(route: Route, state: &SessionState) -> Outcome {
    if let Some(loading) = gate(state) {
        return loading;
    }
    if state.is_authenticated {
        Outcome::Render { route }
    } else {
        Outcome::Redirect { to: Route::Login, replace: true }
    }
}

pub fn public_only(route: Route, state: &SessionState) -> Outcome {
    if let Some(loading) = gate(state) {
        return loading;
    }
    if state.is_authenticated {
        Outcome::Redirect { to: Route::Dashboard, replace: true }
    } else {
        Outcome::Render { route }
    }
}

pub fn root_redirect(state: &SessionState) -> Outcome {
    if let Some(loading) = gate(state) {
        return loading;
    }
    Outcome::Redirect {
        to: brand_target(state),
        replace: true,
    }
}

/// Evaluate `route` with its own guard.
pub fn resolve(route: Route, state: &SessionState) -> Outcome {
    match route.guard() {
        Guard::Open => gate(state).unwrap_or(Outcome::Render { route }),
        Guard::Protected => protected(route, state),
        Guard::PublicOnly => public_only(route, state),
        Guard::RootRedirect => root_redirect(state),
    }
}

/// Where the logo link leads.
pub fn brand_target(state: &SessionState) -> Route {
    if state.is_authenticated {
        Route::Dashboard
    } else {
        Route::Home
    }
}
