use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::messages::{
    translate_field_error, INVALID_CREDENTIALS, LOGIN_FAILED, REGISTRATION_FAILED,
    REGISTRATION_REJECTED, SERVER_UNAVAILABLE, UNREADABLE_RESPONSE,
};
use super::state::SessionState;
use super::tokens::{TokenKind, TokenStore};
use crate::api::{ApiClient, ApiError, ErrorDetail};
use crate::models::{RegisterCompanyRequest, TokenPair, User};

/// Per-field messages, in the order the backend reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    entries: Vec<(String, String)>,
}

impl FieldErrors {
    /// Set the message for `field`. A repeated field keeps its original
    /// position and takes the newer message.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let message = message.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = message,
            None => self.entries.push((field, message)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All messages joined with "; ".
    pub fn joined(&self) -> String {
        let messages: Vec<&str> = self.entries.iter().map(|(_, m)| m.as_str()).collect();
        messages.join("; ")
    }
}

/// Result of `login` / `register_company`, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure {
        message: String,
        field_errors: FieldErrors,
    },
}

impl AuthOutcome {
    fn failure(message: impl Into<String>) -> Self {
        AuthOutcome::Failure {
            message: message.into(),
            field_errors: FieldErrors::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success)
    }

    /// General failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            AuthOutcome::Success => None,
            AuthOutcome::Failure { message, .. } => Some(message),
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AuthOutcome::Success => None,
            AuthOutcome::Failure { field_errors, .. } => Some(field_errors),
        }
    }

    /// Message to show next to a form field.
    ///
    /// The login field also picks up a general message that talks about the
    /// login (e.g. "Логин уже занят").
    pub fn field_message(&self, field: &str) -> Option<String> {
        let AuthOutcome::Failure { message, field_errors } = self else {
            return None;
        };
        if let Some(msg) = field_errors.get(field) {
            return Some(msg.to_string());
        }
        (field == "login" && message.to_lowercase().contains("логин")).then(|| message.clone())
    }
}

/// The session service: current user, auth flags and the operations that
/// change them.
///
/// State is published through a `watch` channel; route guards and views
/// subscribe and re-evaluate on every change. Operations are not
/// serialized against each other: whichever finishes last wins.
pub struct AuthSession {
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
}

impl AuthSession {
    pub fn new(api: ApiClient, tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { api, tokens, state }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Apply a mutation. `is_initialized` can only ever be raised.
    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(|state| {
            let was_initialized = state.is_initialized;
            f(state);
            state.is_initialized |= was_initialized;
        });
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
    }

    /// Persist a fresh token pair and load the user it belongs to.
    async fn sign_in(&self, tokens: TokenPair) -> Result<User> {
        self.tokens.save(&tokens).context("Failed to store tokens")?;
        self.api.me().await.context("Failed to load current user")
    }

    fn finish_sign_in(&self, user: User) {
        info!(login = ?user.login, "Signed in");
        self.update(|state| {
            state.sign_in(user);
            state.is_loading = false;
        });
    }

    /// Sign in with login and password.
    pub async fn login(&self, login: &str, password: &str) -> AuthOutcome {
        self.update(|state| state.is_loading = true);

        let result = match self.api.login(login, password).await {
            Ok(tokens) => self.sign_in(tokens).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(user) => {
                self.finish_sign_in(user);
                AuthOutcome::Success
            }
            Err(e) => {
                self.update(|state| state.is_loading = false);
                error!(error = %e, "Login failed");
                AuthOutcome::failure(login_failure_message(&e))
            }
        }
    }

    /// Create a company with its owner account and sign in as the owner.
    pub async fn register_company(&self, request: &RegisterCompanyRequest) -> AuthOutcome {
        self.update(|state| state.is_loading = true);

        let result = match self.api.register_company(request).await {
            Ok(tokens) => self.sign_in(tokens).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(user) => {
                self.finish_sign_in(user);
                AuthOutcome::Success
            }
            Err(e) => {
                self.update(|state| state.is_loading = false);
                error!(error = %e, "Registration failed");
                registration_failure(&e)
            }
        }
    }

    /// Drop the session. Safe to call repeatedly.
    pub fn logout(&self) {
        self.update(|state| state.is_logging_out = true);
        self.clear_tokens();
        self.update(|state| {
            state.sign_out();
            state.is_logging_out = false;
        });
        info!("Signed out");
    }

    /// Restore the session from stored tokens. Run once at startup; marks
    /// the session initialized whatever the outcome.
    pub async fn check_auth(&self) {
        let token = match self.tokens.read(TokenKind::Access) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored access token");
                None
            }
        };

        if token.is_none() {
            debug!("No stored access token");
            self.update(|state| state.is_initialized = true);
            return;
        }

        match self.api.me().await {
            Ok(user) => {
                info!(login = ?user.login, "Session restored");
                self.update(|state| {
                    state.sign_in(user);
                    state.is_initialized = true;
                });
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.clear_tokens();
                self.update(|state| {
                    state.sign_out();
                    state.is_initialized = true;
                });
            }
        }
    }
}

fn login_failure_message(e: &anyhow::Error) -> String {
    let Some(api_err) = e.downcast_ref::<ApiError>() else {
        return LOGIN_FAILED.to_string();
    };
    if api_err.is_network() {
        return SERVER_UNAVAILABLE.to_string();
    }
    if api_err.is_invalid_response() {
        return UNREADABLE_RESPONSE.to_string();
    }
    match api_err.detail() {
        Some(ErrorDetail::Message(msg)) => msg.clone(),
        Some(ErrorDetail::Fields(fields)) if !fields.is_empty() => fields
            .iter()
            .map(translate_field_error)
            .collect::<Vec<_>>()
            .join("; "),
        _ => INVALID_CREDENTIALS.to_string(),
    }
}

fn registration_failure(e: &anyhow::Error) -> AuthOutcome {
    let Some(api_err) = e.downcast_ref::<ApiError>() else {
        return AuthOutcome::failure(REGISTRATION_FAILED);
    };
    if api_err.is_network() {
        return AuthOutcome::failure(SERVER_UNAVAILABLE);
    }
    if api_err.is_invalid_response() {
        return AuthOutcome::failure(UNREADABLE_RESPONSE);
    }
    match api_err.detail() {
        Some(ErrorDetail::Fields(fields)) => {
            let mut field_errors = FieldErrors::default();
            for err in fields {
                if let Some(field) = err.field() {
                    field_errors.insert(field, translate_field_error(err));
                }
            }
            let message = if field_errors.is_empty() {
                REGISTRATION_FAILED.to_string()
            } else {
                field_errors.joined()
            };
            AuthOutcome::Failure { message, field_errors }
        }
        Some(ErrorDetail::Message(msg)) => AuthOutcome::failure(msg.clone()),
        _ => AuthOutcome::failure(REGISTRATION_REJECTED),
    }
}
