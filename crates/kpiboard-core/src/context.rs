//! Application-wide wiring.
//!
//! `AuthContext` is built once at startup and handed to whatever renders
//! the interface. It owns the token store, the API client, the session
//! service and the navigator; dropping it tears all of them down.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::auth::{AuthSession, FileTokenStore, KeychainTokenStore, MemoryTokenStore, TokenStore};
use crate::config::{Config, TokenStorage};
use crate::routes::{Navigator, Outcome, Route};

pub struct AuthContext {
    config: Config,
    navigator: Arc<Navigator>,
    session: AuthSession,
}

impl AuthContext {
    /// Build the context with the token storage named in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let tokens: Arc<dyn TokenStore> = match config.token_storage {
            TokenStorage::File => Arc::new(FileTokenStore::new(config.data_dir()?)),
            TokenStorage::Keychain => Arc::new(KeychainTokenStore::new()?),
            TokenStorage::Memory => Arc::new(MemoryTokenStore::new()),
        };
        debug!(storage = ?config.token_storage, api = %config.api_base_url, "Building auth context");
        Self::with_token_store(config, tokens)
    }

    pub fn with_token_store(config: Config, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let navigator = Arc::new(Navigator::new());
        let api = ApiClient::new(
            &config.api_base_url,
            config.request_timeout(),
            tokens.clone(),
            navigator.clone(),
        )?;
        let session = AuthSession::new(api, tokens);
        Ok(Self {
            config,
            navigator,
            session,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Restore the session and settle the initial route.
    pub async fn start(&self) -> Result<Outcome> {
        self.session.check_auth().await;
        let outcome = self.navigator.settle(&self.session.state())?;
        info!(route = %self.navigator.current(), "Started");
        Ok(outcome)
    }

    /// Navigate to `route` under the current session.
    pub fn visit(&self, route: Route) -> Result<Outcome> {
        self.navigator.visit(route, &self.session.state())
    }

    /// Re-run the guards for the current route after a session change.
    pub fn settle(&self) -> Result<Outcome> {
        self.navigator.settle(&self.session.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenKind;
    use crate::models::TokenPair;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(server: &MockServer, tokens: MemoryTokenStore) -> (AuthContext, Arc<MemoryTokenStore>) {
        let tokens = Arc::new(tokens);
        let config = Config {
            api_base_url: server.uri(),
            ..Default::default()
        };
        let ctx = AuthContext::with_token_store(config, tokens.clone()).unwrap();
        (ctx, tokens)
    }

    #[tokio::test]
    async fn test_start_anonymous_lands_on_home() {
        let server = MockServer::start().await;
        let (ctx, _) = context(&server, MemoryTokenStore::new());

        assert_eq!(ctx.visit(Route::Dashboard).unwrap(), Outcome::Loading);

        let outcome = ctx.start().await.unwrap();
        // The pending dashboard visit resolves to the login page
        assert_eq!(outcome, Outcome::Render { route: Route::Login });
        assert_eq!(ctx.visit(Route::Root).unwrap(), Outcome::Render { route: Route::Home });
    }

    #[tokio::test]
    async fn test_start_restores_dashboard() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"first_name": "Anna"})))
            .mount(&server)
            .await;
        let (ctx, _) = context(&server, MemoryTokenStore::with_tokens(&TokenPair::new("A", "B")));

        let outcome = ctx.start().await.unwrap();
        assert_eq!(outcome, Outcome::Render { route: Route::Dashboard });
        assert_eq!(ctx.visit(Route::Login).unwrap(), Outcome::Render { route: Route::Dashboard });

        ctx.session().logout();
        assert_eq!(ctx.settle().unwrap(), Outcome::Render { route: Route::Login });
    }

    #[tokio::test]
    async fn test_expired_session_is_sent_home() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let (ctx, tokens) = context(&server, MemoryTokenStore::with_tokens(&TokenPair::new("old", "R")));

        let outcome = ctx.start().await.unwrap();

        assert_eq!(outcome, Outcome::Render { route: Route::Home });
        assert_eq!(ctx.navigator().hard_redirect_count(), 1);
        assert_eq!(tokens.read(TokenKind::Refresh).unwrap(), None);
        assert!(!ctx.session().state().is_authenticated);
    }
}
