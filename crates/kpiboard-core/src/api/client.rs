//! API client for the KPIBoard REST backend.
//!
//! Every request goes through the same pipeline: the access token from the
//! token store is attached as a bearer header, and a 401 triggers a single
//! refresh-and-retry. Each logical request is tracked by a `RequestContext`
//! whose `retried` flag caps it at one refresh and one retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::ApiError;
use crate::auth::{TokenKind, TokenStore};
use crate::models::{LoginRequest, RefreshRequest, RegisterCompanyRequest, TokenPair, User};
use crate::routes::{HardRedirect, Route};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/auth/login";
const ME_PATH: &str = "/auth/me";
const REGISTER_COMPANY_PATH: &str = "/auth/register-company";
const REFRESH_PATH: &str = "/auth/refresh";

// ============================================================================
// Request state machine
// ============================================================================

/// Lifecycle of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Not sent, or the first attempt is in flight
    Pending,
    /// Got a 401; refreshing tokens and resending
    Retrying,
    Done,
    Failed,
}

/// One logical request, carried across its original attempt and its retry.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    retried: bool,
    state: RequestState,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
            state: RequestState::Pending,
        }
    }

    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body).context("Failed to serialize request body")?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once the request has used up its refresh-and-retry.
    pub fn retried(&self) -> bool {
        self.retried
    }

    pub fn state(&self) -> RequestState {
        self.state
    }
}

// ============================================================================
// Client
// ============================================================================

/// API client for the KPIBoard backend.
/// Clone is cheap - reqwest::Client and the shared stores are reference counted.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    redirect: Arc<dyn HardRedirect>,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000/api/v1`).
    ///
    /// `timeout` of `None` means requests wait for the backend indefinitely.
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        tokens: Arc<dyn TokenStore>,
        redirect: Arc<dyn HardRedirect>,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            redirect,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Request interceptor: the current access token, if any.
    /// A store failure degrades to an anonymous request.
    fn current_access_token(&self) -> Option<String> {
        match self.tokens.read(TokenKind::Access) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read access token, sending without auth");
                None
            }
        }
    }

    async fn dispatch(&self, ctx: &RequestContext, token: Option<&str>) -> Result<Response, ApiError> {
        let mut request = self.client.request(ctx.method.clone(), self.url(&ctx.path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(ref body) = ctx.body {
            request = request.json(body);
        }
        let response = request.send().await?;
        debug!(method = %ctx.method, path = %ctx.path, status = %response.status(), retried = ctx.retried, "Response received");
        Ok(response)
    }

    /// Resolve a response into success or a typed error, updating the state.
    async fn finish(ctx: &mut RequestContext, response: Response) -> Result<Response> {
        if response.status().is_success() {
            ctx.state = RequestState::Done;
            return Ok(response);
        }
        ctx.state = RequestState::Failed;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body).into())
    }

    /// Run a request through the full pipeline.
    ///
    /// On a first 401 with a stored refresh token, the token pair is
    /// refreshed and the request is sent once more with the new access
    /// token; that second outcome is returned as-is. If the refresh itself
    /// fails, the token store is cleared, the app is sent back to `/`, and
    /// the refresh error is returned.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<Response> {
        let token = self.current_access_token();
        let response = match self.dispatch(ctx, token.as_deref()).await {
            Ok(response) => response,
            Err(e) => {
                ctx.state = RequestState::Failed;
                return Err(e.into());
            }
        };

        if response.status() != StatusCode::UNAUTHORIZED || ctx.retried {
            return Self::finish(ctx, response).await;
        }

        ctx.retried = true;
        ctx.state = RequestState::Retrying;

        let refresh_token = match self.tokens.read(TokenKind::Refresh) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(path = %ctx.path, "Unauthorized and no refresh token stored");
                return Self::finish(ctx, response).await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                return Self::finish(ctx, response).await;
            }
        };

        let tokens = match self.refresh_and_store(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                ctx.state = RequestState::Failed;
                warn!(error = %e, path = %ctx.path, "Token refresh failed, ending session");
                if let Err(clear_err) = self.tokens.clear() {
                    warn!(error = %clear_err, "Failed to clear tokens");
                }
                self.redirect.hard_redirect(Route::Root);
                return Err(e);
            }
        };

        info!(path = %ctx.path, "Tokens refreshed, retrying request");
        let response = match self.dispatch(ctx, Some(&tokens.access_token)).await {
            Ok(response) => response,
            Err(e) => {
                ctx.state = RequestState::Failed;
                return Err(e.into());
            }
        };
        Self::finish(ctx, response).await
    }

    async fn refresh_and_store(&self, refresh_token: &str) -> Result<TokenPair> {
        let tokens = self.refresh(refresh_token).await?;
        self.tokens
            .save(&tokens)
            .context("Failed to store refreshed tokens")?;
        Ok(tokens)
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let text = response
            .text()
            .await
            .map_err(ApiError::NetworkError)
            .with_context(|| format!("Failed to read {} response body", what))?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", what, e)).into())
    }

    async fn send_json<T: DeserializeOwned>(&self, mut ctx: RequestContext) -> Result<T> {
        let what = format!("{} {}", ctx.method, ctx.path);
        let response = self.execute(&mut ctx).await?;
        Self::parse_json(response, &what).await
    }

    // ===== Auth endpoints =====

    /// Exchange credentials for a token pair.
    pub async fn login(&self, login: &str, password: &str) -> Result<TokenPair> {
        let ctx = RequestContext::new(Method::POST, LOGIN_PATH).with_json(&LoginRequest { login, password })?;
        self.send_json(ctx).await
    }

    /// Fetch the user the current access token belongs to.
    pub async fn me(&self) -> Result<User> {
        self.send_json(RequestContext::new(Method::GET, ME_PATH)).await
    }

    /// Create a company together with its owner account.
    pub async fn register_company(&self, request: &RegisterCompanyRequest) -> Result<TokenPair> {
        let ctx = RequestContext::new(Method::POST, REGISTER_COMPANY_PATH).with_json(request)?;
        self.send_json(ctx).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Sent outside the pipeline: no access token is attached and a 401
    /// here is final.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(ApiError::NetworkError)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }
        Self::parse_json(response, "refresh").await
    }

    // ===== Generic authenticated requests =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(RequestContext::new(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(RequestContext::new(Method::POST, path).with_json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(RequestContext::new(Method::PATCH, path).with_json(body)?).await
    }

    /// Delete a resource; the response body is ignored.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut ctx = RequestContext::new(Method::DELETE, path);
        self.execute(&mut ctx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::routes::Navigator;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        client: ApiClient,
        tokens: Arc<MemoryTokenStore>,
        navigator: Arc<Navigator>,
    }

    fn harness(base_url: &str, tokens: MemoryTokenStore) -> Harness {
        let tokens = Arc::new(tokens);
        let navigator = Arc::new(Navigator::new());
        let client = ApiClient::new(base_url, None, tokens.clone(), navigator.clone())
            .expect("Failed to build client");
        Harness { client, tokens, navigator }
    }

    fn stored(access: &str, refresh: &str) -> MemoryTokenStore {
        MemoryTokenStore::with_tokens(&TokenPair::new(access, refresh))
    }

    fn unauthorized() -> ResponseTemplate {
        ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"}))
    }

    #[test]
    fn test_url_joining() {
        let h = harness("http://localhost:8000/api/v1/", MemoryTokenStore::new());
        assert_eq!(h.client.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(h.client.url("/auth/me"), "http://localhost:8000/api/v1/auth/me");
        assert_eq!(h.client.url("tasks"), "http://localhost:8000/api/v1/tasks");
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_json_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", "Bearer A"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"first_name": "X"})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("A", "B"));
        let user = h.client.me().await.unwrap();
        assert_eq!(user.first_name.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_no_bearer_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), MemoryTokenStore::new());
        let list: Vec<serde_json::Value> = h.client.get("/companies").await.unwrap();
        assert!(list.is_empty());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_refresh_then_retry_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("authorization", "Bearer old"))
            .respond_with(unauthorized())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({"refresh_token": "R"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new", "refresh_token": "R2", "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("old", "R"));
        let mut ctx = RequestContext::new(Method::GET, "/tasks");
        let response = h.client.execute(&mut ctx).await.unwrap();
        let body: serde_json::Value = response.json().await.unwrap();

        assert_eq!(body, json!([{"id": 1}]));
        assert!(ctx.retried());
        assert_eq!(ctx.state(), RequestState::Done);
        assert_eq!(h.tokens.read(TokenKind::Access).unwrap().as_deref(), Some("new"));
        assert_eq!(h.tokens.read(TokenKind::Refresh).unwrap().as_deref(), Some("R2"));
        assert_eq!(h.navigator.hard_redirect_count(), 0);

        // The refresh call itself never carries the access token
        let requests = server.received_requests().await.unwrap();
        let refresh = requests
            .iter()
            .find(|r| r.url.path() == "/auth/refresh")
            .unwrap();
        assert!(refresh.headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_tokens_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(unauthorized())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Невалидный refresh токен"})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("old", "R"));
        let mut ctx = RequestContext::new(Method::GET, "/tasks");
        let err = h.client.execute(&mut ctx).await.unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(
            api_err,
            ApiError::Unauthorized(crate::api::ErrorDetail::Message(m)) if m == "Невалидный refresh токен"
        ));
        assert_eq!(ctx.state(), RequestState::Failed);
        assert_eq!(h.tokens.read(TokenKind::Access).unwrap(), None);
        assert_eq!(h.tokens.read(TokenKind::Refresh).unwrap(), None);
        assert_eq!(h.navigator.hard_redirect_count(), 1);
        assert_eq!(h.navigator.current(), Route::Root);
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_token_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(unauthorized())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), MemoryTokenStore::new());
        let mut ctx = RequestContext::new(Method::GET, "/tasks");
        let err = h.client.execute(&mut ctx).await.unwrap_err();

        assert!(err.downcast_ref::<ApiError>().unwrap().is_unauthorized());
        assert_eq!(h.navigator.hard_redirect_count(), 0);
    }

    #[tokio::test]
    async fn test_retried_request_failing_again_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(unauthorized())
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new", "refresh_token": "R2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("old", "R"));
        let mut ctx = RequestContext::new(Method::GET, "/tasks");
        let err = h.client.execute(&mut ctx).await.unwrap_err();

        assert!(err.downcast_ref::<ApiError>().unwrap().is_unauthorized());
        assert_eq!(ctx.state(), RequestState::Failed);
        // Refresh worked, so the new pair stays
        assert_eq!(h.tokens.read(TokenKind::Access).unwrap().as_deref(), Some("new"));
        assert_eq!(h.navigator.hard_redirect_count(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_skip_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("old", "R"));
        let err = h.client.get::<serde_json::Value>("/tasks").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::ServerError(_))));
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_refresh_independently() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer old"))
            .respond_with(unauthorized())
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new", "refresh_token": "R2"
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(2)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("old", "R"));
        let (a, b) = futures::join!(
            h.client.get::<serde_json::Value>("/tasks"),
            h.client.get::<serde_json::Value>("/statistics/company")
        );
        assert_eq!(a.unwrap(), json!({"ok": true}));
        assert_eq!(b.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), stored("A", "B"));
        let err = h.client.me().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // Nothing listens on port 1
        let h = harness("http://127.0.0.1:1/api/v1", MemoryTokenStore::new());
        let mut ctx = RequestContext::new(Method::GET, "/auth/me");
        let err = h.client.execute(&mut ctx).await.unwrap_err();

        assert!(err.downcast_ref::<ApiError>().unwrap().is_network());
        assert_eq!(ctx.state(), RequestState::Failed);
        assert!(!ctx.retried());
    }

    #[tokio::test]
    async fn test_malformed_base_url_is_not_network_error() {
        let h = harness("not a url", MemoryTokenStore::new());
        let mut ctx = RequestContext::new(Method::GET, "/auth/me");
        let err = h.client.execute(&mut ctx).await.unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(api_err, ApiError::NetworkError(e) if e.is_builder()));
        assert!(!api_err.is_network());
        assert_eq!(ctx.state(), RequestState::Failed);
    }
}
