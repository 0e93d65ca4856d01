//! Core library for the KPIBoard client.
//!
//! This crate holds everything between the user interface and the KPIBoard
//! REST backend:
//!
//! - `auth`: token storage and the session service (`login`, `logout`,
//!   `check_auth`, `register_company`)
//! - `api`: the HTTP client with bearer attachment and refresh-on-401
//! - `routes`: route guards and the navigation history they drive
//! - `models`: wire types exchanged with the backend
//! - `config`: persisted client configuration
//! - `context`: wires the pieces together once at startup

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod models;
pub mod routes;

pub use api::{ApiClient, ApiError, ErrorDetail};
pub use auth::{AuthOutcome, AuthSession, FieldErrors, SessionState, TokenKind, TokenStore};
pub use config::{Config, TokenStorage};
pub use context::AuthContext;
pub use models::{RegisterCompanyRequest, Role, TokenPair, User};
pub use routes::{Guard, HardRedirect, Navigator, Outcome, Route};
