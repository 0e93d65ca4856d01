//! Authentication module for managing the user session and its tokens.
//!
//! This module provides:
//! - `TokenStore`: persistent storage for the access/refresh pair, backed by
//!   a JSON file, the OS keychain, or memory
//! - `AuthSession`: the session service with `login`, `logout`,
//!   `check_auth` and `register_company`
//! - `SessionState`: the snapshot route guards and views render from
//!
//! Tokens carry no client-side expiry; an expired access token is
//! discovered when the backend rejects it.

pub mod keychain;
pub mod messages;
pub mod session;
pub mod state;
pub mod tokens;

pub use keychain::KeychainTokenStore;
pub use session::{AuthOutcome, AuthSession, FieldErrors};
pub use state::SessionState;
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenKind, TokenStore};
