//! Data models exchanged with the KPIBoard backend.
//!
//! - `User`, `Role`: the current-user record from `GET /auth/me`
//! - `TokenPair`: the bearer pair returned by login, registration and refresh
//! - Request bodies: `LoginRequest`, `RefreshRequest`, `RegisterCompanyRequest`

pub mod auth;
pub mod user;

pub use auth::{format_salary, parse_salary, LoginRequest, RefreshRequest, RegisterCompanyRequest, TokenPair};
pub use user::{Role, User};
