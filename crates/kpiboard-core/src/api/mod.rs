//! REST API client module for the KPIBoard backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! backend's `/api/v1` endpoints. Requests carry the stored access token as
//! a bearer header; an expired token is refreshed once per request through
//! `/auth/refresh`.

pub mod client;
pub mod error;

pub use client::{ApiClient, RequestContext, RequestState};
pub use error::{ApiError, ErrorDetail, FieldError};
