//! # API Shared
//!
//! Shared definitions for the portal's outer surfaces.
//!
//! Contains:
//! - Request/response bodies (`dto` module)
//! - Shared services like `HealthService`
//! - API key checking
//!
//! Used by `api-rest` and the `portal` CLI.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{validate_api_key, AuthError, API_KEY_HEADER};
pub use dto::*;
pub use health::HealthService;
