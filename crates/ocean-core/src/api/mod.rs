//! REST API client module for the Ocean platform.
//!
//! This module provides the `ApiClient` for the authentication, account
//! and project endpoints, and the `AuthClient` trait the session manager
//! consumes for sign-in and token refresh.
//!
//! Protected endpoints use JWT bearer authentication with the access
//! token issued by sign-in.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthClient};
pub use error::ApiError;
