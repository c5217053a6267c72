//! Ocean core - session management and API client for the Ocean platform.
//!
//! The `auth::SessionManager` owns the signed-in state: it resolves a
//! session from stored tokens at startup, signs in and out, and keeps the
//! token pair fresh in the background. Front ends observe it and react to
//! the routes it sends them to through a `navigation::Navigator`.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;

pub use api::{ApiClient, ApiError, AuthClient};
pub use auth::{SessionError, SessionManager, SessionOptions, SessionSnapshot, SessionState};
pub use config::Config;
pub use navigation::{Navigator, Route};
