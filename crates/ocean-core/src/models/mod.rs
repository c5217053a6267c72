//! Data models for Ocean platform entities.
//!
//! This module contains the request and response structures exchanged
//! with the Ocean REST API:
//!
//! - `Credentials`, `TokenPair`: sign-in input and the issued bearer tokens
//! - `RegisterAccountRequest`, `Account`: account sign-up
//! - `Project`, `ProjectCreateRequest`: project listing and creation

pub mod account;
pub mod project;

pub use account::{Account, Credentials, RefreshTokenRequest, RegisterAccountRequest, TokenPair};
pub use project::{Project, ProjectCreateRequest};
