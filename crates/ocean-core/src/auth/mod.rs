//! Authentication module for managing user sessions and tokens.
//!
//! This module provides:
//! - `SessionManager`: startup resolution, sign-in, sign-out and background refresh
//! - `TokenCodec`: reads a bearer token's expiry claim
//! - `TokenStorage`: persists the access/refresh pair in a file, the OS keychain or memory

pub mod session;
pub mod storage;
pub mod token;

pub use session::{SessionError, SessionManager, SessionOptions, SessionSnapshot, SessionState};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StoredTokens, TokenStorage};
pub use token::{DecodePolicy, TokenCodec};
