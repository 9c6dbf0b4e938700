//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `SessionManager`: login, logout, refresh and authenticated dispatch
//! - `CredentialStore`: where the token pair lives, with in-memory,
//!   session-file and OS keychain backends
//! - `SessionError`: typed outcomes for everything that can go wrong
//!
//! Expiry is discovered when the service rejects a token; no clock is kept.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod session;

pub use credentials::{CredentialStore, KeyringStore, MemoryStore};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::FileStore;
