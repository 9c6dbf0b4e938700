//! Client-side session handling for a token-based authentication service.
//!
//! The [`SessionManager`] logs in, persists the access/refresh token pair in
//! a [`CredentialStore`], attaches the access token to outgoing requests and
//! renews it when the service answers `401`, with at most one refresh call in
//! flight at a time.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{HttpExecutor, Request, RequestExecutor, Response, TransportError};
pub use auth::{
    CredentialStore, FileStore, KeyringStore, MemoryStore, SessionError, SessionManager,
};
pub use config::{Config, CredentialBackend};
pub use models::{Credential, ProfileSummary, ProtectedMessage, UserProfile};
