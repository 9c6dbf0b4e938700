//! Data models for the authentication service.
//!
//! This module contains the structures exchanged with the remote service
//! and the credential pair the session manager persists:
//!
//! - `Credential`: access and refresh token pair
//! - `UserProfile`, `ProfileSummary`: account data returned by the service
//! - Request and response bodies for login, registration and refresh

pub mod auth;
pub mod user;

pub use auth::{
    Credential, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, TokenResponse,
};
pub use user::{ProfileSummary, ProtectedMessage, UserProfile};
