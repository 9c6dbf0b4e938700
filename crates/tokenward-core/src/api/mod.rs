//! HTTP client module for the authentication service.
//!
//! This module provides the `RequestExecutor` abstraction and its
//! reqwest-backed `HttpExecutor`, along with the `Request`/`Response`
//! values that flow through it. Status codes are not interpreted here.

pub mod client;
pub mod error;

pub use client::{HttpExecutor, Request, RequestExecutor, Response, DEFAULT_TIMEOUT_SECS};
pub use error::TransportError;
pub use reqwest::{Method, StatusCode};
