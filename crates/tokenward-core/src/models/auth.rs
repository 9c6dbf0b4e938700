use std::fmt;

use serde::{Deserialize, Serialize};

/// Token type the service reports when the field is omitted
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// An access/refresh token pair. Both values are opaque to the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Build a credential from optional parts. Partial state is no session.
    pub fn from_parts(access_token: Option<String>, refresh_token: Option<String>) -> Option<Self> {
        match (access_token, refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(Self::new(access, refresh))
            }
            _ => None,
        }
    }

    /// Same refresh token, new access token
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

// Tokens never end up in logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email_or_username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    pub fn into_credential(self) -> Credential {
        Credential::new(self.access_token, self.refresh_token)
    }
}

#[derive(Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}
