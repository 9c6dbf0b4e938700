use serde::{Deserialize, Serialize};

/// Account profile returned by `/auth/me`. Always fetched fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub is_verified: bool,
}

impl UserProfile {
    pub fn verified_display(&self) -> &'static str {
        if self.is_verified {
            "Yes"
        } else {
            "No"
        }
    }
}

/// Registration acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of the service's protected demo route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedMessage {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_profile() {
        let json = r#"{"user_id":"u-1","email":"alice@example.com","username":"alice","is_verified":true}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("valid profile json");
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.verified_display(), "Yes");
    }

    #[test]
    fn test_parse_profile_summary_without_user_id() {
        let json = r#"{"message":"Registration successful"}"#;
        let summary: ProfileSummary = serde_json::from_str(json).expect("valid summary json");
        assert_eq!(summary.message, "Registration successful");
        assert_eq!(summary.user_id, None);
    }
}
