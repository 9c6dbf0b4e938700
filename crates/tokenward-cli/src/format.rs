//! Display helpers for command output.

use chrono::{DateTime, Utc};

/// Short relative age, e.g. "just now", "12m ago", "3h ago", "2d ago"
pub fn saved_ago(saved_at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - saved_at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}
