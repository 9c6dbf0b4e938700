use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Credential;

use super::{CredentialStore, SessionError};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// On-disk layout of the session file. Fields are optional so that a
/// half-written file still parses and reads as "no session".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Credential store backed by `session.json` in the cache directory.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the current credential was last written. Display only.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.load().and_then(|file| file.saved_at)
    }

    fn load(&self) -> Option<SessionFile> {
        if !self.path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse session file");
                None
            }
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Option<Credential> {
        let file = self.load()?;
        Credential::from_parts(file.access_token, file.refresh_token)
    }

    fn set(&self, credential: &Credential) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SessionError::Storage(format!("Failed to create cache directory: {}", e)))?;
        }
        let file = SessionFile {
            access_token: Some(credential.access_token.clone()),
            refresh_token: Some(credential.refresh_token.clone()),
            saved_at: Some(Utc::now()),
        };
        let contents = serde_json::to_string_pretty(&file)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {}", e)))?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Session file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!("Failed to remove session file: {}", e))),
        }
    }
}
