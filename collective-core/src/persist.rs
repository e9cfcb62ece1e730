//! Saving and loading a session.
//!
//! Sessions are written as pretty JSON inside a versioned envelope.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::PersistError;
use crate::session::SessionState;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// A saved session with everything needed to resume play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the save was created.
    pub saved_at: DateTime<Utc>,

    /// One-line status at save time, readable without loading the state.
    pub summary: String,

    /// The complete session state.
    pub state: SessionState,
}

impl SavedSession {
    pub fn new(state: SessionState) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            summary: state.summary(),
            state,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EventKind, EventSource};

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut state = SessionState::new("Roundtrip");
        state.set_location("The Docks", EventSource::System);
        SavedSession::new(state.clone()).save_json(&path).await.unwrap();

        let loaded = SavedSession::load_json(&path).await.unwrap();
        assert_eq!(loaded.version, SAVE_VERSION);
        assert_eq!(loaded.summary, state.summary());
        assert_eq!(loaded.state.id(), state.id());
        assert_eq!(loaded.state.location(), "The Docks");
        assert_eq!(loaded.state.event_log(), state.event_log());
        assert_eq!(loaded.state.event_log().count(EventKind::LocationChange), 1);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");

        let mut saved = SavedSession::new(SessionState::new("Old"));
        saved.version = 99;
        saved.save_json(&path).await.unwrap();

        let err = SavedSession::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SavedSession::load_json(dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
