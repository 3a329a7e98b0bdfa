//! Transcript resolution from the session store on disk.
//!
//! Sessions are JSON files under `{data_dir}/sessions/`, one per session,
//! written by the recording pipeline. The engine only reads them.

use nota_common::config::StorageConfig;
use nota_common::state::atomic_write_str;
use nota_common::transcript::{ConversationRef, SessionRecord};
use nota_common::NotaError;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Resolves a conversation reference to exactly one recorded session.
pub trait TranscriptProvider: Send + Sync {
    fn resolve(&self, conversation: &ConversationRef) -> Result<SessionRecord, NotaError>;

    /// Methodology reference document for a scenario, when one is installed.
    fn reference_document(&self, scenario_id: &str) -> Option<String>;
}

/// File-backed provider over the session directory.
pub struct FileSessionProvider {
    sessions_dir: PathBuf,
    reference_dir: PathBuf,
}

impl FileSessionProvider {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            sessions_dir: storage.sessions_dir(),
            reference_dir: storage.reference_dir(),
        }
    }

    pub fn with_dirs(sessions_dir: PathBuf, reference_dir: PathBuf) -> Self {
        Self {
            sessions_dir,
            reference_dir,
        }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_id))
    }

    /// Write a session record (used by the import command).
    pub fn save_session(&self, session: &SessionRecord) -> Result<PathBuf, NotaError> {
        let path = self.session_path(&session.session_id);
        let json = serde_json::to_string_pretty(session)?;
        atomic_write_str(&path, &json)?;
        Ok(path)
    }

    fn load_session(&self, session_id: &str) -> Result<SessionRecord, NotaError> {
        let path = self.session_path(session_id);
        let content = fs::read_to_string(&path).map_err(|_| {
            NotaError::InputResolution(format!("no session found for id {}", session_id))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            NotaError::InputResolution(format!("session {} is unreadable: {}", session_id, e))
        })
    }

    fn latest_for_scenario(&self, scenario_id: &str) -> Result<SessionRecord, NotaError> {
        let entries = fs::read_dir(&self.sessions_dir).map_err(|_| {
            NotaError::InputResolution(format!(
                "no session directory at {}",
                self.sessions_dir.display()
            ))
        })?;

        let mut best: Option<SessionRecord> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let session: SessionRecord = match serde_json::from_str(&content) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Skipping unreadable session file {}: {}", path.display(), e);
                    continue;
                }
            };
            if session.scenario_id != scenario_id || !session.is_completed() {
                continue;
            }
            let newer = best
                .as_ref()
                .map(|b| session.ended_at > b.ended_at)
                .unwrap_or(true);
            if newer {
                best = Some(session);
            }
        }

        best.ok_or_else(|| {
            NotaError::InputResolution(format!(
                "no completed session for scenario {}",
                scenario_id
            ))
        })
    }
}

impl TranscriptProvider for FileSessionProvider {
    fn resolve(&self, conversation: &ConversationRef) -> Result<SessionRecord, NotaError> {
        debug!("Resolving {}", conversation);
        match conversation {
            ConversationRef::Session(id) => self.load_session(id),
            ConversationRef::LatestForScenario(id) => self.latest_for_scenario(id),
        }
    }

    fn reference_document(&self, scenario_id: &str) -> Option<String> {
        for ext in ["md", "txt"] {
            let path = self.reference_dir.join(format!("{}.{}", scenario_id, ext));
            if let Ok(content) = fs::read_to_string(&path) {
                return Some(content);
            }
        }
        debug!("No reference document for scenario {}", scenario_id);
        None
    }
}
