//! Persisted notation results.
//!
//! One JSON document per session under `{data_dir}/notations/`, replaced
//! wholesale on every recomputation. The write is atomic (temp file +
//! rename) and concurrent persists for the same session are serialized by a
//! per-session lock; across processes the policy is last-writer-wins, by
//! decision, not by accident.

use chrono::{DateTime, Utc};
use nota_common::config::StorageConfig;
use nota_common::rubric::AggregationResult;
use nota_common::state::atomic_write_str;
use nota_common::NotaError;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Envelope written to disk around the aggregation result.
#[derive(Debug, Serialize)]
struct StoredNotation<'a> {
    session_id: &'a str,
    genere_le: DateTime<Utc>,
    notation: &'a AggregationResult,
}

/// File-backed result store.
pub struct FileResultStore {
    notations_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileResultStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self::with_dir(storage.notations_dir())
    }

    pub fn with_dir(notations_dir: PathBuf) -> Self {
        Self {
            notations_dir,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.notations_dir.join(format!("{}.json", session_id))
    }

    fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(session_id.to_string()).or_default().clone()
    }

    /// Replace the stored notation for `session_id` with `result`.
    pub async fn persist(
        &self,
        session_id: &str,
        result: &AggregationResult,
    ) -> Result<PathBuf, NotaError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let doc = StoredNotation {
            session_id,
            genere_le: Utc::now(),
            notation: result,
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| NotaError::Persistence(format!("cannot serialize notation: {}", e)))?;

        let path = self.path_for(session_id);
        atomic_write_str(&path, &json)
            .map_err(|e| NotaError::Persistence(format!("cannot write {}: {}", path.display(), e)))?;

        info!("Notation persisted to {}", path.display());
        Ok(path)
    }

    /// Load the stored notation for a session, as raw JSON.
    pub fn load(&self, session_id: &str) -> Result<serde_json::Value, NotaError> {
        let path = self.path_for(session_id);
        let content = fs::read_to_string(&path).map_err(|_| {
            NotaError::Persistence(format!("no stored notation for session {}", session_id))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| NotaError::Persistence(format!("stored notation unreadable: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nota_common::rubric::{RubricKind, RubricPayload, RubricResult};
    use serde_json::json;

    fn result_with_observations(observations: serde_json::Value) -> AggregationResult {
        let mut result = AggregationResult::default();
        result.insert(RubricResult::ok(
            RubricKind::Discours,
            RubricPayload::from_value(RubricKind::Discours, json!({ "observations": observations }))
                .unwrap(),
        ));
        result
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::with_dir(dir.path().join("notations"));

        let result = result_with_observations(json!(["débit rapide"]));
        store.persist("s-1", &result).await.unwrap();

        let loaded = store.load("s-1").unwrap();
        assert_eq!(loaded["session_id"], "s-1");
        assert_eq!(
            loaded["notation"]["rubriques"]["discours"]["observations"][0],
            "débit rapide"
        );
    }

    #[tokio::test]
    async fn test_persist_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::with_dir(dir.path().join("notations"));

        store
            .persist("s-1", &result_with_observations(json!(["a", "b"])))
            .await
            .unwrap();
        store
            .persist("s-1", &result_with_observations(json!(["c"])))
            .await
            .unwrap();

        let loaded = store.load("s-1").unwrap();
        let observations = loaded["notation"]["rubriques"]["discours"]["observations"]
            .as_array()
            .unwrap();
        // no merge with the previous run
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0], "c");
    }

    #[tokio::test]
    async fn test_concurrent_persists_for_one_session_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileResultStore::with_dir(dir.path().join("notations")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let result = result_with_observations(json!([format!("run-{}", i)]));
                store.persist("s-1", &result).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // last writer wins; whichever it was, the file is a complete document
        let loaded = store.load("s-1").unwrap();
        assert_eq!(loaded["session_id"], "s-1");
        assert!(loaded["notation"]["rubriques"]["discours"]["observations"][0]
            .as_str()
            .unwrap()
            .starts_with("run-"));
    }

    #[test]
    fn test_load_missing_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::with_dir(dir.path().join("notations"));
        assert!(matches!(
            store.load("ghost"),
            Err(NotaError::Persistence(_))
        ));
    }
}
