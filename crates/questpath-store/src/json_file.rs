//! Progress persisted as one flat JSON document keyed by username.
//!
//! ```json
//! { "alice": { "math": { "experience": 60, "tier": "intermediate", ... } } }
//! ```
//!
//! Every save rewrites the whole document through a temp file that is
//! renamed into place, so a crash never leaves a half-written file. An
//! in-process lock serializes whole-file read-modify-write cycles across
//! keys; per-key serialization above that is the progress store's job.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use questpath_core::error::PersistenceError;
use questpath_core::progress::ProgressRecord;
use questpath_core::traits::ProgressBackend;

type Document = BTreeMap<String, BTreeMap<String, ProgressRecord>>;

pub struct JsonFileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Document, PersistenceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            PersistenceError::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    async fn write_document(&self, doc: &Document) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| PersistenceError::Corrupt(format!("failed to encode progress: {e}")))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| PersistenceError::Io(format!("write task failed: {e}")))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PersistenceError::Io(e.error.to_string()))?;
    Ok(())
}

#[async_trait]
impl ProgressBackend for JsonFileBackend {
    fn name(&self) -> &str {
        "json"
    }

    async fn load_progress(
        &self,
        user: &str,
        subject: &str,
    ) -> Result<Option<ProgressRecord>, PersistenceError> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        Ok(doc.get(user).and_then(|s| s.get(subject)).cloned())
    }

    async fn save_progress(
        &self,
        user: &str,
        subject: &str,
        record: &ProgressRecord,
    ) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.entry(user.to_string())
            .or_default()
            .insert(subject.to_string(), record.clone());
        self.write_document(&doc).await?;
        tracing::trace!("saved {user}/{subject} to {}", self.path.display());
        Ok(())
    }

    async fn subjects_for(&self, user: &str) -> Result<Vec<String>, PersistenceError> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        Ok(doc
            .get(user)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questpath_core::progress::ProgressRules;
    use std::sync::Arc;

    fn record(xp: u64) -> ProgressRecord {
        let mut r = ProgressRecord::new(&ProgressRules::default());
        r.experience = xp;
        r
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("progress.json"));
        assert!(backend.load_progress("alice", "math").await.unwrap().is_none());
        assert!(backend.subjects_for("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.json");
        let backend = JsonFileBackend::new(&path);
        backend.save_progress("alice", "math", &record(40)).await.unwrap();
        backend.save_progress("alice", "cs", &record(5)).await.unwrap();
        backend.save_progress("bob", "math", &record(7)).await.unwrap();

        let loaded = backend.load_progress("alice", "math").await.unwrap().unwrap();
        assert_eq!(loaded.experience, 40);
        assert_eq!(
            backend.subjects_for("alice").await.unwrap(),
            vec!["cs".to_string(), "math".to_string()]
        );

        // Flat document keyed by username.
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["bob"]["math"]["experience"], 7);
        assert_eq!(raw["alice"]["math"]["tier"], "beginner");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        JsonFileBackend::new(&path)
            .save_progress("alice", "math", &record(12))
            .await
            .unwrap();
        let reopened = JsonFileBackend::new(&path);
        let loaded = reopened.load_progress("alice", "math").await.unwrap().unwrap();
        assert_eq!(loaded.experience, 12);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();
        let backend = JsonFileBackend::new(&path);
        let err = backend.load_progress("alice", "math").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn concurrent_saves_to_different_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(JsonFileBackend::new(dir.path().join("progress.json")));
        let tasks = (0..20u64).map(|i| {
            let backend = Arc::clone(&backend);
            async move {
                backend
                    .save_progress(&format!("user{i}"), "math", &record(i))
                    .await
            }
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        for i in 0..20u64 {
            let r = backend
                .load_progress(&format!("user{i}"), "math")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(r.experience, i);
        }
    }
}
