//! In-memory backend.
//!
//! Used by `backend.type = "memory"` and by tests that need failure
//! injection without touching the filesystem.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use questpath_core::error::PersistenceError;
use questpath_core::progress::ProgressRecord;
use questpath_core::traits::ProgressBackend;

#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<(String, String), ProgressRecord>,
    /// Number of upcoming saves that fail with a transient error.
    failing_saves: AtomicU32,
    save_count: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` saves fail with `PersistenceError::Io`.
    pub fn fail_next_saves(&self, n: u32) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Get the number of successful saves.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ProgressBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_progress(
        &self,
        user: &str,
        subject: &str,
    ) -> Result<Option<ProgressRecord>, PersistenceError> {
        Ok(self
            .records
            .get(&(user.to_string(), subject.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn save_progress(
        &self,
        user: &str,
        subject: &str,
        record: &ProgressRecord,
    ) -> Result<(), PersistenceError> {
        // Let concurrent callers interleave between their load and save.
        tokio::task::yield_now().await;
        if self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistenceError::Io("injected save failure".into()));
        }
        self.records
            .insert((user.to_string(), subject.to_string()), record.clone());
        self.save_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn subjects_for(&self, user: &str) -> Result<Vec<String>, PersistenceError> {
        let mut subjects: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.key().0 == user)
            .map(|e| e.key().1.clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}
