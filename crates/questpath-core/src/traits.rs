//! Core trait definitions for persistence backends and code graders.
//!
//! These async traits are implemented by the `questpath-store` and
//! `questpath-runner` crates respectively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::model::{CodeTestCase, Language};
use crate::progress::ProgressRecord;

// ---------------------------------------------------------------------------
// Persistence backend trait
// ---------------------------------------------------------------------------

/// Storage for per-(user, subject) progress records.
///
/// Backends only need to be atomic per call. The
/// [`ProgressStore`](crate::progress::ProgressStore) serializes the
/// read-modify-write cycle per key on top of them.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Human-readable backend name (e.g. "json").
    fn name(&self) -> &str;

    /// Load a record, or `None` if the pair has never been seen.
    async fn load_progress(
        &self,
        user: &str,
        subject: &str,
    ) -> Result<Option<ProgressRecord>, PersistenceError>;

    /// Persist a record, replacing any previous value.
    async fn save_progress(
        &self,
        user: &str,
        subject: &str,
        record: &ProgressRecord,
    ) -> Result<(), PersistenceError>;

    /// List the subjects a user has records for.
    async fn subjects_for(&self, user: &str) -> Result<Vec<String>, PersistenceError>;
}

// ---------------------------------------------------------------------------
// Code grader trait
// ---------------------------------------------------------------------------

/// Trait for sandboxed execution of code-completion answers.
#[async_trait]
pub trait CodeGrader: Send + Sync {
    /// Run every test case against the submitted code.
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeReport>;
}

/// Request to grade submitted code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    /// The learner's code.
    pub code: String,
    pub language: Language,
    /// Cases to run; each passes or fails on its own.
    pub tests: Vec<CodeTestCase>,
    /// Execution timeout in seconds.
    pub timeout_secs: u64,
}

/// Outcome of a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub passed: bool,
    /// Failure output, empty on success.
    #[serde(default)]
    pub message: String,
}

/// Per-case results for a graded submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeReport {
    pub cases: Vec<CaseResult>,
    /// Compiler or interpreter errors that kept the cases from running.
    #[serde(default)]
    pub compile_errors: Vec<String>,
    pub duration_ms: u64,
}

impl GradeReport {
    /// The submission is correct only if there was at least one case and all
    /// of them passed.
    pub fn all_passed(&self) -> bool {
        !self.cases.is_empty() && self.cases.iter().all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }
}

/// Grader that refuses to run code. Used where no sandbox is configured.
pub struct DisabledGrader;

#[async_trait]
impl CodeGrader for DisabledGrader {
    async fn grade(&self, _request: &GradeRequest) -> anyhow::Result<GradeReport> {
        anyhow::bail!("code grading is disabled")
    }
}
