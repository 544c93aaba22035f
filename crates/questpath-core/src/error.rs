//! Engine and persistence error types.
//!
//! `PersistenceError` lives in `questpath-core` so the progress store can
//! classify backend failures for retry decisions without string matching.

use thiserror::Error;

/// Errors raised by a [`ProgressBackend`](crate::traits::ProgressBackend).
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// The backing medium could not be read or written. Safe to retry.
    #[error("persistence I/O error: {0}")]
    Io(String),

    /// Stored data could not be decoded. Retrying will not help.
    #[error("corrupt progress data: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    /// Returns `true` if the failed read-modify-write may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Io(_))
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e.to_string())
    }
}

/// Errors surfaced by the learning-progression engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    #[error("unknown node '{node}' in subject '{subject}'")]
    UnknownNode { subject: String, node: String },

    /// Caller bug: hearts must stay within `[0, max]`.
    #[error("invalid heart count {value} (allowed 0..={max})")]
    InvalidHeartCount { value: u32, max: u32 },

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("node '{node}' in subject '{subject}' is locked")]
    NodeLocked { subject: String, node: String },

    #[error("node '{node}' in subject '{subject}' has no questions")]
    EmptyQuestionBank { subject: String, node: String },

    /// An operation was attempted from a state that does not allow it.
    #[error("cannot {action} while session is {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// The submitted answer shape does not fit the current question kind.
    #[error("answer does not match question kind {expected}")]
    AnswerMismatch { expected: &'static str },

    #[error("prerequisite cycle in subject '{subject}' through node '{node}'")]
    CycleDetected { subject: String, node: String },

    /// Structural problem found while building a curriculum.
    #[error("invalid curriculum: {0}")]
    InvalidCurriculum(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("code grader failed: {0}")]
    Grader(String),
}

impl EngineError {
    /// Returns `true` for bad curriculum references, which are never retried.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownSubject(_) | EngineError::UnknownNode { .. }
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
