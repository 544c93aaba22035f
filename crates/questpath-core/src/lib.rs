//! questpath-core: Learning-progression engine, traits, and rules.
//!
//! This crate defines the data model, the curriculum graph, the quiz session
//! state machine and the progress store that the rest of questpath builds on.

pub mod achievements;
pub mod catalog;
pub mod curriculum;
pub mod engine;
pub mod error;
pub mod grading;
pub mod model;
pub mod parser;
pub mod progress;
pub mod session;
pub mod traits;
pub mod unlock;

pub use engine::{EngineConfig, LearningEngine};
pub use error::{EngineError, EngineResult, PersistenceError};
