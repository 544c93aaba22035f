pub mod init;
pub mod nodes;
pub mod placement;
pub mod progress;
pub mod quiz;
pub mod search;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use questpath_core::curriculum::Curriculum;
use questpath_core::parser::{load_curriculum_dir, parse_subject};
use questpath_core::LearningEngine;
use questpath_runner::LocalRunner;
use questpath_store::{create_backend, load_config_from, QuestpathConfig};

/// Load a single subject file or every subject under a directory.
pub fn load_curriculum(path: &Path) -> Result<Curriculum> {
    if path.is_dir() {
        load_curriculum_dir(path)
    } else {
        let graph = parse_subject(path)?;
        Curriculum::new(vec![graph]).with_context(|| format!("failed to load {}", path.display()))
    }
}

/// The explicit curriculum path, or the configured `curriculum_dir`.
pub fn curriculum_path(explicit: Option<PathBuf>, config: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(load_config_from(config)?.curriculum_path()),
    }
}

/// Wire up an engine from configuration: curriculum, backend and grader.
pub fn build_engine(config_path: Option<&Path>) -> Result<LearningEngine> {
    let config: QuestpathConfig = load_config_from(config_path)?;
    let curriculum = load_curriculum(&config.curriculum_path())?;
    let backend = create_backend(&config.backend)?;
    let runner = LocalRunner::new(config.runner.target_dir.clone())
        .with_timeout(Duration::from_secs(config.runner.timeout_secs));

    let engine = LearningEngine::new(
        Arc::new(curriculum),
        backend,
        Arc::new(runner),
        config.engine_config(),
    );
    tracing::debug!(
        "engine ready: {} subject(s), backend {}",
        engine.curriculum().subjects().count(),
        engine.store().backend_name()
    );
    Ok(engine)
}
