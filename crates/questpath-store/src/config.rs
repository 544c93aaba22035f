//! Configuration loading and backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use questpath_core::engine::EngineConfig;
use questpath_core::model::Tier;
use questpath_core::progress::{ProgressRules, RetryPolicy};
use questpath_core::traits::ProgressBackend;

use crate::json_file::JsonFileBackend;
use crate::memory::MemoryBackend;

/// Environment variable that overrides the json backend path.
pub const DATA_PATH_ENV: &str = "QUESTPATH_DATA";

/// Where progress records are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Json {
        #[serde(default = "default_data_path")]
        path: String,
    },
    /// Process-local; everything is lost on exit.
    Memory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Json {
            path: default_data_path(),
        }
    }
}

fn default_data_path() -> String {
    "questpath-progress.json".to_string()
}

/// `[engine]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_questions")]
    pub questions_per_session: usize,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    #[serde(default = "default_xp_per_correct")]
    pub xp_per_correct: u64,
    #[serde(default = "default_completion_bonus")]
    pub completion_bonus: u64,
    #[serde(default = "default_idle_secs")]
    pub session_idle_secs: u64,
    /// Retries on transient persistence errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds, doubled per retry.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_questions() -> usize {
    5
}
fn default_pass_threshold() -> f64 {
    0.70
}
fn default_xp_per_correct() -> u64 {
    10
}
fn default_completion_bonus() -> u64 {
    20
}
fn default_idle_secs() -> u64 {
    1800
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    100
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            questions_per_session: default_questions(),
            pass_threshold: default_pass_threshold(),
            xp_per_correct: default_xp_per_correct(),
            completion_bonus: default_completion_bonus(),
            session_idle_secs: default_idle_secs(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// `[runner]` table for code-completion grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Shared cargo target dir so Rust answers reuse build artifacts.
    #[serde(default)]
    pub target_dir: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            target_dir: None,
        }
    }
}

/// Top-level questpath configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestpathConfig {
    /// Directory holding the subject `.toml` files.
    #[serde(default = "default_curriculum_dir")]
    pub curriculum_dir: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    /// Per-tier unlock thresholds and heart budgets.
    #[serde(default)]
    pub tiers: ProgressRules,
    #[serde(default)]
    pub runner: RunnerSettings,
}

fn default_curriculum_dir() -> String {
    "curricula".to_string()
}

impl Default for QuestpathConfig {
    fn default() -> Self {
        Self {
            curriculum_dir: default_curriculum_dir(),
            backend: BackendConfig::default(),
            engine: EngineSettings::default(),
            tiers: ProgressRules::default(),
            runner: RunnerSettings::default(),
        }
    }
}

impl QuestpathConfig {
    pub fn curriculum_path(&self) -> PathBuf {
        PathBuf::from(&self.curriculum_dir)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        if !(e.pass_threshold > 0.0 && e.pass_threshold <= 1.0) {
            bail!("engine.pass_threshold must be in (0, 1], got {}", e.pass_threshold);
        }
        if e.questions_per_session == 0 {
            bail!("engine.questions_per_session must be at least 1");
        }
        for pair in Tier::ALL.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if self.tiers.threshold(lower) > self.tiers.threshold(upper) {
                bail!("tiers.{upper}.threshold must not be below tiers.{lower}.threshold");
            }
        }
        if let Some(tier) = Tier::ALL.iter().find(|t| self.tiers.max_hearts(**t) == 0) {
            bail!("tiers.{tier}.max_hearts must be at least 1");
        }
        Ok(())
    }

    /// Engine settings with the grading timeout taken from `[runner]`.
    pub fn engine_config(&self) -> EngineConfig {
        let e = &self.engine;
        EngineConfig {
            questions_per_session: e.questions_per_session,
            pass_threshold: e.pass_threshold,
            xp_per_correct: e.xp_per_correct,
            completion_bonus: e.completion_bonus,
            session_idle: Duration::from_secs(e.session_idle_secs),
            grade_timeout_secs: self.runner.timeout_secs,
            retry: RetryPolicy {
                max_retries: e.max_retries,
                base_delay: Duration::from_millis(e.retry_delay_ms),
            },
            rules: self.tiers.clone(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are taken literally and never expanded again.
pub fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `questpath.toml` in the current directory
/// 2. `~/.config/questpath/config.toml`
///
/// Environment variable override: `QUESTPATH_DATA` for the json backend path.
pub fn load_config() -> Result<QuestpathConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuestpathConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("questpath.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuestpathConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuestpathConfig::default(),
    };

    // Apply env var overrides
    if let Ok(data) = std::env::var(DATA_PATH_ENV) {
        if let BackendConfig::Json { path } = &mut config.backend {
            *path = data;
        }
    }

    config.curriculum_dir = resolve_env_vars(&config.curriculum_dir);
    if let BackendConfig::Json { path } = &mut config.backend {
        *path = resolve_env_vars(path);
    }

    config.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("questpath"))
}

/// Create a backend instance from its configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn ProgressBackend>> {
    match config {
        BackendConfig::Json { path } => {
            if path.trim().is_empty() {
                bail!("json backend needs a non-empty path");
            }
            Ok(Arc::new(JsonFileBackend::new(path)))
        }
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Commented starter config written by `questpath init`.
pub fn default_config_toml() -> String {
    r#"# questpath configuration
curriculum_dir = "curricula"

[backend]
type = "json"
path = "questpath-progress.json"

[engine]
questions_per_session = 5
pass_threshold = 0.7
xp_per_correct = 10
completion_bonus = 20
session_idle_secs = 1800
max_retries = 3
retry_delay_ms = 100

[tiers.beginner]
threshold = 0
max_hearts = 3

[tiers.intermediate]
threshold = 50
max_hearts = 4

[tiers.advanced]
threshold = 150
max_hearts = 5

[tiers.expert]
threshold = 300
max_hearts = 5

[runner]
timeout_secs = 30
"#
    .to_string()
}
