//! Per-user, per-subject progress records and the store that mutates them.
//!
//! Every mutation is a read-modify-write against a [`ProgressBackend`],
//! serialized per `(user, subject)` key with an async mutex. Different keys
//! proceed in parallel. Transient backend failures re-run the whole cycle
//! with exponential backoff; nothing is dropped silently.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::curriculum::Curriculum;
use crate::error::{EngineError, EngineResult};
use crate::model::Tier;
use crate::traits::ProgressBackend;

/// Unlock threshold and heart budget for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    /// Experience required before nodes of this tier unlock.
    pub threshold: u64,
    /// Heart budget while the learner is in this tier.
    pub max_hearts: u32,
}

/// Tier thresholds and heart budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRules {
    #[serde(default = "default_beginner")]
    pub beginner: TierRule,
    #[serde(default = "default_intermediate")]
    pub intermediate: TierRule,
    #[serde(default = "default_advanced")]
    pub advanced: TierRule,
    #[serde(default = "default_expert")]
    pub expert: TierRule,
}

fn default_beginner() -> TierRule {
    TierRule {
        threshold: 0,
        max_hearts: 3,
    }
}
fn default_intermediate() -> TierRule {
    TierRule {
        threshold: 50,
        max_hearts: 4,
    }
}
fn default_advanced() -> TierRule {
    TierRule {
        threshold: 150,
        max_hearts: 5,
    }
}
fn default_expert() -> TierRule {
    TierRule {
        threshold: 300,
        max_hearts: 5,
    }
}

impl Default for ProgressRules {
    fn default() -> Self {
        Self {
            beginner: default_beginner(),
            intermediate: default_intermediate(),
            advanced: default_advanced(),
            expert: default_expert(),
        }
    }
}

impl ProgressRules {
    pub fn rule(&self, tier: Tier) -> &TierRule {
        match tier {
            Tier::Beginner => &self.beginner,
            Tier::Intermediate => &self.intermediate,
            Tier::Advanced => &self.advanced,
            Tier::Expert => &self.expert,
        }
    }

    pub fn threshold(&self, tier: Tier) -> u64 {
        self.rule(tier).threshold
    }

    pub fn max_hearts(&self, tier: Tier) -> u32 {
        self.rule(tier).max_hearts
    }

    /// Highest tier whose threshold is covered by `experience`.
    pub fn tier_for_experience(&self, experience: u64) -> Tier {
        Tier::ALL
            .iter()
            .copied()
            .filter(|t| self.threshold(*t) <= experience)
            .max()
            .unwrap_or(Tier::Beginner)
    }
}

/// Mastery state for one (user, subject) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Lifetime experience. Never decreases.
    pub experience: u64,
    /// Highest tier reached. Never regresses.
    pub tier: Tier,
    pub completed: BTreeSet<String>,
    pub hearts: u32,
    pub achievements: BTreeSet<String>,
    /// Whether the placement test was taken.
    #[serde(default)]
    pub calibrated: bool,
    #[serde(default)]
    pub sessions_passed: u32,
    #[serde(default)]
    pub sessions_failed: u32,
    /// Day of the last finished session (UTC).
    #[serde(default)]
    pub last_active: Option<NaiveDate>,
    /// Consecutive days with at least one finished session.
    #[serde(default)]
    pub streak_days: u32,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// A zero-initialized record with a full beginner heart budget.
    pub fn new(rules: &ProgressRules) -> Self {
        Self {
            experience: 0,
            tier: Tier::Beginner,
            completed: BTreeSet::new(),
            hearts: rules.max_hearts(Tier::Beginner),
            achievements: BTreeSet::new(),
            calibrated: false,
            sessions_passed: 0,
            sessions_failed: 0,
            last_active: None,
            streak_days: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed.contains(node_id)
    }

    /// Add experience and advance the tier if a new threshold was crossed.
    ///
    /// Returns the new tier when it changed. Crossing into a new tier refills
    /// hearts to that tier's budget.
    pub fn add_experience(&mut self, delta: u64, rules: &ProgressRules) -> Option<Tier> {
        self.experience = self.experience.saturating_add(delta);
        let reached = rules.tier_for_experience(self.experience);
        if reached > self.tier {
            self.tier = reached;
            self.hearts = rules.max_hearts(reached);
            Some(reached)
        } else {
            None
        }
    }

    /// Note activity on `today`, extending the streak if the previous active
    /// day was yesterday and restarting it after a gap.
    pub fn record_activity(&mut self, today: NaiveDate) {
        self.streak_days = match self.last_active {
            Some(last) if last == today => self.streak_days.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.streak_days.saturating_add(1),
            // Clock moved backwards; keep the streak as is.
            Some(last) if last > today => return,
            _ => 1,
        };
        self.last_active = Some(today);
    }

    /// Apply the one-time placement result: set the calibration flag and
    /// raise experience to at least the placed tier's threshold.
    pub fn calibrate(&mut self, placed: Tier, rules: &ProgressRules) -> EngineResult<()> {
        if self.calibrated {
            return Err(EngineError::InvalidTransition {
                action: "take placement test",
                state: "already calibrated".into(),
            });
        }
        self.calibrated = true;
        let delta = rules.threshold(placed).saturating_sub(self.experience);
        self.add_experience(delta, rules);
        Ok(())
    }
}

/// Backoff settings for transient persistence failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            delay: policy.base_delay,
        }
    }

    /// Sleep and return `true` if `err` is transient and retries remain.
    async fn retry(&mut self, err: &EngineError, user: &str, subject: &str) -> bool {
        let EngineError::Persistence(p) = err else {
            return false;
        };
        if !p.is_transient() || self.attempt >= self.policy.max_retries {
            return false;
        }
        self.attempt += 1;
        tracing::warn!(
            "progress write for {user}/{subject} failed ({p}), retry {} of {}",
            self.attempt,
            self.policy.max_retries
        );
        tokio::time::sleep(self.delay).await;
        self.delay = (self.delay * 2).min(MAX_RETRY_DELAY);
        true
    }
}

type ProgressKey = (String, String);

/// Serialized access to progress records.
pub struct ProgressStore {
    backend: Arc<dyn ProgressBackend>,
    curriculum: Arc<Curriculum>,
    rules: ProgressRules,
    retry: RetryPolicy,
    locks: DashMap<ProgressKey, Arc<Mutex<()>>>,
}

impl ProgressStore {
    pub fn new(
        backend: Arc<dyn ProgressBackend>,
        curriculum: Arc<Curriculum>,
        rules: ProgressRules,
    ) -> Self {
        Self {
            backend,
            curriculum,
            rules,
            retry: RetryPolicy::default(),
            locks: DashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn rules(&self) -> &ProgressRules {
        &self.rules
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn lock_for(&self, user: &str, subject: &str) -> Arc<Mutex<()>> {
        let key = (user.to_string(), subject.to_string());
        Arc::clone(self.locks.entry(key).or_default().value())
    }

    /// Get the record for a pair, creating and persisting a fresh one on
    /// first access.
    pub async fn get(&self, user: &str, subject: &str) -> EngineResult<ProgressRecord> {
        self.curriculum.subject(subject)?;
        let lock = self.lock_for(user, subject);
        let _guard = lock.lock().await;

        let mut backoff = Backoff::new(self.retry);
        loop {
            match self.try_get(user, subject).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    if !backoff.retry(&e, user, subject).await {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn try_get(&self, user: &str, subject: &str) -> EngineResult<ProgressRecord> {
        if let Some(record) = self.backend.load_progress(user, subject).await? {
            return Ok(record);
        }
        let record = ProgressRecord::new(&self.rules);
        self.backend.save_progress(user, subject, &record).await?;
        tracing::debug!("created progress record for {user}/{subject}");
        Ok(record)
    }

    /// Run `mutate` as one atomic read-modify-write on the pair's record.
    ///
    /// `mutate` may run more than once if the backend fails transiently; each
    /// run sees a freshly loaded record. An `Err` from `mutate` aborts without
    /// writing.
    pub async fn update<F>(
        &self,
        user: &str,
        subject: &str,
        mut mutate: F,
    ) -> EngineResult<ProgressRecord>
    where
        F: FnMut(&mut ProgressRecord, &ProgressRules) -> EngineResult<()>,
    {
        self.curriculum.subject(subject)?;
        let lock = self.lock_for(user, subject);
        let _guard = lock.lock().await;

        let mut backoff = Backoff::new(self.retry);
        loop {
            match self.try_update(user, subject, &mut mutate).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    if !backoff.retry(&e, user, subject).await {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn try_update<F>(
        &self,
        user: &str,
        subject: &str,
        mutate: &mut F,
    ) -> EngineResult<ProgressRecord>
    where
        F: FnMut(&mut ProgressRecord, &ProgressRules) -> EngineResult<()>,
    {
        let mut record = self
            .backend
            .load_progress(user, subject)
            .await?
            .unwrap_or_else(|| ProgressRecord::new(&self.rules));
        mutate(&mut record, &self.rules)?;
        record.updated_at = Utc::now();
        self.backend.save_progress(user, subject, &record).await?;
        Ok(record)
    }

    /// Add experience, then recompute the tier. The tier never regresses.
    pub async fn apply_experience(
        &self,
        user: &str,
        subject: &str,
        delta: u64,
    ) -> EngineResult<ProgressRecord> {
        let record = self
            .update(user, subject, |record, rules| {
                if let Some(tier) = record.add_experience(delta, rules) {
                    tracing::info!("{user} reached tier {tier} in {subject}");
                }
                Ok(())
            })
            .await?;
        tracing::debug!(
            "{user}/{subject}: +{delta} xp, total {}",
            record.experience
        );
        Ok(record)
    }

    /// Add a node to the completed set. No-op if already present.
    pub async fn mark_completed(
        &self,
        user: &str,
        subject: &str,
        node_id: &str,
    ) -> EngineResult<ProgressRecord> {
        self.curriculum.node(subject, node_id)?;
        self.update(user, subject, |record, _| {
            record.completed.insert(node_id.to_string());
            Ok(())
        })
        .await
    }

    /// Set the heart count, which must lie within the current tier's budget.
    pub async fn set_hearts(
        &self,
        user: &str,
        subject: &str,
        value: u32,
    ) -> EngineResult<ProgressRecord> {
        self.update(user, subject, |record, rules| {
            let max = rules.max_hearts(record.tier);
            if value > max {
                return Err(EngineError::InvalidHeartCount { value, max });
            }
            record.hearts = value;
            Ok(())
        })
        .await
    }

    /// Add an achievement. No-op if already earned.
    pub async fn record_achievement(
        &self,
        user: &str,
        subject: &str,
        achievement_id: &str,
    ) -> EngineResult<ProgressRecord> {
        self.update(user, subject, |record, _| {
            record.achievements.insert(achievement_id.to_string());
            Ok(())
        })
        .await
    }

    /// Record the placement test: sets the calibration flag and raises
    /// experience to at least the placed tier's threshold.
    pub async fn calibrate(
        &self,
        user: &str,
        subject: &str,
        placed: Tier,
    ) -> EngineResult<ProgressRecord> {
        self.update(user, subject, |record, rules| record.calibrate(placed, rules))
            .await
    }

    /// Subjects the user has a record for.
    pub async fn subjects_for(&self, user: &str) -> EngineResult<Vec<String>> {
        Ok(self.backend.subjects_for(user).await?)
    }
}
