//! Central learning engine orchestrator.
//!
//! Ties the curriculum, progress store, quiz sessions and achievement rules
//! together behind request/response style operations. Live sessions are kept
//! in memory, each behind its own lock, and expire after a period of
//! inactivity.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::achievements::{AchievementContext, AchievementEngine};
use crate::curriculum::Curriculum;
use crate::error::{EngineError, EngineResult};
use crate::model::{Answer, LearningNode, Tier};
use crate::progress::{ProgressRecord, ProgressRules, ProgressStore, RetryPolicy};
use crate::session::{
    AnswerOutcome, QuestionView, QuizSession, SessionOutcome, SessionRules, SessionState,
    SessionTarget,
};
use crate::traits::{CodeGrader, ProgressBackend};
use crate::unlock::node_unlocked;

/// Configuration for the learning engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Questions drawn per session (fewer if the bank is smaller).
    pub questions_per_session: usize,
    pub pass_threshold: f64,
    pub xp_per_correct: u64,
    /// Experience bonus for passing a session.
    pub completion_bonus: u64,
    /// Sessions idle longer than this are dropped.
    pub session_idle: Duration,
    pub grade_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub rules: ProgressRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            questions_per_session: 5,
            pass_threshold: 0.70,
            xp_per_correct: 10,
            completion_bonus: 20,
            session_idle: Duration::from_secs(1800),
            grade_timeout_secs: 30,
            retry: RetryPolicy::default(),
            rules: ProgressRules::default(),
        }
    }
}

impl EngineConfig {
    fn session_rules(&self) -> SessionRules {
        SessionRules {
            pass_threshold: self.pass_threshold,
            xp_per_correct: self.xp_per_correct,
            grade_timeout_secs: self.grade_timeout_secs,
        }
    }
}

/// A node as shown to one learner.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub node: LearningNode,
    pub unlocked: bool,
    pub completed: bool,
    pub question_count: usize,
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user: String,
    pub subject: String,
    pub node_id: String,
    pub state: SessionState,
    /// Zero-based index of the current question.
    pub position: usize,
    pub total: usize,
    pub correct_count: usize,
    pub hearts: u32,
    pub xp_earned: u64,
    pub question: Option<QuestionView>,
}

impl SessionSnapshot {
    fn of(session: &QuizSession) -> Self {
        let target = session.target();
        Self {
            id: session.id(),
            user: target.user.clone(),
            subject: target.subject.clone(),
            node_id: target.node_id.clone(),
            state: session.state(),
            position: session.position(),
            total: session.len(),
            correct_count: session.correct_count(),
            hearts: session.hearts_remaining(),
            xp_earned: session.xp_earned(),
            question: session.current_question().map(QuestionView::from_spec),
        }
    }
}

/// Result of one answer submission.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerFeedback {
    #[serde(flatten)]
    pub outcome: AnswerOutcome,
    /// Lifetime experience after this answer was credited.
    pub experience: u64,
}

/// What was committed when a session finished.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub new_achievements: BTreeSet<String>,
    pub progress: ProgressRecord,
}

/// Result of `continue_session`.
#[derive(Debug, Clone, Serialize)]
pub struct ContinueOutcome {
    pub state: SessionState,
    /// The next question, when the session goes on.
    pub next: Option<QuestionView>,
    /// Present once the session has finished and been committed.
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacementResult {
    pub progress: ProgressRecord,
    pub new_achievements: BTreeSet<String>,
}

struct LiveSession {
    session: QuizSession,
    last_activity: Instant,
    committed: bool,
}

/// The learning-progression engine.
pub struct LearningEngine {
    curriculum: Arc<Curriculum>,
    store: ProgressStore,
    grader: Arc<dyn CodeGrader>,
    achievements: AchievementEngine,
    config: EngineConfig,
    sessions: DashMap<Uuid, Arc<Mutex<LiveSession>>>,
}

impl LearningEngine {
    pub fn new(
        curriculum: Arc<Curriculum>,
        backend: Arc<dyn ProgressBackend>,
        grader: Arc<dyn CodeGrader>,
        config: EngineConfig,
    ) -> Self {
        let store = ProgressStore::new(backend, Arc::clone(&curriculum), config.rules.clone())
            .with_retry(config.retry);
        Self {
            curriculum,
            store,
            grader,
            achievements: AchievementEngine::default(),
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn with_achievements(mut self, achievements: AchievementEngine) -> Self {
        self.achievements = achievements;
        self
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn achievements(&self) -> &AchievementEngine {
        &self.achievements
    }

    /// Progress for a pair, created on first access.
    pub async fn progress(&self, user: &str, subject: &str) -> EngineResult<ProgressRecord> {
        self.store.get(user, subject).await
    }

    pub async fn is_unlocked(
        &self,
        user: &str,
        subject: &str,
        node_id: &str,
    ) -> EngineResult<bool> {
        let node = self.curriculum.node(subject, node_id)?;
        let record = self.store.get(user, subject).await?;
        Ok(node_unlocked(node, self.store.rules(), &record))
    }

    /// Every node of a subject with its lock and completion state.
    pub async fn list_nodes(&self, user: &str, subject: &str) -> EngineResult<Vec<NodeView>> {
        let graph = self.curriculum.subject(subject)?;
        let record = self.store.get(user, subject).await?;
        let rules = self.store.rules();
        graph
            .nodes()
            .iter()
            .map(|node| {
                Ok(NodeView {
                    unlocked: node_unlocked(node, rules, &record),
                    completed: record.is_completed(&node.id),
                    question_count: graph.questions(&node.id)?.len(),
                    node: node.clone(),
                })
            })
            .collect()
    }

    /// Start practice on an unlocked node.
    ///
    /// Hearts are copied from the record; an empty heart budget is refilled
    /// to the tier maximum first.
    pub async fn start_session(
        &self,
        user: &str,
        subject: &str,
        node_id: &str,
    ) -> EngineResult<SessionSnapshot> {
        let node = self.curriculum.node(subject, node_id)?;
        let bank = self.curriculum.questions(subject, node_id)?;

        let record = self.store.get(user, subject).await?;
        if !node_unlocked(node, self.store.rules(), &record) {
            return Err(EngineError::NodeLocked {
                subject: subject.to_string(),
                node: node_id.to_string(),
            });
        }
        if bank.is_empty() {
            return Err(EngineError::EmptyQuestionBank {
                subject: subject.to_string(),
                node: node_id.to_string(),
            });
        }

        let record = if record.hearts == 0 {
            let refilled = self
                .store
                .update(user, subject, |r, rules| {
                    if r.hearts == 0 {
                        r.hearts = rules.max_hearts(r.tier);
                    }
                    Ok(())
                })
                .await?;
            tracing::debug!("refilled hearts for {user}/{subject} to {}", refilled.hearts);
            refilled
        } else {
            record
        };
        let hearts = record
            .hearts
            .min(self.store.rules().max_hearts(record.tier));

        let questions = {
            let mut rng = rand::thread_rng();
            QuizSession::sample_questions(bank, self.config.questions_per_session, &mut rng)
        };
        let target = SessionTarget {
            user: user.to_string(),
            subject: subject.to_string(),
            node_id: node_id.to_string(),
            node_kind: node.kind,
            node_tier: node.tier,
        };
        let session = QuizSession::new(target, questions, hearts, self.config.session_rules())?;
        let snapshot = SessionSnapshot::of(&session);

        tracing::info!(
            "{user} started session {} on {subject}/{node_id} ({} questions, {hearts} hearts)",
            session.id(),
            session.len()
        );
        self.sessions.insert(
            session.id(),
            Arc::new(Mutex::new(LiveSession {
                session,
                last_activity: Instant::now(),
                committed: false,
            })),
        );
        Ok(snapshot)
    }

    /// Current state of a live session.
    pub async fn session(&self, id: Uuid) -> EngineResult<SessionSnapshot> {
        let entry = self.live(id)?;
        let live = entry.lock().await;
        self.check_idle(id, &live)?;
        Ok(SessionSnapshot::of(&live.session))
    }

    /// Grade an answer to the current question. A correct answer's
    /// experience is credited to the record immediately.
    ///
    /// The answer is graded against a copy of the session, which replaces the
    /// live one only after the record was written. When the write fails the
    /// question stays open and the same answer can be submitted again.
    pub async fn submit_answer(&self, id: Uuid, answer: &Answer) -> EngineResult<AnswerFeedback> {
        let entry = self.live(id)?;
        let mut live = entry.lock().await;
        self.check_idle(id, &live)?;

        let mut session = live.session.clone();
        let outcome = session.submit_answer(answer, self.grader.as_ref()).await?;

        let target = session.target().clone();
        let record = if outcome.xp_awarded > 0 {
            self.store
                .apply_experience(&target.user, &target.subject, outcome.xp_awarded)
                .await?
        } else {
            self.store.get(&target.user, &target.subject).await?
        };
        live.session = session;
        live.last_activity = Instant::now();

        Ok(AnswerFeedback {
            outcome,
            experience: record.experience,
        })
    }

    /// Move past the feedback for the last answer. When the session ends its
    /// outcome is committed and the session is dropped.
    ///
    /// If the commit fails the session stays registered in its terminal state
    /// and calling this again retries the commit.
    pub async fn continue_session(&self, id: Uuid) -> EngineResult<ContinueOutcome> {
        let entry = self.live(id)?;
        let mut live = entry.lock().await;
        self.check_idle(id, &live)?;

        let state = if live.session.state().is_terminal() {
            live.session.state()
        } else {
            live.session.advance()?
        };
        live.last_activity = Instant::now();

        if !state.is_terminal() {
            return Ok(ContinueOutcome {
                state,
                next: live.session.current_question().map(QuestionView::from_spec),
                summary: None,
            });
        }

        let Some(outcome) = live.session.outcome() else {
            return Err(EngineError::InvalidTransition {
                action: "commit",
                state: state.to_string(),
            });
        };
        let summary = self.commit(&outcome).await?;
        live.committed = true;
        drop(live);
        self.sessions.remove(&id);

        Ok(ContinueOutcome {
            state,
            next: None,
            summary: Some(summary),
        })
    }

    /// Drop a session without committing anything beyond the experience
    /// already credited per answer.
    pub fn abandon_session(&self, id: Uuid) -> EngineResult<()> {
        match self.sessions.remove(&id) {
            Some(_) => {
                tracing::info!("session {id} abandoned");
                Ok(())
            }
            None => Err(EngineError::SessionNotFound(id)),
        }
    }

    /// Drop every session idle longer than the configured limit. Returns the
    /// number removed.
    pub fn expire_idle_sessions(&self) -> usize {
        let idle = self.config.session_idle;
        let before = self.sessions.len();
        // Sessions locked by an in-flight request are active by definition.
        self.sessions.retain(|_, entry| match entry.try_lock() {
            Ok(live) => live.last_activity.elapsed() <= idle,
            Err(_) => true,
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!("expired {removed} idle session(s)");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Record the one-time placement test for a subject.
    pub async fn record_placement(
        &self,
        user: &str,
        subject: &str,
        placed: Tier,
    ) -> EngineResult<PlacementResult> {
        let total_nodes = self.curriculum.get_nodes(subject)?.len();
        let mut new_achievements = BTreeSet::new();
        let progress = self
            .store
            .update(user, subject, |record, rules| {
                record.calibrate(placed, rules)?;
                new_achievements = self.award(record, None, total_nodes);
                Ok(())
            })
            .await?;
        tracing::info!(
            "{user} placed at {placed} in {subject} ({} xp)",
            progress.experience
        );
        self.log_awards(user, subject, &new_achievements);
        Ok(PlacementResult {
            progress,
            new_achievements,
        })
    }

    /// Write the session result and any achievements it earns in a single
    /// update, so a failed write leaves nothing half applied.
    async fn commit(&self, outcome: &SessionOutcome) -> EngineResult<SessionSummary> {
        let t = &outcome.target;
        let bonus = self.config.completion_bonus;
        let total_nodes = self.curriculum.get_nodes(&t.subject)?.len();
        let today = Utc::now().date_naive();
        let mut new_achievements = BTreeSet::new();
        let progress = self
            .store
            .update(&t.user, &t.subject, |record, rules| {
                record.hearts = outcome.hearts_remaining.min(rules.max_hearts(record.tier));
                record.record_activity(today);
                if outcome.passed {
                    record.completed.insert(t.node_id.clone());
                    record.add_experience(bonus, rules);
                    record.sessions_passed += 1;
                    new_achievements = self.award(record, Some(outcome), total_nodes);
                } else {
                    record.sessions_failed += 1;
                    new_achievements.clear();
                }
                Ok(())
            })
            .await?;

        tracing::info!(
            "{} {} {}/{} ({}/{} correct, {} hearts left)",
            t.user,
            if outcome.passed { "passed" } else { "failed" },
            t.subject,
            t.node_id,
            outcome.correct_count,
            outcome.question_count,
            outcome.hearts_remaining
        );

        self.log_awards(&t.user, &t.subject, &new_achievements);
        Ok(SessionSummary {
            outcome: outcome.clone(),
            new_achievements,
            progress,
        })
    }

    /// Evaluate the rules against `record` and add what it newly earns.
    fn award(
        &self,
        record: &mut ProgressRecord,
        outcome: Option<&SessionOutcome>,
        total_nodes: usize,
    ) -> BTreeSet<String> {
        let earned = self.achievements.evaluate(&AchievementContext {
            progress: &*record,
            outcome,
            total_nodes,
        });
        record.achievements.extend(earned.iter().cloned());
        earned
    }

    fn log_awards(&self, user: &str, subject: &str, earned: &BTreeSet<String>) {
        for id in earned {
            tracing::info!("{user} earned achievement '{id}' in {subject}");
        }
    }

    fn live(&self, id: Uuid) -> EngineResult<Arc<Mutex<LiveSession>>> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::SessionNotFound(id))
    }

    fn check_idle(&self, id: Uuid, live: &LiveSession) -> EngineResult<()> {
        if live.last_activity.elapsed() > self.config.session_idle && !live.committed {
            self.sessions.remove(&id);
            tracing::debug!("session {id} expired on access");
            return Err(EngineError::SessionNotFound(id));
        }
        Ok(())
    }
}
