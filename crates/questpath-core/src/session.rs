//! Quiz session state machine.
//!
//! ```text
//!            submit_answer              advance
//! InProgress ─────────────> AwaitingNext ───────> InProgress   (more questions, hearts left)
//!                                        ───────> Passed       (last question, ratio >= threshold)
//!                                        ───────> Failed       (hearts == 0, or ratio below threshold)
//! ```
//!
//! The session only tracks its own counters. Committing experience and
//! completion to the progress store is the caller's job.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::grading::{grade_answer, Verdict};
use crate::model::{Answer, Language, NodeKind, QuestionKind, QuestionSpec, Tier};
use crate::traits::{CodeGrader, GradeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    AwaitingNext,
    Passed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Passed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::InProgress => write!(f, "in progress"),
            SessionState::AwaitingNext => write!(f, "awaiting next"),
            SessionState::Passed => write!(f, "passed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Scoring knobs copied into each session.
#[derive(Debug, Clone, Copy)]
pub struct SessionRules {
    /// Minimum `correct / total` ratio to pass.
    pub pass_threshold: f64,
    /// Experience granted per correct answer, at submit time.
    pub xp_per_correct: u64,
    /// Timeout for code-completion grading.
    pub grade_timeout_secs: u64,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            pass_threshold: 0.70,
            xp_per_correct: 10,
            grade_timeout_secs: 30,
        }
    }
}

/// Which node a session is practicing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTarget {
    pub user: String,
    pub subject: String,
    pub node_id: String,
    pub node_kind: NodeKind,
    pub node_tier: Tier,
}

/// Feedback for one submitted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// Experience earned by this answer (already counted in the session).
    pub xp_awarded: u64,
    pub hearts_remaining: u32,
    pub explanation: Option<String>,
    /// Per-case results for code answers.
    pub report: Option<GradeReport>,
}

/// Summary of a finished session, consumed by the commit step and the
/// achievement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub target: SessionTarget,
    pub passed: bool,
    pub question_count: usize,
    pub correct_count: usize,
    pub hearts_at_start: u32,
    pub hearts_remaining: u32,
    pub xp_earned: u64,
}

impl SessionOutcome {
    pub fn hearts_lost(&self) -> u32 {
        self.hearts_at_start.saturating_sub(self.hearts_remaining)
    }

    pub fn is_perfect(&self) -> bool {
        self.question_count > 0 && self.correct_count == self.question_count
    }
}

/// Learner-facing view of a question with the answer key removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub kind: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Left-hand items of a matching question.
    #[serde(default)]
    pub left: Vec<String>,
    /// Right-hand items of a matching question, in sorted order.
    #[serde(default)]
    pub right: Vec<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl QuestionView {
    pub fn from_spec(spec: &QuestionSpec) -> Self {
        let mut view = QuestionView {
            id: spec.id.clone(),
            prompt: spec.prompt.clone(),
            kind: spec.kind.name().to_string(),
            options: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            template: None,
            language: None,
        };
        match &spec.kind {
            QuestionKind::SingleChoice { options, .. }
            | QuestionKind::MultipleChoice { options, .. } => view.options = options.clone(),
            QuestionKind::Numeric { .. } => {}
            QuestionKind::MatchingPairs { pairs } => {
                view.left = pairs.iter().map(|p| p.left.clone()).collect();
                let mut right: Vec<String> = pairs.iter().map(|p| p.right.clone()).collect();
                right.sort();
                view.right = right;
            }
            QuestionKind::CodeCompletion {
                language, template, ..
            } => {
                view.template = Some(template.clone());
                view.language = Some(*language);
            }
        }
        view
    }
}

/// One attempt at a node's question set.
#[derive(Debug, Clone)]
pub struct QuizSession {
    id: Uuid,
    target: SessionTarget,
    questions: Vec<QuestionSpec>,
    position: usize,
    correct_count: usize,
    hearts_at_start: u32,
    hearts_remaining: u32,
    xp_earned: u64,
    state: SessionState,
    rules: SessionRules,
    started_at: DateTime<Utc>,
}

impl QuizSession {
    /// Start a session over an already sampled question sequence.
    pub fn new(
        target: SessionTarget,
        questions: Vec<QuestionSpec>,
        hearts: u32,
        rules: SessionRules,
    ) -> EngineResult<Self> {
        if questions.is_empty() {
            return Err(EngineError::EmptyQuestionBank {
                subject: target.subject,
                node: target.node_id,
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            target,
            questions,
            position: 0,
            correct_count: 0,
            hearts_at_start: hearts,
            hearts_remaining: hearts,
            xp_earned: 0,
            state: SessionState::InProgress,
            rules,
            started_at: Utc::now(),
        })
    }

    /// Draw up to `count` distinct questions from a bank in random order.
    pub fn sample_questions<R: Rng + ?Sized>(
        bank: &[QuestionSpec],
        count: usize,
        rng: &mut R,
    ) -> Vec<QuestionSpec> {
        let mut picked: Vec<QuestionSpec> = bank
            .choose_multiple(rng, count.min(bank.len()))
            .cloned()
            .collect();
        picked.shuffle(rng);
        picked
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn hearts_remaining(&self) -> u32 {
        self.hearts_remaining
    }

    pub fn xp_earned(&self) -> u64 {
        self.xp_earned
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The question being answered, or just answered while awaiting
    /// `advance`. `None` once the session is over.
    pub fn current_question(&self) -> Option<&QuestionSpec> {
        if self.state.is_terminal() {
            return None;
        }
        self.questions.get(self.position)
    }

    /// Grade `answer` against the current question and record the verdict.
    pub async fn submit_answer(
        &mut self,
        answer: &Answer,
        grader: &dyn CodeGrader,
    ) -> EngineResult<AnswerOutcome> {
        self.expect_state(SessionState::InProgress, "submit an answer")?;
        let question = &self.questions[self.position];
        let verdict = grade_answer(
            &question.kind,
            answer,
            grader,
            self.rules.grade_timeout_secs,
        )
        .await?;
        self.apply_verdict(verdict)
    }

    /// Record a verdict for the current question and move to `AwaitingNext`.
    ///
    /// A correct answer adds the per-question reward; a wrong one costs a
    /// heart (never below zero).
    pub fn apply_verdict(&mut self, verdict: Verdict) -> EngineResult<AnswerOutcome> {
        self.expect_state(SessionState::InProgress, "submit an answer")?;

        let xp_awarded = if verdict.correct {
            self.correct_count += 1;
            self.xp_earned += self.rules.xp_per_correct;
            self.rules.xp_per_correct
        } else {
            self.hearts_remaining = self.hearts_remaining.saturating_sub(1);
            0
        };
        self.state = SessionState::AwaitingNext;

        if self.hearts_remaining == 0 {
            tracing::debug!("session {} ran out of hearts", self.id);
        }

        Ok(AnswerOutcome {
            correct: verdict.correct,
            xp_awarded,
            hearts_remaining: self.hearts_remaining,
            explanation: self.questions[self.position].explanation.clone(),
            report: verdict.report,
        })
    }

    /// Leave the feedback screen: fail on zero hearts, finish after the last
    /// question, otherwise move on to the next one.
    pub fn advance(&mut self) -> EngineResult<SessionState> {
        self.expect_state(SessionState::AwaitingNext, "continue")?;

        if self.hearts_remaining == 0 {
            self.state = SessionState::Failed;
            return Ok(self.state);
        }

        self.position += 1;
        self.state = if self.position == self.questions.len() {
            let ratio = self.correct_count as f64 / self.questions.len() as f64;
            if ratio >= self.rules.pass_threshold {
                SessionState::Passed
            } else {
                SessionState::Failed
            }
        } else {
            SessionState::InProgress
        };
        Ok(self.state)
    }

    /// Summary for a finished session; `None` while still running.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        if !self.state.is_terminal() {
            return None;
        }
        Some(SessionOutcome {
            target: self.target.clone(),
            passed: self.state == SessionState::Passed,
            question_count: self.questions.len(),
            correct_count: self.correct_count,
            hearts_at_start: self.hearts_at_start,
            hearts_remaining: self.hearts_remaining,
            xp_earned: self.xp_earned,
        })
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> EngineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                action,
                state: self.state.to_string(),
            })
        }
    }
}
