//! Achievement rules and their evaluation.
//!
//! Rules are independent predicates over a progress snapshot and, optionally,
//! the session that just finished. Evaluation is side-effect free; the caller
//! persists whatever ids come back.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{NodeKind, Tier};
use crate::progress::ProgressRecord;
use crate::session::SessionOutcome;

/// Condition under which an achievement is earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Trigger {
    ExperienceAtLeast { xp: u64 },
    CompletedAtLeast { count: usize },
    TierReached { tier: Tier },
    /// Passed a session without losing a heart.
    FlawlessSession,
    /// Passed a session answering every question correctly.
    PerfectSession,
    /// Passed a milestone node.
    MilestoneCompleted,
    /// Every node of the subject is completed.
    SubjectMastered,
    /// Placement test taken.
    Calibrated,
    /// Finished sessions on this many consecutive days.
    StreakAtLeast { days: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRule {
    pub id: String,
    pub description: String,
    #[serde(flatten)]
    pub trigger: Trigger,
}

impl AchievementRule {
    pub fn new(id: &str, description: &str, trigger: Trigger) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            trigger,
        }
    }

    pub fn is_met(&self, ctx: &AchievementContext<'_>) -> bool {
        let passed = ctx.outcome.filter(|o| o.passed);
        match &self.trigger {
            Trigger::ExperienceAtLeast { xp } => ctx.progress.experience >= *xp,
            Trigger::CompletedAtLeast { count } => ctx.progress.completed.len() >= *count,
            Trigger::TierReached { tier } => ctx.progress.tier >= *tier,
            Trigger::FlawlessSession => passed.is_some_and(|o| o.hearts_lost() == 0),
            Trigger::PerfectSession => passed.is_some_and(|o| o.is_perfect()),
            Trigger::MilestoneCompleted => {
                passed.is_some_and(|o| o.target.node_kind == NodeKind::Milestone)
            }
            Trigger::SubjectMastered => {
                ctx.total_nodes > 0 && ctx.progress.completed.len() >= ctx.total_nodes
            }
            Trigger::Calibrated => ctx.progress.calibrated,
            Trigger::StreakAtLeast { days } => ctx.progress.streak_days >= *days,
        }
    }
}

/// What the rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct AchievementContext<'a> {
    /// The record after the triggering change was committed.
    pub progress: &'a ProgressRecord,
    /// The session that just ended, if any.
    pub outcome: Option<&'a SessionOutcome>,
    /// Number of nodes in the subject.
    pub total_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct AchievementEngine {
    rules: Vec<AchievementRule>,
}

impl Default for AchievementEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl AchievementEngine {
    pub fn new(rules: Vec<AchievementRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AchievementRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&AchievementRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Ids of rules that are met and not yet in `progress.achievements`.
    pub fn evaluate(&self, ctx: &AchievementContext<'_>) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|r| !ctx.progress.achievements.contains(&r.id))
            .filter(|r| r.is_met(ctx))
            .map(|r| r.id.clone())
            .collect()
    }
}

pub fn default_rules() -> Vec<AchievementRule> {
    vec![
        AchievementRule::new(
            "first_steps",
            "Complete your first node",
            Trigger::CompletedAtLeast { count: 1 },
        ),
        AchievementRule::new(
            "five_nodes",
            "Complete five nodes",
            Trigger::CompletedAtLeast { count: 5 },
        ),
        AchievementRule::new(
            "xp_100",
            "Earn 100 experience",
            Trigger::ExperienceAtLeast { xp: 100 },
        ),
        AchievementRule::new(
            "xp_500",
            "Earn 500 experience",
            Trigger::ExperienceAtLeast { xp: 500 },
        ),
        AchievementRule::new(
            "flawless",
            "Pass a session without losing a heart",
            Trigger::FlawlessSession,
        ),
        AchievementRule::new(
            "perfect_score",
            "Answer every question of a session correctly",
            Trigger::PerfectSession,
        ),
        AchievementRule::new(
            "milestone",
            "Pass a milestone node",
            Trigger::MilestoneCompleted,
        ),
        AchievementRule::new(
            "tier_intermediate",
            "Reach the intermediate tier",
            Trigger::TierReached {
                tier: Tier::Intermediate,
            },
        ),
        AchievementRule::new(
            "tier_advanced",
            "Reach the advanced tier",
            Trigger::TierReached {
                tier: Tier::Advanced,
            },
        ),
        AchievementRule::new(
            "tier_expert",
            "Reach the expert tier",
            Trigger::TierReached { tier: Tier::Expert },
        ),
        AchievementRule::new(
            "subject_mastered",
            "Complete every node of a subject",
            Trigger::SubjectMastered,
        ),
        AchievementRule::new("calibrated", "Take the placement test", Trigger::Calibrated),
        AchievementRule::new(
            "streak_master",
            "Practice five days in a row",
            Trigger::StreakAtLeast { days: 5 },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressRules;
    use crate::session::tests::target;

    fn outcome(passed: bool, correct: usize, hearts_left: u32) -> SessionOutcome {
        SessionOutcome {
            target: target(),
            passed,
            question_count: 5,
            correct_count: correct,
            hearts_at_start: 3,
            hearts_remaining: hearts_left,
            xp_earned: correct as u64 * 10,
        }
    }

    fn eval(progress: &ProgressRecord, outcome: Option<&SessionOutcome>) -> BTreeSet<String> {
        AchievementEngine::default().evaluate(&AchievementContext {
            progress,
            outcome,
            total_nodes: 3,
        })
    }

    #[test]
    fn fresh_record_earns_nothing() {
        let record = ProgressRecord::new(&ProgressRules::default());
        assert!(eval(&record, None).is_empty());
    }

    #[test]
    fn perfect_first_pass() {
        let mut record = ProgressRecord::new(&ProgressRules::default());
        record.completed.insert("n1".into());
        record.experience = 70;
        record.tier = Tier::Intermediate;
        let o = outcome(true, 5, 3);
        let earned = eval(&record, Some(&o));
        let expected: BTreeSet<String> = [
            "first_steps",
            "flawless",
            "perfect_score",
            "tier_intermediate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(earned, expected);
    }

    #[test]
    fn failed_session_earns_no_session_awards() {
        let record = ProgressRecord::new(&ProgressRules::default());
        let o = outcome(false, 0, 3);
        assert!(eval(&record, Some(&o)).is_empty());
    }

    #[test]
    fn heart_loss_blocks_flawless_only() {
        let mut record = ProgressRecord::new(&ProgressRules::default());
        record.completed.insert("n1".into());
        let o = outcome(true, 4, 2);
        let earned = eval(&record, Some(&o));
        assert!(earned.contains("first_steps"));
        assert!(!earned.contains("flawless"));
        assert!(!earned.contains("perfect_score"));
    }

    #[test]
    fn milestone_and_mastery() {
        let mut record = ProgressRecord::new(&ProgressRules::default());
        record.completed = ["n1", "n2", "n3"].iter().map(|s| s.to_string()).collect();
        let mut o = outcome(true, 4, 2);
        o.target.node_kind = NodeKind::Milestone;
        let earned = eval(&record, Some(&o));
        assert!(earned.contains("milestone"));
        assert!(earned.contains("subject_mastered"));
    }

    #[test]
    fn never_returns_already_earned() {
        let mut record = ProgressRecord::new(&ProgressRules::default());
        record.completed.insert("n1".into());
        record.experience = 600;
        record.tier = Tier::Expert;
        record.calibrated = true;
        let o = outcome(true, 5, 3);
        let first = eval(&record, Some(&o));
        assert!(!first.is_empty());

        record.achievements.extend(first.iter().cloned());
        let second = eval(&record, Some(&o));
        assert!(second.is_empty());
        assert!(second.is_disjoint(&record.achievements));
    }

    #[test]
    fn streak_master_needs_five_days() {
        let mut record = ProgressRecord::new(&ProgressRules::default());
        record.streak_days = 4;
        assert!(!eval(&record, None).contains("streak_master"));
        record.streak_days = 5;
        assert!(eval(&record, None).contains("streak_master"));
    }

    #[test]
    fn empty_subject_is_never_mastered() {
        let record = ProgressRecord::new(&ProgressRules::default());
        let earned = AchievementEngine::default().evaluate(&AchievementContext {
            progress: &record,
            outcome: None,
            total_nodes: 0,
        });
        assert!(!earned.contains("subject_mastered"));
    }

    #[test]
    fn rules_deserialize_from_toml() {
        let src = r#"
            id = "xp_50"
            description = "Fifty"
            when = "experience_at_least"
            xp = 50
        "#;
        let rule: AchievementRule = toml::from_str(src).unwrap();
        assert_eq!(rule.trigger, Trigger::ExperienceAtLeast { xp: 50 });

        let src = r#"
            id = "week"
            description = "Seven"
            when = "streak_at_least"
            days = 7
        "#;
        let rule: AchievementRule = toml::from_str(src).unwrap();
        assert_eq!(rule.trigger, Trigger::StreakAtLeast { days: 7 });
    }
}
