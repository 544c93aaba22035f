//! Core data model types for questpath.
//!
//! Curriculum nodes, difficulty tiers, question specs and submitted answers.
//! Everything here is immutable once loaded from a curriculum file.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordered difficulty bucket gating XP-based unlocks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 4] = [
        Tier::Beginner,
        Tier::Intermediate,
        Tier::Advanced,
        Tier::Expert,
    ];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Beginner => write!(f, "beginner"),
            Tier::Intermediate => write!(f, "intermediate"),
            Tier::Advanced => write!(f, "advanced"),
            Tier::Expert => write!(f, "expert"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Tier::Beginner),
            "intermediate" => Ok(Tier::Intermediate),
            "advanced" => Ok(Tier::Advanced),
            "expert" => Ok(Tier::Expert),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Whether a node is a regular lesson or a milestone checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Normal,
    Milestone,
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(NodeKind::Normal),
            "milestone" => Ok(NodeKind::Milestone),
            other => Err(format!("unknown node kind: {other}")),
        }
    }
}

/// One teachable unit in a subject's curriculum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningNode {
    /// Identifier, unique within the subject.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Difficulty tier; its threshold gates the unlock.
    pub tier: Tier,
    /// Nodes that lead into this one.
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
    #[serde(default)]
    pub kind: NodeKind,
    /// Grouping heading used by the catalogue (e.g. "Sorting algorithms").
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl LearningNode {
    /// A root node has no prerequisites.
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

/// Languages a code-completion question can be graded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Rust => write!(f, "rust"),
            Language::Python => write!(f, "python"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rust" | "rs" => Ok(Language::Rust),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// A (left, right) pair in a matching question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

impl MatchPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// A single executable check for a code-completion answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeTestCase {
    /// Short identifier, unique within the question.
    pub name: String,
    /// Statement(s) run against the submitted code; a panic or raised
    /// exception fails the case.
    pub body: String,
}

/// The answer key for one question, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice {
        options: Vec<String>,
        correct: String,
    },
    MultipleChoice {
        options: Vec<String>,
        correct: BTreeSet<String>,
    },
    Numeric {
        value: f64,
    },
    MatchingPairs {
        pairs: BTreeSet<MatchPair>,
    },
    CodeCompletion {
        language: Language,
        #[serde(default)]
        template: String,
        tests: Vec<CodeTestCase>,
    },
}

impl QuestionKind {
    /// Stable name of the kind, matching the curriculum `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::Numeric { .. } => "numeric",
            QuestionKind::MatchingPairs { .. } => "matching_pairs",
            QuestionKind::CodeCompletion { .. } => "code_completion",
        }
    }
}

/// A question from the static question bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub prompt: String,
    /// Shown to the learner after answering.
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// A learner's submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Answer {
    Choice(String),
    Choices(Vec<String>),
    Number(f64),
    Pairs(Vec<MatchPair>),
    Code(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering() {
        assert!(Tier::Beginner < Tier::Intermediate);
        assert!(Tier::Intermediate < Tier::Advanced);
        assert!(Tier::Advanced < Tier::Expert);
        assert_eq!(Tier::ALL.iter().max(), Some(&Tier::Expert));
    }

    #[test]
    fn tier_display_and_parse() {
        assert_eq!(Tier::Advanced.to_string(), "advanced");
        assert_eq!("Expert".parse::<Tier>().unwrap(), Tier::Expert);
        assert!("grandmaster".parse::<Tier>().is_err());
    }

    #[test]
    fn language_parse() {
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("RUST".parse::<Language>().unwrap(), Language::Rust);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn question_spec_json_shape() {
        let spec = QuestionSpec {
            id: "q1".into(),
            prompt: "2 + 2?".into(),
            explanation: None,
            kind: QuestionKind::Numeric { value: 4.0 },
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "numeric");
        assert_eq!(json["value"], 4.0);
    }

    #[test]
    fn answer_json_shape() {
        let answer: Answer =
            serde_json::from_str(r#"{"type":"choices","value":["a","b"]}"#).unwrap();
        assert_eq!(answer, Answer::Choices(vec!["a".into(), "b".into()]));
    }
}
