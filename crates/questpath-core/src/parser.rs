//! TOML curriculum parser.
//!
//! Loads one subject per file, or every `.toml` file under a directory, and
//! reports soft authoring problems through [`validate_curriculum`].

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::curriculum::{Curriculum, SubjectGraph, SubjectInfo};
use crate::model::{
    CodeTestCase, Language, LearningNode, MatchPair, NodeKind, QuestionKind, QuestionSpec, Tier,
};

/// Intermediate TOML structure for a subject file.
#[derive(Debug, Deserialize)]
struct TomlSubjectFile {
    subject: TomlSubjectHeader,
    #[serde(default)]
    nodes: Vec<TomlNode>,
}

#[derive(Debug, Deserialize)]
struct TomlSubjectHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlNode {
    id: String,
    name: String,
    #[serde(default = "default_tier_str")]
    tier: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prerequisites: Vec<String>,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

fn default_tier_str() -> String {
    "beginner".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    prompt: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct: Option<TomlCorrect>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    pairs: Vec<TomlPair>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    template: String,
    #[serde(default)]
    tests: Vec<TomlCodeTest>,
}

/// `correct = "a"` or `correct = ["a", "b"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TomlCorrect {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct TomlPair {
    left: String,
    right: String,
}

#[derive(Debug, Deserialize)]
struct TomlCodeTest {
    name: String,
    body: String,
}

/// Parse a single TOML file into a validated `SubjectGraph`.
pub fn parse_subject(path: &Path) -> Result<SubjectGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read curriculum file: {}", path.display()))?;

    parse_subject_str(&content, path)
}

/// Parse a TOML string into a `SubjectGraph` (useful for testing).
pub fn parse_subject_str(content: &str, source_path: &Path) -> Result<SubjectGraph> {
    let parsed: TomlSubjectFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut nodes = Vec::with_capacity(parsed.nodes.len());
    let mut questions = HashMap::new();
    for n in parsed.nodes {
        let tier: Tier = n.tier.parse().map_err(|e: String| anyhow::anyhow!("{}", e))?;
        let kind = n
            .kind
            .map(|k| k.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
            .transpose()?
            .unwrap_or(NodeKind::Normal);

        let bank = n
            .questions
            .into_iter()
            .map(convert_question)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("in node '{}'", n.id))?;
        if !bank.is_empty() {
            questions.insert(n.id.clone(), bank);
        }

        nodes.push(LearningNode {
            id: n.id,
            name: n.name,
            tier,
            prerequisites: n.prerequisites.into_iter().collect(),
            kind,
            section: n.section,
            description: n.description,
        });
    }

    let info = SubjectInfo {
        id: parsed.subject.id,
        name: parsed.subject.name,
        description: parsed.subject.description,
    };
    SubjectGraph::new(info, nodes, questions)
        .with_context(|| format!("invalid curriculum: {}", source_path.display()))
}

fn convert_question(q: TomlQuestion) -> Result<QuestionSpec> {
    let kind = match q.kind.as_str() {
        "single_choice" => match q.correct {
            Some(TomlCorrect::One(correct)) => QuestionKind::SingleChoice {
                options: q.options,
                correct,
            },
            _ => bail!("question '{}': single_choice needs one `correct` string", q.id),
        },
        "multiple_choice" => {
            let correct: BTreeSet<String> = match q.correct {
                Some(TomlCorrect::One(c)) => std::iter::once(c).collect(),
                Some(TomlCorrect::Many(c)) => c.into_iter().collect(),
                None => bail!("question '{}': multiple_choice needs `correct`", q.id),
            };
            QuestionKind::MultipleChoice {
                options: q.options,
                correct,
            }
        }
        "numeric" => {
            let Some(value) = q.value else {
                bail!("question '{}': numeric needs `value`", q.id);
            };
            if !value.is_finite() {
                bail!("question '{}': numeric value must be finite", q.id);
            }
            QuestionKind::Numeric { value }
        }
        "matching_pairs" => {
            if q.pairs.is_empty() {
                bail!("question '{}': matching_pairs needs at least one pair", q.id);
            }
            QuestionKind::MatchingPairs {
                pairs: q
                    .pairs
                    .into_iter()
                    .map(|p| MatchPair::new(p.left, p.right))
                    .collect(),
            }
        }
        "code_completion" => {
            let language: Language = q
                .language
                .as_deref()
                .unwrap_or("python")
                .parse()
                .map_err(|e: String| anyhow::anyhow!("{}", e))?;
            QuestionKind::CodeCompletion {
                language,
                template: q.template,
                tests: q
                    .tests
                    .into_iter()
                    .map(|t| CodeTestCase {
                        name: t.name,
                        body: t.body,
                    })
                    .collect(),
            }
        }
        other => bail!("question '{}': unknown question type '{other}'", q.id),
    };

    Ok(QuestionSpec {
        id: q.id,
        prompt: q.prompt,
        explanation: q.explanation,
        kind,
    })
}

/// Recursively load every `.toml` subject file under a directory.
///
/// Unlike a lenient loader, any malformed file fails the whole load: a
/// half-loaded curriculum would silently hide nodes from learners.
pub fn load_curriculum_dir(dir: &Path) -> Result<Curriculum> {
    let mut graphs = Vec::new();
    collect_subjects(dir, &mut graphs)?;
    if graphs.is_empty() {
        tracing::warn!("no curriculum files found in {}", dir.display());
    }
    Curriculum::new(graphs).with_context(|| format!("failed to load {}", dir.display()))
}

fn collect_subjects(dir: &Path, graphs: &mut Vec<SubjectGraph>) -> Result<()> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_subjects(&path, graphs)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            let graph = parse_subject(&path)?;
            tracing::debug!(
                "loaded subject '{}' ({} nodes) from {}",
                graph.id(),
                graph.nodes().len(),
                path.display()
            );
            graphs.push(graph);
        }
    }
    Ok(())
}

/// A soft problem found by [`validate_curriculum`].
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub subject: String,
    /// The node ID (if applicable).
    pub node_id: Option<String>,
    pub message: String,
}

/// Check a loaded curriculum for authoring mistakes that do not prevent
/// loading.
pub fn validate_curriculum(curriculum: &Curriculum) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for graph in curriculum.subjects() {
        let mut warn = |node: &LearningNode, message: String| {
            warnings.push(ValidationWarning {
                subject: graph.id().to_string(),
                node_id: Some(node.id.clone()),
                message,
            });
        };

        for node in graph.nodes() {
            let bank = graph.questions(&node.id).unwrap_or_default();
            if bank.is_empty() {
                warn(node, "node has no questions".into());
            }

            for q in bank {
                match &q.kind {
                    QuestionKind::SingleChoice { options, correct } => {
                        if !options.contains(correct) {
                            warn(node, format!("question '{}': answer is not among options", q.id));
                        }
                    }
                    QuestionKind::MultipleChoice { options, correct } => {
                        if correct.iter().any(|c| !options.contains(c)) {
                            warn(node, format!("question '{}': answer is not among options", q.id));
                        }
                    }
                    QuestionKind::CodeCompletion { tests, .. } if tests.is_empty() => {
                        warn(node, format!("question '{}': code question has no test cases", q.id));
                    }
                    _ => {}
                }
            }

            // A prerequisite gated behind a higher tier cannot be finished
            // before its dependent is reachable.
            for prereq in &node.prerequisites {
                if let Ok(p) = graph.node(prereq) {
                    if p.tier > node.tier {
                        warn(
                            node,
                            format!(
                                "prerequisite '{}' has a higher tier ({}) than the node ({})",
                                p.id, p.tier, node.tier
                            ),
                        );
                    }
                }
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[subject]
id = "cs"
name = "Computer Science"
description = "Algorithms and databases"

[[nodes]]
id = "sorting"
name = "Sorting"
tier = "beginner"
section = "Algorithms"

[[nodes.questions]]
id = "bubble-worst"
type = "single_choice"
prompt = "Worst-case complexity of bubble sort?"
options = ["O(n)", "O(n log n)", "O(n^2)"]
correct = "O(n^2)"
explanation = "Every pair may need swapping."

[[nodes.questions]]
id = "stable"
type = "multiple_choice"
prompt = "Which sorts are stable?"
options = ["merge", "heap", "insertion"]
correct = ["merge", "insertion"]

[[nodes]]
id = "complexity"
name = "Complexity"
tier = "intermediate"
kind = "milestone"
prerequisites = ["sorting"]

[[nodes.questions]]
id = "log2"
type = "numeric"
prompt = "log2(1024)?"
value = 10.0

[[nodes.questions]]
id = "match"
type = "matching_pairs"
prompt = "Match the complexity."
pairs = [
  { left = "binary search", right = "O(log n)" },
  { left = "linear scan", right = "O(n)" },
]

[[nodes.questions]]
id = "add"
type = "code_completion"
prompt = "Implement add."
language = "python"
template = "def add(a, b):\n    pass\n"
tests = [{ name = "small", body = "assert add(1, 2) == 3" }]
"#;

    fn parse(src: &str) -> Result<SubjectGraph> {
        parse_subject_str(src, &PathBuf::from("test.toml"))
    }

    #[test]
    fn parse_valid_toml() {
        let graph = parse(VALID_TOML).unwrap();
        assert_eq!(graph.id(), "cs");
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.question_count(), 5);

        let complexity = graph.node("complexity").unwrap();
        assert_eq!(complexity.tier, Tier::Intermediate);
        assert_eq!(complexity.kind, NodeKind::Milestone);
        assert!(complexity.prerequisites.contains("sorting"));

        let sorting = graph.questions("sorting").unwrap();
        assert_eq!(
            sorting[0].explanation.as_deref(),
            Some("Every pair may need swapping.")
        );
        assert!(matches!(
            &sorting[1].kind,
            QuestionKind::MultipleChoice { correct, .. } if correct.len() == 2
        ));
        let add = &graph.questions("complexity").unwrap()[2];
        assert!(matches!(
            &add.kind,
            QuestionKind::CodeCompletion {
                language: Language::Python,
                tests,
                ..
            } if tests.len() == 1
        ));
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[subject]
id = "minimal"
name = "Minimal"

[[nodes]]
id = "n1"
name = "Node 1"
"#;
        let graph = parse(toml).unwrap();
        let n1 = graph.node("n1").unwrap();
        assert_eq!(n1.tier, Tier::Beginner);
        assert_eq!(n1.kind, NodeKind::Normal);
        assert!(n1.is_root());
        assert!(graph.questions("n1").unwrap().is_empty());
    }

    #[test]
    fn cycle_is_a_hard_error() {
        let toml = r#"
[subject]
id = "loop"
name = "Loop"

[[nodes]]
id = "a"
name = "A"
prerequisites = ["b"]

[[nodes]]
id = "b"
name = "B"
prerequisites = ["a"]
"#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::CycleDetected { .. })
        ));
    }

    #[test]
    fn malformed_question_shape() {
        let toml = r#"
[subject]
id = "bad"
name = "Bad"

[[nodes]]
id = "n1"
name = "Node 1"

[[nodes.questions]]
id = "q"
type = "numeric"
prompt = "missing value"
"#;
        let err = parse(toml).unwrap_err();
        assert!(format!("{err:#}").contains("numeric needs `value`"));
    }

    #[test]
    fn unknown_question_type() {
        let toml = r#"
[subject]
id = "bad"
name = "Bad"

[[nodes]]
id = "n1"
name = "Node 1"

[[nodes.questions]]
id = "q"
type = "essay"
prompt = "Discuss."
"#;
        assert!(parse(toml).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse(bad).is_err());
    }

    #[test]
    fn validate_reports_soft_problems() {
        let toml = r#"
[subject]
id = "warn"
name = "Warnings"

[[nodes]]
id = "hard"
name = "Hard root"
tier = "advanced"

[[nodes.questions]]
id = "q1"
type = "single_choice"
prompt = "Pick"
options = ["a", "b"]
correct = "c"

[[nodes]]
id = "easy"
name = "Easy follow-up"
tier = "beginner"
prerequisites = ["hard"]

[[nodes.questions]]
id = "code"
type = "code_completion"
prompt = "Write it"
"#;
        let graph = parse(toml).unwrap();
        let curriculum = Curriculum::new(vec![graph]).unwrap();
        let warnings = validate_curriculum(&curriculum);
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("not among options")));
        assert!(messages.iter().any(|m| m.contains("no test cases")));
        assert!(messages.iter().any(|m| m.contains("higher tier")));
        assert!(!messages.iter().any(|m| m.contains("no questions")));
    }

    #[test]
    fn validate_clean_curriculum() {
        let curriculum = Curriculum::new(vec![parse(VALID_TOML).unwrap()]).unwrap();
        assert!(validate_curriculum(&curriculum).is_empty());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cs.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let curriculum = load_curriculum_dir(dir.path()).unwrap();
        assert_eq!(curriculum.subjects().count(), 1);
        assert!(curriculum.subject("cs").is_ok());
    }

    #[test]
    fn load_directory_fails_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cs.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[subject").unwrap();
        assert!(load_curriculum_dir(dir.path()).is_err());
    }

    #[test]
    fn load_missing_directory() {
        assert!(load_curriculum_dir(Path::new("/definitely/not/here")).is_err());
    }
}
