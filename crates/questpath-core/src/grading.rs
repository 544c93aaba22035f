//! Answer correctness predicates per question kind.

use std::collections::BTreeSet;

use crate::error::{EngineError, EngineResult};
use crate::model::{Answer, QuestionKind};
use crate::traits::{CodeGrader, GradeReport, GradeRequest};

/// Tolerance for numeric answers.
pub const NUMERIC_EPSILON: f64 = 1e-4;

/// Result of grading one answer.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub correct: bool,
    /// Per-case details for code answers.
    pub report: Option<GradeReport>,
}

impl Verdict {
    pub fn plain(correct: bool) -> Self {
        Self {
            correct,
            report: None,
        }
    }
}

/// Check an answer for every kind that does not need code execution.
///
/// Returns `AnswerMismatch` when the answer shape does not fit the kind,
/// including any answer to a code-completion question.
pub fn check_answer(kind: &QuestionKind, answer: &Answer) -> EngineResult<bool> {
    match (kind, answer) {
        (QuestionKind::SingleChoice { correct, .. }, Answer::Choice(given)) => Ok(given == correct),
        (QuestionKind::MultipleChoice { correct, .. }, Answer::Choices(given)) => {
            let given: BTreeSet<&str> = given.iter().map(String::as_str).collect();
            let expected: BTreeSet<&str> = correct.iter().map(String::as_str).collect();
            Ok(given == expected)
        }
        (QuestionKind::Numeric { value }, Answer::Number(given)) => {
            Ok((given - value).abs() < NUMERIC_EPSILON)
        }
        (QuestionKind::MatchingPairs { pairs }, Answer::Pairs(given)) => {
            Ok(given.iter().cloned().collect::<BTreeSet<_>>() == *pairs)
        }
        _ => Err(EngineError::AnswerMismatch {
            expected: kind.name(),
        }),
    }
}

/// Grade an answer, executing code answers through `grader`.
pub async fn grade_answer(
    kind: &QuestionKind,
    answer: &Answer,
    grader: &dyn CodeGrader,
    timeout_secs: u64,
) -> EngineResult<Verdict> {
    let QuestionKind::CodeCompletion {
        language, tests, ..
    } = kind
    else {
        return check_answer(kind, answer).map(Verdict::plain);
    };
    let Answer::Code(code) = answer else {
        return Err(EngineError::AnswerMismatch {
            expected: kind.name(),
        });
    };

    let request = GradeRequest {
        code: code.clone(),
        language: *language,
        tests: tests.clone(),
        timeout_secs,
    };
    let report = grader
        .grade(&request)
        .await
        .map_err(|e| EngineError::Grader(format!("{e:#}")))?;
    tracing::debug!(
        "code answer passed {}/{} cases",
        report.passed_count(),
        report.cases.len()
    );
    Ok(Verdict {
        correct: report.all_passed(),
        report: Some(report),
    })
}
