//! questpath-runner: Sandboxed grading of code-completion answers.
//!
//! Writes each answer into a throwaway project together with one generated
//! test per case, compiles it, runs the cases with a timeout and a scrubbed
//! environment, and reports pass/fail per case.

pub mod compiler;
pub mod sandbox;
pub mod test_runner;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use questpath_core::model::Language;
use questpath_core::traits::{CaseResult, CodeGrader, GradeReport, GradeRequest};

/// Local grader that runs answers with the installed toolchains.
pub struct LocalRunner {
    /// Shared target directory for caching compiled artifacts.
    target_dir: Option<PathBuf>,
    /// Used when a request does not carry its own timeout.
    default_timeout: Duration,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LocalRunner {
    pub fn new(target_dir: Option<PathBuf>) -> Self {
        Self {
            target_dir,
            default_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn create_sandbox(&self, language: Language, timeout_secs: u64) -> Result<sandbox::Sandbox> {
        let timeout = if timeout_secs > 0 {
            Duration::from_secs(timeout_secs)
        } else {
            self.default_timeout
        };
        sandbox::Sandbox::new(language, timeout, self.target_dir.as_deref())
    }
}

#[async_trait]
impl CodeGrader for LocalRunner {
    async fn grade(&self, request: &GradeRequest) -> Result<GradeReport> {
        let start = Instant::now();
        let sandbox = self.create_sandbox(request.language, request.timeout_secs)?;
        let names = sandbox.write_submission(&request.code, &request.tests)?;

        if names.is_empty() {
            tracing::warn!("code question has no test cases; answer cannot pass");
            return Ok(GradeReport {
                duration_ms: start.elapsed().as_millis() as u64,
                ..GradeReport::default()
            });
        }

        let compiled = compiler::check(&sandbox).await?;
        if !compiled.success {
            tracing::debug!(
                "{} answer failed to compile ({} errors)",
                request.language,
                compiled.errors.len()
            );
            let message = if compiled.timed_out {
                "compilation timed out"
            } else {
                "compilation failed"
            };
            return Ok(GradeReport {
                cases: names
                    .into_iter()
                    .map(|name| CaseResult {
                        name,
                        passed: false,
                        message: message.to_string(),
                    })
                    .collect(),
                compile_errors: compiled.errors,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let cases = test_runner::run_cases(&sandbox, &names).await?;
        let report = GradeReport {
            cases,
            compile_errors: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            "{} answer passed {}/{} cases in {}ms",
            request.language,
            report.passed_count(),
            report.cases.len(),
            report.duration_ms
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questpath_core::model::CodeTestCase;

    fn add_cases(lang: Language) -> Vec<CodeTestCase> {
        let (a, b) = match lang {
            Language::Rust => ("assert_eq!(add(1, 2), 3);", "assert_eq!(add(0, 0), 0);"),
            Language::Python => ("assert add(1, 2) == 3", "assert add(0, 0) == 0"),
        };
        vec![
            CodeTestCase {
                name: "small".into(),
                body: a.into(),
            },
            CodeTestCase {
                name: "zero".into(),
                body: b.into(),
            },
        ]
    }

    fn request(code: &str, language: Language) -> GradeRequest {
        GradeRequest {
            code: code.to_string(),
            language,
            tests: add_cases(language),
            timeout_secs: 120,
        }
    }

    #[tokio::test]
    async fn rust_answer_passing() {
        let target = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new(Some(target.path().to_path_buf()));
        let report = runner
            .grade(&request(
                "pub fn add(a: i32, b: i32) -> i32 { a + b }",
                Language::Rust,
            ))
            .await
            .unwrap();
        assert!(report.all_passed(), "{report:?}");
        assert_eq!(report.cases.len(), 2);
    }

    #[tokio::test]
    async fn rust_answer_failing_one_case() {
        let target = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new(Some(target.path().to_path_buf()));
        // Bug: subtracts instead
        let report = runner
            .grade(&request(
                "pub fn add(a: i32, b: i32) -> i32 { a - b }",
                Language::Rust,
            ))
            .await
            .unwrap();
        assert!(!report.all_passed());
        assert_eq!(report.passed_count(), 1);
    }

    #[tokio::test]
    async fn rust_compile_error_fails_every_case() {
        let target = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new(Some(target.path().to_path_buf()));
        let report = runner
            .grade(&request("pub fn add(a: i32) -> i32 { a + }", Language::Rust))
            .await
            .unwrap();
        assert_eq!(report.passed_count(), 0);
        assert_eq!(report.cases.len(), 2);
        assert!(!report.compile_errors.is_empty());
    }

    #[tokio::test]
    async fn no_cases_never_passes() {
        let runner = LocalRunner::default();
        let report = runner
            .grade(&GradeRequest {
                code: "def add(a, b):\n    return a + b\n".into(),
                language: Language::Python,
                tests: vec![],
                timeout_secs: 5,
            })
            .await
            .unwrap();
        assert!(!report.all_passed());
    }
}
