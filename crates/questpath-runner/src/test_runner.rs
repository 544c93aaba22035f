//! Test execution for sandboxed answers.
//!
//! Rust cases report in the libtest human-readable format
//! (`test <name> ... ok|FAILED`). The Python harness reports one JSON line
//! per case, tagged with a nonce the graded code never sees.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use questpath_core::model::Language;
use questpath_core::traits::CaseResult;

use crate::sandbox::{Sandbox, CASE_MODULE};

/// Per-case results plus whether the run reached its end-of-run marker.
#[derive(Debug, Default)]
struct ParsedRun {
    cases: HashMap<String, (bool, String)>,
    finished: bool,
}

/// Run the generated cases and report one result per expected test name.
///
/// A case that never reported (the run crashed, exited early or timed out
/// first) counts as failed.
pub async fn run_cases(sandbox: &Sandbox, expected: &[String]) -> Result<Vec<CaseResult>> {
    let nonce = Uuid::new_v4().simple().to_string();
    let mut cmd = match sandbox.language() {
        Language::Rust => {
            let mut cmd = Command::new("cargo");
            cmd.arg("test")
                .arg("--lib")
                .arg(CASE_MODULE)
                .arg("--")
                .arg("--test-threads=1");
            cmd
        }
        Language::Python => {
            let mut cmd = Command::new("python3");
            cmd.arg("-I")
                .arg("run_cases.py")
                .arg(sandbox.timeout().as_secs().max(1).to_string());
            cmd
        }
    };
    cmd.current_dir(sandbox.work_dir())
        .env_clear()
        .envs(sandbox.build_env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to run tests")?;
    if let Some(mut stdin) = child.stdin.take() {
        if sandbox.language() == Language::Python {
            if let Err(e) = stdin.write_all(format!("{nonce}\n").as_bytes()).await {
                tracing::debug!("could not hand the run nonce to the harness: {e}");
            }
        }
    }

    let waited = tokio::time::timeout(sandbox.timeout(), child.wait_with_output()).await;
    let Ok(output) = waited else {
        let message = format!("timed out after {}s", sandbox.timeout().as_secs());
        return Ok(expected
            .iter()
            .map(|name| CaseResult {
                name: name.clone(),
                passed: false,
                message: message.clone(),
            })
            .collect());
    };
    let output = output.context("failed to run tests")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let run = match sandbox.language() {
        Language::Rust => parse_test_output(&format!("{stdout}\n{stderr}")),
        Language::Python => parse_harness_output(&stdout, &nonce),
    };

    // Without the end-of-run marker the Rust per-test lines cannot be told
    // apart from output printed by the answer itself.
    let trusted = run.finished || sandbox.language() == Language::Python;
    let unreported = if run.finished && output.status.success() {
        "test did not run".to_string()
    } else {
        format!("test run ended early ({})", output.status)
    };

    Ok(expected
        .iter()
        .map(|name| match run.cases.get(name).filter(|_| trusted) {
            Some((passed, message)) => CaseResult {
                name: name.clone(),
                passed: *passed,
                message: message.clone(),
            },
            None => CaseResult {
                name: name.clone(),
                passed: false,
                message: unreported.clone(),
            },
        })
        .collect())
}

#[derive(Deserialize)]
struct HarnessLine {
    name: String,
    passed: bool,
    #[serde(default)]
    message: String,
}

/// Results from the Python harness. Lines without the nonce are ignored.
fn parse_harness_output(output: &str, nonce: &str) -> ParsedRun {
    let mut run = ParsedRun::default();
    for line in output.lines() {
        let Some(rest) = line.strip_prefix(nonce).and_then(|r| r.strip_prefix(' ')) else {
            continue;
        };
        if rest == "done" {
            run.finished = true;
            continue;
        }
        match serde_json::from_str::<HarnessLine>(rest) {
            Ok(case) => {
                run.cases.insert(case.name, (case.passed, case.message));
            }
            Err(e) => tracing::debug!("unreadable harness line: {e}"),
        }
    }
    run
}

/// libtest output: test name to (passed, failure message), finished once the
/// `test result:` summary was seen.
fn parse_test_output(output: &str) -> ParsedRun {
    let mut results = HashMap::new();
    let finished = output
        .lines()
        .any(|line| line.trim_start().starts_with("test result: "));

    // Parse individual test lines
    for line in output.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("test ") else {
            continue;
        };
        if let Some(name) = rest.strip_suffix(" ... ok") {
            results.insert(name.to_string(), (true, String::new()));
        } else if let Some(name) = rest.strip_suffix(" ... FAILED") {
            results.insert(name.to_string(), (false, String::new()));
        }
    }

    // Try to extract failure messages from the "failures:" section
    let mut in_failures = false;
    let mut current_failure_name = String::new();
    let mut current_message = String::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed == "failures:" && !in_failures {
            in_failures = true;
            continue;
        }
        if in_failures && trimmed.starts_with("---- ") && trimmed.ends_with(" stdout ----") {
            if !current_failure_name.is_empty() {
                update_failure(&mut results, &current_failure_name, &current_message);
            }
            current_failure_name = trimmed
                .trim_start_matches("---- ")
                .trim_end_matches(" stdout ----")
                .to_string();
            current_message.clear();
            continue;
        }
        if in_failures && trimmed == "failures:" {
            // Second "failures:" section lists names only, stop collecting
            break;
        }
        if in_failures && !current_failure_name.is_empty() {
            if !current_message.is_empty() {
                current_message.push('\n');
            }
            current_message.push_str(trimmed);
        }
    }
    if !current_failure_name.is_empty() {
        update_failure(&mut results, &current_failure_name, &current_message);
    }

    ParsedRun {
        cases: results,
        finished,
    }
}

fn update_failure(results: &mut HashMap<String, (bool, String)>, name: &str, message: &str) {
    if let Some((_, m)) = results.get_mut(name) {
        *m = message.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questpath_core::model::CodeTestCase;
    use std::time::Duration;

    #[test]
    fn parse_all_pass() {
        let output = r#"
running 2 tests
test quiz_cases::case_0_one ... ok
test quiz_cases::case_1_two ... ok

test result: ok. 2 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.00s
"#;
        let run = parse_test_output(output);
        assert!(run.finished);
        assert_eq!(run.cases.len(), 2);
        assert!(run.cases.values().all(|(passed, _)| *passed));
    }

    #[test]
    fn parse_some_failures() {
        let output = r#"
running 3 tests
test quiz_cases::case_0_one ... ok
test quiz_cases::case_1_two ... FAILED
test quiz_cases::case_2_three ... ok

failures:

---- quiz_cases::case_1_two stdout ----
thread 'quiz_cases::case_1_two' panicked at 'assertion `left == right` failed
  left: 1
 right: 2'

failures:
    quiz_cases::case_1_two

test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.00s
"#;
        let results = parse_test_output(output).cases;
        let (passed, message) = &results["quiz_cases::case_1_two"];
        assert!(!passed);
        assert!(message.contains("assertion"));
        assert!(results["quiz_cases::case_2_three"].0);
    }

    #[test]
    fn parse_no_tests() {
        let output = "running 0 tests\n\ntest result: ok. 0 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out\n";
        assert!(parse_test_output(output).cases.is_empty());
    }

    #[test]
    fn parse_without_summary_is_unfinished() {
        let output = "running 1 test\ntest quiz_cases::case_0_one ... ok\n";
        let run = parse_test_output(output);
        assert!(!run.finished);
        assert!(run.cases["quiz_cases::case_0_one"].0);
    }

    #[test]
    fn harness_lines_need_the_nonce() {
        let output = r#"test quiz_cases::case_0_a ... ok
feedface {"name": "quiz_cases::case_0_a", "passed": true, "message": ""}
cafe0001 {"name": "quiz_cases::case_1_b", "passed": false, "message": "AssertionError"}
cafe0001 {"name": "quiz_cases::case_0_a", "passed": true}
cafe0001 done
"#;
        let run = parse_harness_output(output, "cafe0001");
        assert!(run.finished);
        assert_eq!(run.cases.len(), 2);
        assert!(run.cases["quiz_cases::case_0_a"].0);
        assert_eq!(
            run.cases["quiz_cases::case_1_b"],
            (false, "AssertionError".to_string())
        );

        let run = parse_harness_output("feedface done\n", "cafe0001");
        assert!(!run.finished);
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn python_cases_run_independently() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let sandbox = Sandbox::new(Language::Python, Duration::from_secs(30), None).unwrap();
        let names = sandbox
            .write_submission(
                "def add(a, b):\n    return a + b if a >= 0 else 0\n",
                &[
                    CodeTestCase {
                        name: "positive".into(),
                        body: "assert add(1, 2) == 3".into(),
                    },
                    CodeTestCase {
                        name: "negative".into(),
                        body: "assert add(-1, -2) == -3, 'negatives'".into(),
                    },
                ],
            )
            .unwrap();

        let results = run_cases(&sandbox, &names).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[1].message.contains("negatives"));
    }

    #[tokio::test]
    async fn python_timeout_fails_every_case() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let sandbox = Sandbox::new(Language::Python, Duration::from_secs(1), None).unwrap();
        let names = sandbox
            .write_submission(
                "def spin():\n    while True:\n        pass\n",
                &[CodeTestCase {
                    name: "forever".into(),
                    body: "spin()".into(),
                }],
            )
            .unwrap();

        let results = run_cases(&sandbox, &names).await.unwrap();
        assert!(!results[0].passed);
        assert!(results[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn python_output_cannot_pass_a_case() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let sandbox = Sandbox::new(Language::Python, Duration::from_secs(30), None).unwrap();
        let cases = [CodeTestCase {
            name: "adds".into(),
            body: "assert add(1, 2) == 3".into(),
        }];
        for code in [
            "import os\nprint('test quiz_cases::case_0_adds ... ok')\nos._exit(0)\n",
            "import sys\nprint('test result: ok. 1 passed; 0 failed')\nsys.exit(0)\n",
        ] {
            let names = sandbox.write_submission(code, &cases).unwrap();
            let results = run_cases(&sandbox, &names).await.unwrap();
            assert_eq!(results.len(), 1);
            assert!(!results[0].passed, "{code:?} was graded correct");
        }
    }
}
