//! Throwaway project directory for grading one code answer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use questpath_core::model::{CodeTestCase, Language};

/// Module that holds the generated test cases; test names are reported as
/// `quiz_cases::<ident>`.
pub const CASE_MODULE: &str = "quiz_cases";

/// Runs each case in its own interpreter and reports on stdout, one JSON
/// line per case tagged with the run nonce read from stdin. A case passes
/// only if its child exits cleanly after printing the per-case token, so
/// output or early exits from the answer cannot pass a case.
const PYTHON_HARNESS: &str = r#"import json
import secrets
import subprocess
import sys

CASE_RUNNER = r"""
import json
import sys
import traceback


def main():
    case = json.loads(sys.stdin.read())
    token = case.pop("token")
    namespace = {"__name__": "solution"}
    try:
        exec(compile(case["source"], "solution.py", "exec"), namespace)
        exec(compile(case["body"], case["name"], "exec"), namespace)
    except BaseException:
        traceback.print_exc(limit=3)
        return 1
    sys.stdout.write("\n" + token + "\n")
    return 0


sys.exit(main())
"""

NONCE = sys.stdin.readline().strip()
TIMEOUT = float(sys.argv[1])

with open("cases.json") as f:
    CASES = json.load(f)
with open("solution.py") as f:
    SOURCE = f.read()


def report(name, passed, message=""):
    line = json.dumps({"name": "quiz_cases::" + name, "passed": passed, "message": message})
    sys.stdout.write("%s %s\n" % (NONCE, line))
    sys.stdout.flush()


for name, body in CASES:
    token = secrets.token_hex(16)
    payload = json.dumps({"source": SOURCE, "name": name, "body": body, "token": token})
    try:
        child = subprocess.run(
            [sys.executable, "-I", "-c", CASE_RUNNER],
            input=payload,
            capture_output=True,
            text=True,
            timeout=TIMEOUT,
        )
    except subprocess.TimeoutExpired:
        report(name, False, "timed out after %gs" % TIMEOUT)
        continue
    lines = child.stdout.splitlines()
    if child.returncode == 0 and lines and lines[-1] == token:
        report(name, True)
    elif child.returncode == 0:
        report(name, False, "case exited before finishing")
    else:
        report(name, False, child.stderr.strip()[-2000:])

sys.stdout.write("%s done\n" % NONCE)
"#;

/// Environment variables passed through to graded code. Everything else is
/// cleared.
const PASSTHROUGH_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "CARGO_HOME",
    "RUSTUP_HOME",
    "RUSTUP_TOOLCHAIN",
    "TMPDIR",
];

/// A sandboxed project for compiling and testing one submitted answer.
///
/// On drop, the temporary directory is automatically cleaned up.
pub struct Sandbox {
    work_dir: TempDir,
    /// Shared cargo target directory, if any.
    target_dir: Option<PathBuf>,
    timeout: Duration,
    language: Language,
}

impl Sandbox {
    /// Create a new sandbox laid out for `language`.
    pub fn new(language: Language, timeout: Duration, target_dir: Option<&Path>) -> Result<Self> {
        let work_dir = TempDir::new().context("failed to create temp directory")?;

        if language == Language::Rust {
            let cargo_toml = r#"[package]
name = "quiz_answer"
version = "0.1.0"
edition = "2021"

[dependencies]
"#;
            std::fs::write(work_dir.path().join("Cargo.toml"), cargo_toml)
                .context("failed to write Cargo.toml")?;
            std::fs::create_dir_all(work_dir.path().join("src"))
                .context("failed to create src directory")?;
        }

        if let Some(dir) = target_dir {
            std::fs::create_dir_all(dir).context("failed to create shared target directory")?;
        }

        Ok(Self {
            work_dir,
            target_dir: target_dir.map(Path::to_path_buf),
            timeout,
            language,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Path of the file holding the submitted code.
    pub fn source_path(&self) -> PathBuf {
        match self.language {
            Language::Rust => self.work_dir().join("src").join("lib.rs"),
            Language::Python => self.work_dir().join("solution.py"),
        }
    }

    /// Write the answer and one generated test per case.
    ///
    /// Returns the reported test name for each case, in case order.
    pub fn write_submission(&self, code: &str, cases: &[CodeTestCase]) -> Result<Vec<String>> {
        let idents: Vec<String> = cases
            .iter()
            .enumerate()
            .map(|(i, c)| case_ident(i, &c.name))
            .collect();

        match self.language {
            Language::Rust => {
                let mut lib = format!(
                    "{code}\n\n#[cfg(test)]\n#[allow(unused_imports)]\nmod {CASE_MODULE} {{\n    use super::*;\n"
                );
                for (ident, case) in idents.iter().zip(cases) {
                    lib.push_str(&format!(
                        "\n    #[test]\n    fn {ident}() {{\n        {}\n    }}\n",
                        case.body.trim()
                    ));
                }
                lib.push_str("}\n");
                std::fs::write(self.source_path(), lib).context("failed to write src/lib.rs")?;
            }
            Language::Python => {
                std::fs::write(self.source_path(), code).context("failed to write solution.py")?;
                let table: Vec<(&str, &str)> = idents
                    .iter()
                    .zip(cases)
                    .map(|(ident, case)| (ident.as_str(), case.body.as_str()))
                    .collect();
                let json = serde_json::to_string_pretty(&table)?;
                std::fs::write(self.work_dir().join("cases.json"), json)
                    .context("failed to write cases.json")?;
                std::fs::write(self.work_dir().join("run_cases.py"), PYTHON_HARNESS)
                    .context("failed to write run_cases.py")?;
            }
        }

        Ok(idents
            .into_iter()
            .map(|ident| format!("{CASE_MODULE}::{ident}"))
            .collect())
    }

    /// Environment for child processes: a short allow-list plus the shared
    /// target dir.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = PASSTHROUGH_ENV
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        if let Some(dir) = &self.target_dir {
            env.push((
                "CARGO_TARGET_DIR".to_string(),
                dir.to_string_lossy().to_string(),
            ));
        }
        env.push(("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()));
        env
    }
}

/// A test-function identifier for a case: `case_<index>_<sanitized name>`.
fn case_ident(index: usize, name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        format!("case_{index}")
    } else {
        format!("case_{index}_{cleaned}")
    }
}
