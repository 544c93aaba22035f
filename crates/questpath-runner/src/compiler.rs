//! Compile check for a sandboxed answer.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;

use questpath_core::model::Language;

use crate::sandbox::Sandbox;

/// Outcome of the compile step.
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    pub success: bool,
    /// Rendered compiler errors, empty on success.
    pub errors: Vec<String>,
    pub timed_out: bool,
}

/// Compile the answer (and its generated tests) without running anything.
pub async fn check(sandbox: &Sandbox) -> Result<CompileOutcome> {
    let mut cmd = match sandbox.language() {
        Language::Rust => {
            let mut cmd = Command::new("cargo");
            cmd.arg("test")
                .arg("--no-run")
                .arg("--quiet")
                .arg("--message-format=json");
            cmd
        }
        Language::Python => {
            let mut cmd = Command::new("python3");
            cmd.arg("-I").arg("-m").arg("py_compile").arg("solution.py");
            cmd
        }
    };
    cmd.current_dir(sandbox.work_dir())
        .env_clear()
        .envs(sandbox.build_env())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let Ok(output) = tokio::time::timeout(sandbox.timeout(), cmd.output()).await else {
        return Ok(CompileOutcome {
            success: false,
            errors: vec![format!(
                "compilation timed out after {}s",
                sandbox.timeout().as_secs()
            )],
            timed_out: true,
        });
    };
    let output = output.context("failed to start compiler")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut errors = match sandbox.language() {
        Language::Rust => parse_cargo_json_errors(&stdout),
        Language::Python => Vec::new(),
    };
    if !output.status.success() && errors.is_empty() {
        let text = stderr.trim();
        errors.push(if text.is_empty() {
            format!("compiler exited with {}", output.status)
        } else {
            text.to_string()
        });
    }

    Ok(CompileOutcome {
        success: output.status.success(),
        errors,
        timed_out: false,
    })
}

/// Pull error diagnostics out of cargo's JSON message stream.
fn parse_cargo_json_errors(output: &str) -> Vec<String> {
    let mut errors = Vec::new();

    for line in output.lines() {
        let Ok(msg) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };

        if msg.get("reason").and_then(|r| r.as_str()) != Some("compiler-message") {
            continue;
        }

        let Some(message) = msg.get("message") else {
            continue;
        };

        if message.get("level").and_then(|l| l.as_str()) != Some("error") {
            continue;
        }

        let text = message
            .get("rendered")
            .and_then(|r| r.as_str())
            .or_else(|| message.get("message").and_then(|m| m.as_str()))
            .unwrap_or("")
            .trim_end()
            .to_string();
        if !text.is_empty() {
            errors.push(text);
        }
    }

    errors
}
