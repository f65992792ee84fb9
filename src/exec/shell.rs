// src/exec/shell.rs

//! Evaluator and renderer that run shell commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::exec::backend::{
    EvalFuture, EvalOutput, EvalRequest, Evaluator, Input, RenderRequest, Renderer,
};
use crate::types::{StorageFormat, TargetName};

/// Environment variable holding the target's seed.
pub const SEED_ENV: &str = "REPRODAG_SEED";
/// Environment variable holding the name of the target being built.
pub const TARGET_ENV: &str = "REPRODAG_TARGET";

/// Runs each target's command with `sh -c` inside the pipeline directory.
///
/// Every dependency is exposed as an environment variable named after it:
/// string values verbatim, other values as JSON, files as their path.
///
/// - memory targets: stdout is parsed as JSON, falling back to the trimmed
///   text (empty output is `null`)
/// - file targets: the last non-empty line of stdout is the path
///
/// Each stderr line becomes a warning. A non-zero exit is an evaluation
/// failure.
#[derive(Debug, Clone)]
pub struct ShellEvaluator {
    workdir: PathBuf,
}

impl ShellEvaluator {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Evaluator for ShellEvaluator {
    fn evaluate(&self, request: EvalRequest) -> EvalFuture<'_> {
        Box::pin(async move {
            let name = request.name.clone();
            let mut env = dependency_env(&request.inputs);
            env.push((SEED_ENV.to_string(), request.seed.to_string()));

            let captured = run_shell(&name, &request.source, &self.workdir, env)
                .await
                .map_err(|e| evaluator_error(&name, e))?;

            let value = match request.format {
                StorageFormat::Memory => parse_memory_output(&captured.stdout),
                StorageFormat::File => parse_file_output(&captured.stdout)
                    .ok_or_else(|| PipelineError::Evaluator {
                        target: name.clone(),
                        message: "command printed no path on stdout".to_string(),
                    })?,
            };

            Ok(EvalOutput {
                value,
                warnings: captured.stderr,
            })
        })
    }
}

/// Runs a command template with `{input}` and `{output}` replaced by the
/// (shell-quoted) document and artifact paths.
#[derive(Debug, Clone)]
pub struct ShellRenderer {
    workdir: PathBuf,
    template: String,
}

/// Renderer template used when the configuration does not name one.
pub const DEFAULT_RENDER_TEMPLATE: &str = "pandoc {input} -o {output}";

impl ShellRenderer {
    pub fn new(workdir: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            template: template.into(),
        }
    }

    pub fn command_for(&self, document: &Path, output: &Path) -> String {
        self.template
            .replace("{input}", &shell_quote(&document.to_string_lossy()))
            .replace("{output}", &shell_quote(&output.to_string_lossy()))
    }
}

impl Renderer for ShellRenderer {
    fn render(&self, request: RenderRequest) -> EvalFuture<'_> {
        Box::pin(async move {
            let name = request.name.clone();
            let cmd = self.command_for(&request.document, &request.output);
            let env = dependency_env(&request.inputs);

            let captured = run_shell(&name, &cmd, &self.workdir, env)
                .await
                .map_err(|e| evaluator_error(&name, e))?;

            Ok(EvalOutput {
                value: serde_json::Value::String(
                    request.output.to_string_lossy().into_owned(),
                ),
                warnings: captured.stderr,
            })
        })
    }
}

struct Captured {
    stdout: String,
    stderr: Vec<String>,
}

/// Spawn `cmd` and wait for it.
///
/// The child is killed if the returned future is dropped, which is how
/// per-target timeouts stop it.
async fn run_shell(
    name: &str,
    cmd: &str,
    workdir: &Path,
    env: Vec<(String, String)>,
) -> Result<Captured> {
    info!(target = %name, cmd = %cmd, "starting target process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .current_dir(workdir)
        .env(TARGET_ENV, name)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for target '{name}'"))?;

    // Always consume stderr so buffers don't fill.
    let stderr_task = child.stderr.take().map(|stderr| {
        let target_name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target = %target_name, "stderr: {}", line);
                if !line.trim().is_empty() {
                    collected.push(line);
                }
            }
            collected
        })
    });

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .await
            .with_context(|| format!("reading stdout of target '{name}'"))?;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of target '{name}'"))?;

    let stderr = match stderr_task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };

    info!(
        target = %name,
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "target process exited"
    );

    if !status.success() {
        let detail = stderr.last().map(|l| format!(": {l}")).unwrap_or_default();
        return Err(anyhow!(
            "command exited with status {}{detail}",
            status.code().unwrap_or(-1)
        ));
    }

    Ok(Captured { stdout, stderr })
}

fn evaluator_error(name: &str, err: anyhow::Error) -> PipelineError {
    PipelineError::Evaluator {
        target: name.to_string(),
        message: format!("{err:#}"),
    }
}

fn dependency_env(inputs: &BTreeMap<TargetName, Input>) -> Vec<(String, String)> {
    inputs
        .iter()
        .map(|(name, input)| (name.clone(), input.to_arg()))
        .collect()
}

fn parse_memory_output(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(trimmed)
        .unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

fn parse_file_output(stdout: &str) -> Option<serde_json::Value> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(|line| serde_json::Value::String(line.to_string()))
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(source: &str, format: StorageFormat) -> EvalRequest {
        EvalRequest {
            name: "t".into(),
            source: source.into(),
            format,
            seed: 7,
            inputs: BTreeMap::new(),
        }
    }

    #[test]
    fn memory_output_prefers_json() {
        assert_eq!(parse_memory_output("[1, 2]\n"), json!([1, 2]));
        assert_eq!(parse_memory_output("  hello \n"), json!("hello"));
        assert_eq!(parse_memory_output(""), serde_json::Value::Null);
    }

    #[test]
    fn file_output_is_last_non_empty_line() {
        assert_eq!(
            parse_file_output("working...\nout/a.csv\n\n"),
            Some(json!("out/a.csv"))
        );
        assert_eq!(parse_file_output("\n  \n"), None);
    }

    #[test]
    fn render_template_quotes_paths() {
        let r = ShellRenderer::new(".", DEFAULT_RENDER_TEMPLATE);
        assert_eq!(
            r.command_for(Path::new("docs/report.md"), Path::new("my report.html")),
            "pandoc docs/report.md -o 'my report.html'"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn evaluator_passes_dependencies_and_seed() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = ShellEvaluator::new(dir.path());

        let mut req = request(r#"printf '{"x": "%s", "seed": %s}' "$raw" "$REPRODAG_SEED""#, StorageFormat::Memory);
        req.inputs
            .insert("raw".into(), Input::Value(json!("abc")));

        let out = evaluator.evaluate(req).await.unwrap();
        assert_eq!(out.value, json!({"x": "abc", "seed": 7}));
        assert!(out.warnings.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_evaluator_error_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = ShellEvaluator::new(dir.path());

        let err = evaluator
            .evaluate(request("echo boom >&2; exit 3", StorageFormat::Memory))
            .await
            .unwrap_err();

        match err {
            PipelineError::Evaluator { target, message } => {
                assert_eq!(target, "t");
                assert!(message.contains("status 3"), "{message}");
                assert!(message.contains("boom"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_lines_become_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = ShellEvaluator::new(dir.path());

        let out = evaluator
            .evaluate(request("echo careful >&2; echo 1", StorageFormat::Memory))
            .await
            .unwrap();
        assert_eq!(out.value, json!(1));
        assert_eq!(out.warnings, vec!["careful".to_string()]);
    }
}
