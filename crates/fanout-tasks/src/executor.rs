//! Per-target task execution

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use console::style;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use fanout_core::{FingerprintError, Subproject, TargetId};

use crate::context::ExecutionContext;
use crate::report::format_duration;
use crate::select::Target;
use crate::tee::OutputTee;

/// Tee used for per-target capture: console stdout + append-mode log file
pub type CaptureTee = OutputTee<tokio::io::Stdout, tokio::fs::File>;

/// Result of applying the task to one target
#[derive(Debug, Clone)]
pub struct TargetResult {
    /// Target the task was applied to
    pub id: TargetId,
    /// How long the task took
    pub elapsed: Duration,
    /// Whether the task succeeded
    pub success: bool,
    /// Failure cause, when recorded instead of raised (`--endure`)
    pub cause: Option<String>,
}

/// Errors during task execution
#[derive(Debug, Error)]
pub enum ExecError {
    /// The invoked task failed for a target
    #[error("Task failed for {target}: {cause}")]
    TaskFailed { target: TargetId, cause: String },

    /// The task command does not resolve to an executable
    #[error("Task command '{0}' not found on PATH")]
    TaskNotFound(String),

    /// The task has no invocation words
    #[error("Empty task: nothing to apply")]
    EmptyTask,

    /// A target has no registered subproject descriptor
    #[error("No subproject registered for target {0}")]
    UnknownTarget(TargetId),

    /// Fingerprint persistence failed after a successful task
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// IO error (capture file, stream relay, process spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked
    #[error("Worker panicked: {0}")]
    Worker(String),
}

/// Strategy for invoking the task against one subproject.
///
/// Injected into the executor per run rather than globally rebound, so
/// output teeing (and test doubles) need no process-wide state.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Resolve/initialize the task implementation. Called exactly once
    /// per run, before any target executes.
    async fn initialize(&self, ctx: &ExecutionContext) -> Result<(), ExecError>;

    /// Apply the task to one subproject. With `capture` set, the
    /// runner must route the task's stdout and stderr through the tee;
    /// otherwise the streams pass through untouched.
    async fn run(
        &self,
        ctx: &ExecutionContext,
        sub: &Subproject,
        capture: Option<Arc<CaptureTee>>,
    ) -> Result<(), ExecError>;
}

/// Real runner: spawns the task words as a child process in the
/// subproject directory.
#[derive(Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl TaskRunner for ProcessRunner {
    async fn initialize(&self, ctx: &ExecutionContext) -> Result<(), ExecError> {
        let program = ctx.task.first().ok_or(ExecError::EmptyTask)?;
        let resolved =
            which::which(program).map_err(|_| ExecError::TaskNotFound(program.clone()))?;
        debug!(program, resolved = %resolved.display(), "task command resolved");
        Ok(())
    }

    async fn run(
        &self,
        ctx: &ExecutionContext,
        sub: &Subproject,
        capture: Option<Arc<CaptureTee>>,
    ) -> Result<(), ExecError> {
        let program = ctx.task.first().ok_or(ExecError::EmptyTask)?;
        let mut command = Command::new(program);
        command
            .args(&ctx.task[1..])
            .current_dir(ctx.root.join(&sub.path))
            // Cancellation handle scoped to this unit: dropping the
            // child (e.g. the relay erroring out) reaps it.
            .kill_on_drop(true);

        let status = match capture {
            Some(tee) => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
                let mut child = command.spawn()?;
                let stdout = child.stdout.take();
                let stderr = child.stderr.take();

                let (out, err) = tokio::join!(
                    relay(stdout, Arc::clone(&tee)),
                    relay(stderr, Arc::clone(&tee)),
                );
                out?;
                err?;
                child.wait().await?
            }
            None => command.status().await?,
        };

        if status.success() {
            Ok(())
        } else {
            let cause = match status.code() {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            };
            Err(ExecError::TaskFailed {
                target: sub.id.clone(),
                cause,
            })
        }
    }
}

/// Pump one child stream into the tee in raw chunks
async fn relay<R>(src: Option<R>, tee: Arc<CaptureTee>) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut src) = src else { return Ok(()) };
    let mut buf = [0u8; 8192];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        tee.write_all(&buf[..n]).await?;
    }
    Ok(())
}

/// Apply the task to one target and produce its result.
///
/// Failures are recorded into the result with `--endure`; otherwise
/// they propagate, after printing a resume command when running
/// sequentially. The completion counter advances on every exit path.
pub async fn execute_target(
    ctx: &ExecutionContext,
    target: &Target,
    runner: &dyn TaskRunner,
) -> Result<TargetResult, ExecError> {
    let sub = ctx
        .projects
        .get(&target.id)
        .ok_or_else(|| ExecError::UnknownTarget(target.id.clone()))?;

    println!(
        "  {} Applying task to {}",
        style("▸").dim(),
        style(&sub.id).bold()
    );
    if let Some(marker) = ctx.options.marker() {
        println!(
            "    {}",
            style(ctx.fingerprints.explain(marker, sub)).dim()
        );
    }

    let started = Instant::now();
    let mut outcome = run_with_capture(ctx, sub, runner, started).await;
    let elapsed = started.elapsed();

    if outcome.is_ok() {
        if let Some(marker) = ctx.options.refresh.as_deref() {
            outcome = ctx
                .fingerprints
                .save(marker, sub)
                .map_err(ExecError::Fingerprint);
            if outcome.is_ok() {
                info!(target = %sub.id, marker, "fingerprint refreshed");
            }
        }
    }

    if outcome.is_err() && !ctx.options.endure && ctx.options.parallel.is_none() {
        let resume = resume_command(ctx, &sub.id);
        eprintln!(
            "{}",
            style(format!(
                "Resume this run from the failed target with:\n  {resume}"
            ))
            .red()
            .bold()
        );
    }

    let completed = ctx.record_completion();
    let mark = if outcome.is_ok() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "  {} {} ({}/{}) in {}",
        mark,
        sub.id,
        completed,
        ctx.total,
        format_duration(elapsed)
    );

    match outcome {
        Ok(()) => Ok(TargetResult {
            id: sub.id.clone(),
            elapsed,
            success: true,
            cause: None,
        }),
        Err(err) if ctx.options.endure => Ok(TargetResult {
            id: sub.id.clone(),
            elapsed,
            success: false,
            cause: Some(err.to_string()),
        }),
        Err(err) => Err(err),
    }
}

/// Run the task, wrapped in the per-target capture file when `--output`
/// is configured. The footer is written and the log sink released on
/// every exit path.
async fn run_with_capture(
    ctx: &ExecutionContext,
    sub: &Subproject,
    runner: &dyn TaskRunner,
    started: Instant,
) -> Result<(), ExecError> {
    let Some(dir) = &ctx.options.output else {
        return runner.run(ctx, sub, None).await;
    };

    let path = capture_path(dir, &sub.id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    debug!(target = %sub.id, path = %path.display(), "capturing output");

    let tee = Arc::new(OutputTee::new(tokio::io::stdout(), file));
    tee.log_line(&format!(
        "[{}] Applying task to {}: {}",
        timestamp(),
        sub.id,
        ctx.task_words()
    ))
    .await?;
    tee.log_line("").await?;

    let result = runner.run(ctx, sub, Some(Arc::clone(&tee))).await;

    let footer = format!(
        "[{}] Elapsed: {}",
        timestamp(),
        format_duration(started.elapsed())
    );
    if let Err(err) = write_footer(&tee, &footer).await {
        // The footer must not mask the task's own outcome
        warn!(target = %sub.id, error = %err, "failed to finalize capture file");
    }
    result
}

async fn write_footer(tee: &CaptureTee, footer: &str) -> std::io::Result<()> {
    tee.log_line(footer).await?;
    tee.flush().await
}

/// Capture file path: `<output-dir>/<group>/<name>.txt`
fn capture_path(dir: &std::path::Path, id: &TargetId) -> std::path::PathBuf {
    let file = format!("{}.txt", id.name);
    match &id.group {
        Some(group) => dir.join(group).join(file),
        None => dir.join(file),
    }
}

/// Rebuild an equivalent invocation that resumes from `start`: the same
/// options minus any previous `--start`, an explicit `--start`, then
/// the original task words.
pub fn resume_command(ctx: &ExecutionContext, start: &TargetId) -> String {
    let mut words = vec!["fanout".to_string(), "each".to_string()];
    words.extend(ctx.options.to_args());
    words.push("--start".to_string());
    words.push(start.to_string());
    words.push("--".to_string());
    words.extend(ctx.task.iter().cloned());
    words.join(" ")
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
