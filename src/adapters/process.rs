//! Child process execution with timeout and cancellation

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, trace};

use crate::engine::cancel::CancellationToken;
use crate::ports::TransformFailure;
use crate::utils::Utils;

/// Lines of stderr kept in failure messages
const STDERR_TAIL_LINES: usize = 12;

/// One external command invocation
pub struct ProcessSpec<'a, S: AsRef<OsStr>> {
    pub program: &'a Path,
    pub args: &'a [S],
    pub timeout: Duration,
    pub current_dir: Option<&'a Path>,
}

/// Run to completion and capture output. The child is killed on timeout or cancellation.
pub async fn run_captured<S: AsRef<OsStr>>(
    spec: ProcessSpec<'_, S>,
    cancel: Option<&CancellationToken>,
) -> Result<(Output, Duration), TransformFailure> {
    let started = Instant::now();
    let mut command = Command::new(spec.program);
    command
        .args(spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = spec.current_dir {
        command.current_dir(dir);
    }
    trace!(
        "Running {} {}",
        spec.program.display(),
        spec.args
            .iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    if cancel.map_or(false, |c| c.is_cancelled()) {
        return Err(TransformFailure::Cancelled);
    }

    let child = command
        .spawn()
        .map_err(|e| TransformFailure::Launch(format!("{}: {}", spec.program.display(), e)))?;

    // Dropping the wait future drops the child, which kills it.
    let wait = tokio::time::timeout(spec.timeout, child.wait_with_output());
    let waited = match cancel {
        Some(cancel) => {
            tokio::select! {
                result = wait => result,
                _ = cancel.cancelled() => {
                    debug!("Killed {} on cancellation", spec.program.display());
                    return Err(TransformFailure::Cancelled);
                }
            }
        }
        None => wait.await,
    };

    let output = match waited {
        Err(_) => return Err(TransformFailure::TimedOut(spec.timeout)),
        Ok(Err(e)) => return Err(TransformFailure::Launch(e.to_string())),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        return Err(TransformFailure::Exited {
            code: output.status.code(),
            stderr: Utils::tail_lines(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
        });
    }
    Ok((output, started.elapsed()))
}
