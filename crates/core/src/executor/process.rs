//! One launched stage process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::job::JobId;

use super::ExecutorError;

/// A running external command with captured output.
///
/// Output is never awaited. [`RunningProcess::drain_output`] takes whatever
/// lines are already buffered so the child cannot block on a full pipe.
pub struct RunningProcess {
    job_id: JobId,
    stage: String,
    program: PathBuf,
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
}

impl RunningProcess {
    /// Launch `program` with `args`.
    pub fn spawn(
        job_id: JobId,
        stage: &str,
        program: &Path,
        args: &[String],
    ) -> Result<Self, ExecutorError> {
        info!(
            "Running {} for job {}: {} {}",
            stage,
            job_id,
            program.display(),
            args.join(" ")
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecutorError::ExecutableNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    ExecutorError::Spawn {
                        program: program.to_path_buf(),
                        source: e,
                    }
                }
            })?;

        let stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

        Ok(Self {
            job_id,
            stage: stage.to_string(),
            program: program.to_path_buf(),
            child,
            stdout,
            stderr,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status if the process has finished, without waiting.
    pub fn try_finished(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Log and discard every output line already available. Returns the
    /// number of lines consumed.
    pub fn drain_output(&mut self) -> usize {
        let job_id = self.job_id;
        drain_stream(&mut self.stdout, job_id, "stdout")
            + drain_stream(&mut self.stderr, job_id, "stderr")
    }

    /// Kill the process and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(
                "Failed to kill {} for job {}: {}",
                self.stage, self.job_id, e
            );
        }
    }
}

fn drain_stream<R>(lines: &mut Option<Lines<R>>, job_id: JobId, stream: &str) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut count = 0;
    while let Some(reader) = lines.as_mut() {
        match reader.next_line().now_or_never() {
            Some(Ok(Some(line))) => {
                debug!(job_id = %job_id, stream, "{}", line);
                count += 1;
            }
            Some(Ok(None)) => *lines = None,
            Some(Err(e)) => {
                warn!("Error reading {} of job {}: {}", stream, job_id, e);
                *lines = None;
            }
            None => break,
        }
    }
    count
}
