//! External command execution with a two-stream log tee
//!
//! Every command the forge shells out to (`helm`, `kubectl`, `docker`) goes
//! through [`Exec`]. Both output streams are piped; one task per stream reads
//! it line by line, forwards each line to `tracing` and keeps its own copy.
//! The call that spawned the tasks joins both before it returns, so no
//! reader outlives the command.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Failure of an external command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status})\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("output reader for `{command}` did not finish: {source}")]
    Reader {
        command: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Builder for one external command invocation
pub struct Exec {
    command: Command,
    display: String,
    log_stdout: bool,
}

impl Exec {
    pub fn new(program: &str) -> Self {
        Self {
            command: Command::new(program),
            display: program.to_string(),
            log_stdout: true,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        let arg = arg.as_ref();
        self.display.push(' ');
        self.display.push_str(&arg.to_string_lossy());
        self.command.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<OsStr>) -> Self {
        self.command.env(key, value);
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Forward stdout lines to the log (on by default)
    ///
    /// Turn off for commands whose stdout is a payload, like `helm template`.
    pub fn log_stdout(mut self, enabled: bool) -> Self {
        self.log_stdout = enabled;
        self
    }

    /// The command line, for logs and errors
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Run to completion; a non-zero exit is an error carrying both streams
    pub async fn output(self) -> Result<CommandOutput, CommandError> {
        let command = self.display.clone();
        let output = self.run().await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                command,
                status: output.status.to_string(),
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
            })
        }
    }

    /// Run to completion and return the output whatever the exit status
    pub async fn run(mut self) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %self.display, "running");

        let mut child = self
            .command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: self.display.clone(),
                source,
            })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain(out, Stream::Stdout, self.log_stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(drain(err, Stream::Stderr, true)));

        let status = child.wait().await.map_err(|source| CommandError::Spawn {
            command: self.display.clone(),
            source,
        })?;

        let (stdout, stderr) = futures::future::try_join(join(stdout_task), join(stderr_task))
            .await
            .map_err(|source| CommandError::Reader {
                command: self.display.clone(),
                source,
            })?;

        tracing::debug!(command = %self.display, %status, "finished");
        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

async fn join(
    task: Option<tokio::task::JoinHandle<Vec<u8>>>,
) -> Result<Vec<u8>, tokio::task::JoinError> {
    match task {
        Some(handle) => handle.await,
        None => Ok(Vec::new()),
    }
}

/// Read one stream to its end, forwarding each line to the log
async fn drain<R>(stream: R, which: Stream, log: bool) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if log {
                    let text = String::from_utf8_lossy(&line);
                    tracing::debug!(stream = which.as_str(), "{}", text.trim_end());
                }
                captured.extend_from_slice(&line);
            }
            Err(e) => {
                tracing::warn!(stream = which.as_str(), error = %e, "stopped reading command output");
                break;
            }
        }
    }
    captured
}
