//! Bounded external process runner
//!
//! Every external program in the pipeline (TLE ingestion, decommutation,
//! calibration stages) runs through [`ProcessRunner::run`]: spawn, optional
//! piped stdin, captured stdout/stderr, and a hard wall-clock timeout. A
//! timed-out child is killed — there is no cooperative cancellation and no
//! retry. All failure modes (spawn error, timeout, log-file I/O error) are
//! reported through [`RunOutcome::success`] so callers decide per stage
//! whether a failure is fatal to the scene.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Default wall-clock bound on a single external command: 24 hours.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Error, Debug)]
pub enum CommandLineError {
    #[error("empty command line")]
    Empty,
    #[error("unbalanced quote in command line: {0}")]
    UnbalancedQuote(String),
}

/// A command to execute: either a pre-split argument vector or a
/// shell-syntax string to be tokenized (quotes respected, no expansion).
#[derive(Debug, Clone)]
pub enum CommandLine {
    Args(Vec<String>),
    Shell(String),
}

impl CommandLine {
    fn tokens(&self) -> Result<Vec<String>, CommandLineError> {
        let tokens = match self {
            CommandLine::Args(args) => args.clone(),
            CommandLine::Shell(line) => split_shell(line)?,
        };
        if tokens.is_empty() {
            return Err(CommandLineError::Empty);
        }
        Ok(tokens)
    }
}

/// Tokenize a shell-syntax command string.
///
/// Handles single and double quotes; does not perform variable expansion or
/// globbing — the pipeline commands are plain argv lines.
fn split_shell(line: &str) -> Result<Vec<String>, CommandLineError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(CommandLineError::UnbalancedQuote(line.to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Everything needed to run one bounded external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: CommandLine,
    /// Text written to the child's stdin before reading output.
    pub stdin: Option<String>,
    /// Explicit working directory — never the ambient process cwd.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    /// Wall-clock bound; [`DEFAULT_COMMAND_TIMEOUT`] when `None`.
    pub timeout: Option<Duration>,
    /// Redirect captured stdout to this file instead of the debug log.
    pub stdout_logfile: Option<PathBuf>,
    /// Redirect captured stderr to this file instead of the debug log.
    pub stderr_logfile: Option<PathBuf>,
}

impl CommandSpec {
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new(CommandLine::Shell(line.into()))
    }

    pub fn args(args: Vec<String>) -> Self {
        Self::new(CommandLine::Args(args))
    }

    fn new(command: CommandLine) -> Self {
        Self {
            command,
            stdin: None,
            cwd: None,
            env: HashMap::new(),
            timeout: None,
            stdout_logfile: None,
            stderr_logfile: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_stdout_logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_logfile = Some(path.into());
        self
    }

    pub fn with_stderr_logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_logfile = Some(path.into());
        self
    }
}

/// Result of one bounded command execution.
///
/// `success` means the command was spawned, completed within its timeout and
/// all requested log files were written. A non-zero `exit_code` with
/// `success == true` is the caller's policy decision.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Ran to completion with exit code 0.
    pub fn ok(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Executes external commands with a hard wall-clock bound.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    default_timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl ProcessRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Run one external command to completion, timeout or kill.
    pub async fn run(&self, spec: CommandSpec) -> RunOutcome {
        let tokens = match spec.command.tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Invalid command line: {}", e);
                return RunOutcome::failed();
            }
        };
        debug!("Command sequence = {:?}", tokens);

        let mut cmd = Command::new(&tokens[0]);
        cmd.args(&tokens[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            // The timeout path drops the wait future with the child still
            // inside it; kill_on_drop is what actually reaps the process.
            .kill_on_drop(true);
        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn command {:?}: {}", tokens, e);
                return RunOutcome::failed();
            }
        };
        debug!("Process pid: {:?}", child.id());

        if let Some(ref input) = spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    warn!("Failed writing stdin to {:?}: {}", tokens, e);
                }
                // Dropping stdin closes the pipe so the child sees EOF.
            }
        }

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Failed waiting for command {:?}: {}", tokens, e);
                return RunOutcome::failed();
            }
            Err(_) => {
                error!(
                    "Command {:?} took too long (more than {:?}). Terminating the job.",
                    tokens, timeout
                );
                return RunOutcome::failed();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        let mut success = true;
        if !sink_output(&stdout, spec.stdout_logfile.as_deref(), "stdout").await {
            success = false;
        }
        if !sink_output(&stderr, spec.stderr_logfile.as_deref(), "stderr").await {
            success = false;
        }

        RunOutcome {
            success,
            exit_code,
            stdout,
            stderr,
        }
    }
}

/// Write captured output to its log file, or echo it to the debug log.
///
/// Returns false when the destination file cannot be written.
async fn sink_output(text: &str, logfile: Option<&Path>, label: &str) -> bool {
    match logfile {
        None => {
            for line in text.lines() {
                debug!("[{}] {}", label, line);
            }
            true
        }
        Some(path) => match tokio::fs::write(path, text).await {
            Ok(()) => true,
            Err(e) => {
                error!("IO operation to {} logfile {:?} failed: {}", label, path, e);
                false
            }
        },
    }
}
