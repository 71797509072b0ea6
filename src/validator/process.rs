//! Running the external build and test commands
//!
//! Commands run as subprocesses with piped output and a hard timeout. Output
//! is drained on background threads while the parent polls for exit, so a
//! chatty build cannot fill the pipe and stall. The timeout also covers the
//! wait for output after exit: a background process that inherited the pipes
//! can keep them open indefinitely.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A command to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Human-readable name used in messages ("Build", "Tests")
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, argv: &[String], cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        let (program, args) = match argv.split_first() {
            Some((p, rest)) => (p.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            label: label.into(),
            program,
            args,
            cwd: cwd.into(),
            timeout,
        }
    }

    /// The command line as typed in a shell
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result from running an external command
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Whether the process ran to completion (exit code may still be non-zero)
    pub completed: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub timed_out: bool,
    /// Error message if the process could not run or timed out
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(stdout: String, stderr: String, return_code: Option<i32>) -> Self {
        Self {
            completed: true,
            stdout,
            stderr,
            return_code,
            timed_out: false,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn timeout(label: &str, timeout: Duration) -> Self {
        Self {
            timed_out: true,
            error: Some(format!("{} timed out after {}s", label, timeout.as_secs())),
            ..Default::default()
        }
    }

    /// Completed with exit code 0
    pub fn exited_ok(&self) -> bool {
        self.completed && self.return_code == Some(0)
    }

    /// stdout, stderr and any error message, in that order
    pub fn combined(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in [self.stdout.as_str(), self.stderr.as_str()] {
            if !part.trim().is_empty() {
                parts.push(part.trim_end());
            }
        }
        if let Some(error) = &self.error {
            parts.push(error);
        }
        parts.join("\n")
    }
}

/// Runs commands; swapped out in tests
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> ToolOutput;
}

/// Runs real subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<Receiver<String>> {
    source.map(|mut s| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = s.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Output of one stream, or `None` if it is still open at `deadline`
fn collect(stream: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = stream else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> ToolOutput {
        if spec.program.is_empty() {
            return ToolOutput::failure(format!("{}: empty command", spec.label));
        }
        debug!("Running {}: {} (cwd {})", spec.label, spec.display(), spec.cwd.display());

        let mut child = match Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::failure(format!("{}: {} not found", spec.label, spec.program));
            }
            Err(e) => return ToolOutput::failure(format!("Failed to run {}: {}", spec.label, e)),
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let start = Instant::now();
        let deadline = start + spec.timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return match (collect(stdout, deadline), collect(stderr, deadline)) {
                        (Some(out), Some(err)) => ToolOutput::success(out, err, status.code()),
                        _ => {
                            warn!(
                                "{} exited but its output stayed open past {}s",
                                spec.label,
                                spec.timeout.as_secs()
                            );
                            ToolOutput::timeout(&spec.label, spec.timeout)
                        }
                    };
                }
                Ok(None) => {
                    if start.elapsed() > spec.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        warn!("{} timed out after {}s", spec.label, spec.timeout.as_secs());
                        // Reader threads are left behind: grandchildren may still hold the pipes
                        return ToolOutput::timeout(&spec.label, spec.timeout);
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return ToolOutput::failure(format!("Failed to wait for {}: {}", spec.label, e));
                }
            }
        }
    }
}
