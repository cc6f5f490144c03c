//! Running git.
//!
//! Everything that spawns a process goes through [`GitExecutor`], so the
//! staging and conflict layers can be tested against a scripted fake.

use crate::ProcessError;
use crate::config::Config;
use crate::patch::{Prompt, detect_prompt};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One git command line to run in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments after the git binary
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Text written to stdin before it is closed
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(cwd: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Arguments joined for logs and error messages.
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

/// Captured result of a finished git process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was ended by a signal
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// Turn a non-zero exit code into [`ProcessError::ExitStatus`].
    pub fn check(self, invocation: &Invocation) -> Result<Self, ProcessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProcessError::ExitStatus {
                command: invocation.command_line(),
                code: self.exit_code,
                output: self.combined().trim_end().to_string(),
            })
        }
    }
}

/// Runs git commands.
pub trait GitExecutor {
    /// Run to completion, feeding [`Invocation::stdin`] if present.
    fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;

    /// Start an interactive patch command whose prompts are answered one by one.
    fn open_session(&self, invocation: &Invocation)
    -> Result<Box<dyn PatchSession>, ProcessError>;
}

/// A running `--patch` command.
pub trait PatchSession {
    /// Wait for the next prompt. `None` once git has stopped asking.
    fn next_prompt(&mut self) -> Result<Option<Prompt>, ProcessError>;

    /// Send one answer line.
    fn answer(&mut self, answer: &str) -> Result<(), ProcessError>;

    /// Close stdin and wait for git to exit.
    fn finish(self: Box<Self>) -> Result<ProcessOutput, ProcessError>;
}

/// [`GitExecutor`] that spawns the system git binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
    timeout: Duration,
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SystemGit {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.git_binary.clone(), config.timeout)
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, ProcessError> {
        Command::new(&self.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            // Untranslated prompts and no pager or editor popping up
            .env("LC_ALL", "C")
            .env("GIT_PAGER", "cat")
            .env("GIT_EDITOR", "true")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: invocation.command_line(),
                message: e.to_string(),
            })
    }
}

impl GitExecutor for SystemGit {
    fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        log::debug!("[SystemGit] git {}", invocation.command_line());
        let mut child = self.spawn(invocation)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let mut stdin = take_stdin(&mut child, invocation)?;
        if let Some(input) = &invocation.stdin {
            write_ignoring_hangup(&mut stdin, input, invocation)?;
        }
        drop(stdin);

        let deadline = Instant::now() + self.timeout;
        let status = wait_until(&mut child, deadline, self.timeout, invocation)?;

        Ok(ProcessOutput {
            stdout: join_output(stdout)?,
            stderr: join_output(stderr)?,
            exit_code: exit_code(status),
        })
    }

    fn open_session(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn PatchSession>, ProcessError> {
        log::debug!("[SystemGit] git {} (interactive)", invocation.command_line());
        let mut child = self.spawn(invocation)?;
        let stdin = take_stdin(&mut child, invocation)?;
        let stderr = drain(child.stderr.take());

        let (sender, output) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::debug!("[SystemGit] stopped reading patch output: {e}");
                            break;
                        }
                        Ok(n) => {
                            if sender.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        Ok(Box::new(SystemPatchSession {
            child,
            stdin: Some(stdin),
            output,
            stderr: Some(stderr),
            transcript: String::new(),
            pending: Vec::new(),
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            invocation: invocation.clone(),
        }))
    }
}

struct SystemPatchSession {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Receiver<Vec<u8>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    /// Output belonging to prompts already answered
    transcript: String,
    /// Output since the last prompt
    pending: Vec<u8>,
    deadline: Instant,
    timeout: Duration,
    invocation: Invocation,
}

impl SystemPatchSession {
    fn timed_out(&mut self) -> ProcessError {
        kill(&mut self.child);
        timeout_error(&self.invocation, self.timeout)
    }
}

impl PatchSession for SystemPatchSession {
    fn next_prompt(&mut self) -> Result<Option<Prompt>, ProcessError> {
        loop {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            if let Some(prompt) = detect_prompt(&text) {
                self.transcript.push_str(&text);
                self.pending.clear();
                return Ok(Some(prompt));
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            match self.output.recv_timeout(remaining) {
                Ok(bytes) => self.pending.extend_from_slice(&bytes),
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
            }
        }
    }

    fn answer(&mut self, answer: &str) -> Result<(), ProcessError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ProcessError::StdinUnavailable {
                command: self.invocation.command_line(),
            });
        };
        self.transcript.push_str(answer);
        self.transcript.push('\n');
        write_ignoring_hangup(stdin, &format!("{answer}\n"), &self.invocation)
    }

    fn finish(mut self: Box<Self>) -> Result<ProcessOutput, ProcessError> {
        drop(self.stdin.take());

        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            match self.output.recv_timeout(remaining) {
                Ok(bytes) => self.pending.extend_from_slice(&bytes),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
            }
        }

        let status = wait_until(&mut self.child, self.deadline, self.timeout, &self.invocation)?;
        let stderr = match self.stderr.take() {
            Some(handle) => join_output(handle)?,
            None => String::new(),
        };

        let mut stdout = std::mem::take(&mut self.transcript);
        stdout.push_str(&String::from_utf8_lossy(&self.pending));

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: exit_code(status),
        })
    }
}

impl Drop for SystemPatchSession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            kill(&mut self.child);
        }
    }
}

fn take_stdin(child: &mut Child, invocation: &Invocation) -> Result<ChildStdin, ProcessError> {
    child.stdin.take().ok_or_else(|| ProcessError::StdinUnavailable {
        command: invocation.command_line(),
    })
}

/// Write to git's stdin. A closed pipe means git already exited, which its
/// exit status reports.
fn write_ignoring_hangup(
    stdin: &mut ChildStdin,
    text: &str,
    invocation: &Invocation,
) -> Result<(), ProcessError> {
    match stdin.write_all(text.as_bytes()).and_then(|()| stdin.flush()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            log::debug!("[SystemGit] git {} closed stdin early", invocation.command_line());
            Ok(())
        }
        Err(e) => Err(ProcessError::WriteFailed {
            command: invocation.command_line(),
            message: e.to_string(),
        }),
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader
            && let Err(e) = reader.read_to_end(&mut buf)
        {
            log::debug!("[SystemGit] output truncated after {} bytes: {e}", buf.len());
        }
        buf
    })
}

fn join_output(handle: JoinHandle<Vec<u8>>) -> Result<String, ProcessError> {
    let bytes = handle.join().map_err(|_| ProcessError::ReadFailed {
        message: "output reader thread panicked".to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn wait_until(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
    invocation: &Invocation,
) -> Result<ExitStatus, ProcessError> {
    loop {
        let status = child.try_wait().map_err(|e| ProcessError::WaitFailed {
            command: invocation.command_line(),
            message: e.to_string(),
        })?;
        if let Some(status) = status {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            kill(child);
            return Err(timeout_error(invocation, timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn timeout_error(invocation: &Invocation, timeout: Duration) -> ProcessError {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    log::warn!("[SystemGit] git {} timed out after {millis}ms", invocation.command_line());
    ProcessError::TimedOut {
        command: invocation.command_line(),
        millis,
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("[SystemGit] kill failed: {e}");
    }
    let _ = child.wait();
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
