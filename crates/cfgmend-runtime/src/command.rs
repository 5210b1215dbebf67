//! Blocking external command execution with a deadline.
//!
//! The child runs in its own process group and is polled until it exits.
//! The whole group is killed once the deadline passes or an interrupt was
//! requested, and the caller treats either case as a failure of whichever
//! collaborator the command stood for. Helpers the child leaves behind are
//! killed with the group after it exits, so nothing keeps writing into the
//! build tree once the call has returned.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Extra time granted to the output readers after the group is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

static INTERRUPT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Cancellation flag polled by running commands and by the reconciler.
///
/// [`Interrupt::global`] is the flag the signal handler sets. Callers that
/// need isolation can point at a flag of their own.
#[derive(Debug, Clone, Copy)]
pub struct Interrupt(&'static AtomicBool);

impl Interrupt {
    pub const fn new(flag: &'static AtomicBool) -> Self {
        Self(flag)
    }

    pub fn global() -> Self {
        Self(&INTERRUPT_REQUESTED)
    }

    pub fn request(self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::global()
    }
}

/// Ask every running bounded command to stop at its next poll.
pub fn request_interrupt() {
    Interrupt::global().request();
}

pub fn interrupt_requested() -> bool {
    Interrupt::global().is_requested()
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("'{program}' interrupted")]
    Interrupted { program: String },
    #[error("I/O error while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, for compact error messages.
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
    }
}

#[derive(Debug, Clone)]
pub struct BoundedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub interrupt: Interrupt,
}

impl BoundedCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
            interrupt: Interrupt::global(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    pub fn run(&self) -> Result<CommandOutput, CommandError> {
        if self.interrupt.is_requested() {
            return Err(CommandError::Interrupted {
                program: self.program.clone(),
            });
        }
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        debug!("running '{}' (timeout {}s)", self.display(), self.timeout.as_secs());
        let deadline = Instant::now() + self.timeout;
        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child, deadline)?;
        // leftover group members would hold the pipes open
        kill_group(&child);

        Ok(CommandOutput {
            status,
            stdout: self.collect(stdout, deadline)?,
            stderr: self.collect(stderr, deadline)?,
        })
    }

    fn wait(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus, CommandError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(source) => {
                    terminate(child);
                    return Err(CommandError::Wait {
                        program: self.program.clone(),
                        source,
                    });
                }
            }

            if self.interrupt.is_requested() {
                terminate(child);
                return Err(CommandError::Interrupted {
                    program: self.program.clone(),
                });
            }
            if Instant::now() >= deadline {
                warn!(
                    "'{}' exceeded {}s, killing its process group",
                    self.display(),
                    self.timeout.as_secs()
                );
                terminate(child);
                return Err(self.timed_out());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for a reader until the deadline. A process that left the group
    /// can still hold the pipe, so the wait is bounded.
    fn collect(
        &self,
        reader: Option<Receiver<String>>,
        deadline: Instant,
    ) -> Result<String, CommandError> {
        let Some(rx) = reader else {
            return Ok(String::new());
        };
        let budget = deadline.saturating_duration_since(Instant::now()) + DRAIN_GRACE;
        match rx.recv_timeout(budget) {
            Ok(text) => Ok(text),
            Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
            Err(RecvTimeoutError::Timeout) => {
                warn!("'{}' left its output pipes open past the deadline", self.display());
                Err(self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> CommandError {
        CommandError::TimedOut {
            program: self.program.clone(),
            timeout: self.timeout,
        }
    }
}

/// Kill the child's whole process group, then reap the child.
fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Ok(raw) = i32::try_from(child.id()) {
        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut reader| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}
