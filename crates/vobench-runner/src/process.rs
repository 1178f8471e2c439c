//! External process choreography: broker, algorithm node, replay.
//!
//! The broker, the algorithm and the replay process share no synchronization
//! primitive with the orchestrator, so ordering is enforced with fixed delays
//! (see [`crate::config::Timing`]). Exit codes are logged but never used to
//! judge success; only the output artifact counts.

use crate::algorithm::Invocation;
use crate::config::Timing;
use crate::error::{BenchError, Result};
use std::fmt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Discard stdout/stderr.
    pub quiet: bool,
}

impl CommandLine {
    pub fn new<I>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().collect(),
            quiet: false,
        }
    }

    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BenchError::config("empty command"))?;
        Ok(Self::new(program, args.iter().cloned()))
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        if self.quiet {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_join(&self.argv()))
    }
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// A background process owned by the orchestrator.
pub trait ManagedProcess {
    fn id(&self) -> Option<u32>;
    /// Stop the process and reap it. Must be safe to call more than once.
    fn terminate(&mut self, grace: Duration) -> Result<()>;
}

/// Seam between batch logic and the operating system.
pub trait ProcessLauncher {
    /// Start `command` in the background.
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ManagedProcess>>;
    /// Run `command` to completion. The exit status is informational.
    fn run(&self, command: &CommandLine) -> Result<Option<i32>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ManagedProcess>> {
        let child = command
            .to_command()
            .spawn()
            .map_err(|source| BenchError::Process {
                command: command.to_string(),
                source,
            })?;
        debug!(pid = child.id(), command = %command, "spawned");
        Ok(Box::new(ChildProcess {
            label: command.to_string(),
            child,
            reaped: false,
        }))
    }

    fn run(&self, command: &CommandLine) -> Result<Option<i32>> {
        let status = command
            .to_command()
            .status()
            .map_err(|source| BenchError::Process {
                command: command.to_string(),
                source,
            })?;
        debug!(status = %status, command = %command, "exited");
        Ok(status.code())
    }
}

struct ChildProcess {
    label: String,
    child: Child,
    reaped: bool,
}

impl ChildProcess {
    fn wait_until(&mut self, deadline: Instant) -> Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

impl ManagedProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        if self.child.try_wait()?.is_none() {
            // SIGINT lets ROS nodes run their shutdown hooks and flush files.
            send_interrupt(self.child.id());
            if self.wait_until(Instant::now() + grace)?.is_none() {
                warn!(process = %self.label, "did not exit after SIGINT, killing");
                let _ = self.child.kill();
                self.child.wait()?;
            }
        }
        self.reaped = true;
        debug!(process = %self.label, "terminated");
        Ok(())
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) {
    let _ = Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn send_interrupt(_pid: u32) {}

/// Keeps the shared broker alive for the duration of a batch and tears it down
/// on drop, including on error paths.
pub struct BrokerGuard {
    process: Box<dyn ManagedProcess>,
    grace: Duration,
}

impl BrokerGuard {
    pub fn start(
        launcher: &dyn ProcessLauncher,
        command: &CommandLine,
        timing: &Timing,
    ) -> Result<Self> {
        for remaining in (1..=timing.countdown_secs).rev() {
            info!("start broker in {} sec", remaining);
            thread::sleep(Duration::from_secs(1));
        }
        let process = launcher.spawn(command)?;
        info!(command = %command, pid = ?process.id(), "broker started");
        thread::sleep(timing.broker_startup());
        Ok(Self {
            process,
            grace: timing.teardown_grace(),
        })
    }
}

impl Drop for BrokerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.process.terminate(self.grace) {
            warn!(error = %e, "broker teardown failed");
        }
    }
}

/// Executes one run's processes with the ordering its shape requires.
/// Returns once every process of the run has exited.
pub fn drive_run(
    launcher: &dyn ProcessLauncher,
    invocation: &Invocation,
    timing: &Timing,
) -> Result<()> {
    match invocation {
        Invocation::SingleShot { command } => {
            let code = launcher.run(command)?;
            debug!(?code, "single-shot run finished");
        }
        Invocation::LiveReplay { node, replay } => {
            let mut node_proc = launcher.spawn(node)?;
            thread::sleep(timing.settle());
            let replayed = launcher.run(replay);
            if replayed.is_ok() {
                thread::sleep(timing.flush());
            }
            let stopped = node_proc.terminate(timing.teardown_grace());
            let code = replayed?;
            stopped?;
            debug!(?code, "replay finished");
        }
    }
    Ok(())
}

/// Adds read/write for everyone on every entry under `root`, like
/// `chmod -R a+rw`. External nodes may run under another uid, so single
/// failures are logged and skipped.
pub fn normalize_permissions(root: &Path) -> usize {
    let mut failures = 0;
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "cannot walk output tree");
                failures += 1;
                continue;
            }
        };
        if let Err(e) = add_rw_for_all(entry.path()) {
            warn!(path = %entry.path().display(), error = %e, "chmod a+rw failed");
            failures += 1;
        }
    }
    failures
}

#[cfg(unix)]
fn add_rw_for_all(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mode = meta.permissions().mode();
    if mode & 0o666 != 0o666 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o666))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn add_rw_for_all(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
