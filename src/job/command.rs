//! One pipeline stage: argv, dispatch kind, stream bindings and status.

use std::fs::File;
use std::io::{IsTerminal, PipeReader, PipeWriter, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::thread::JoinHandle;

use nix::unistd::Pid;

use super::status::{ExitStatus, StatusCell};
use crate::builtins::Builtin;
use crate::engine::ScriptCall;
use crate::error::ShellError;

/// Where one standard stream of a stage is connected.
#[derive(Debug)]
pub enum Binding {
    /// The shell's own stream.
    Inherit,
    File(File),
    PipeIn(PipeReader),
    PipeOut(PipeWriter),
}

impl Binding {
    /// A second handle to the same destination, for `2>&1`.
    /// `Inherit` is resolved to a duplicate of the shell's stdout.
    pub fn duplicate(&self) -> std::io::Result<Binding> {
        Ok(match self {
            Binding::Inherit => {
                Binding::File(File::from(std::io::stdout().as_fd().try_clone_to_owned()?))
            }
            Binding::File(f) => Binding::File(f.try_clone()?),
            Binding::PipeIn(r) => Binding::PipeIn(r.try_clone()?),
            Binding::PipeOut(w) => Binding::PipeOut(w.try_clone()?),
        })
    }

    fn into_stdio(self) -> Stdio {
        match self {
            Binding::Inherit => Stdio::inherit(),
            Binding::File(f) => f.into(),
            Binding::PipeIn(r) => r.into(),
            Binding::PipeOut(w) => w.into(),
        }
    }

    fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Binding::Inherit => Box::new(std::io::stdin()),
            Binding::File(f) => Box::new(f),
            Binding::PipeIn(r) => Box::new(r),
            Binding::PipeOut(_) => Box::new(std::io::empty()),
        }
    }

    fn into_writer(self, error: bool) -> Box<dyn Write + Send> {
        match self {
            Binding::Inherit if error => Box::new(std::io::stderr()),
            Binding::Inherit => Box::new(std::io::stdout()),
            Binding::File(f) => Box::new(f),
            Binding::PipeOut(w) => Box::new(w),
            Binding::PipeIn(_) => Box::new(std::io::sink()),
        }
    }
}

/// Explicit redirections of a stage, already opened.
/// `None` means "whatever the pipeline position gives".
#[derive(Debug, Default)]
pub struct Wiring {
    pub stdin: Option<Binding>,
    pub stdout: Option<Binding>,
    pub stderr: Option<Binding>,
    /// `2>&1`, `&>` or `|&`: stderr follows stdout.
    pub stderr_to_stdout: bool,
}

/// The final bindings of a stage, fixed when its job is built.
#[derive(Debug)]
pub struct StageIo {
    pub stdin: Binding,
    pub stdout: Binding,
    pub stderr: Binding,
}

impl StageIo {
    pub fn inherit() -> Self {
        StageIo {
            stdin: Binding::Inherit,
            stdout: Binding::Inherit,
            stderr: Binding::Inherit,
        }
    }

    /// Reader/writer handles for stages that run inside the shell.
    pub fn into_streams(self) -> Streams {
        let terminal = matches!(self.stdout, Binding::Inherit) && std::io::stdout().is_terminal();
        Streams {
            terminal,
            stdin: self.stdin.into_reader(),
            stdout: self.stdout.into_writer(false),
            stderr: self.stderr.into_writer(true),
        }
    }
}

/// Stream handles given to a builtin or script stage.
pub struct Streams {
    /// stdout is the shell's own terminal.
    pub terminal: bool,
    pub stdin: Box<dyn Read + Send>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

/// How a stage is run.
#[derive(Clone)]
pub enum CommandKind {
    /// An executable, by full path.
    External(PathBuf),
    Builtin(Arc<dyn Builtin>),
    Script(ScriptCall),
}

impl CommandKind {
    pub fn is_process(&self) -> bool {
        matches!(self, CommandKind::External(_))
    }
}

impl std::fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::External(path) => f.debug_tuple("External").field(path).finish(),
            CommandKind::Builtin(_) => f.write_str("Builtin"),
            CommandKind::Script(call) => f.debug_tuple("Script").field(call).finish(),
        }
    }
}

/// Result of a stage that ran inside the shell.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub code: i32,
    /// Stringified script value, if the stage was a script call.
    pub value: Option<String>,
    pub failure: Option<String>,
}

impl StageOutcome {
    pub fn from_result(result: crate::Result<i32>) -> Self {
        match result {
            Ok(code) => StageOutcome {
                code,
                ..Default::default()
            },
            Err(e) => StageOutcome {
                code: 1,
                value: None,
                failure: Some(e.to_string()),
            },
        }
    }
}

/// One stage of a job.
#[derive(Debug)]
pub struct Command {
    pub(crate) argv: Vec<String>,
    /// `None` when the stage failed to resolve; `setup_error` says why.
    pub(crate) kind: Option<CommandKind>,
    pub(crate) wiring: Wiring,
    pub(crate) io: Option<StageIo>,
    pub(crate) setup_error: Option<ShellError>,
    pub(crate) status: StatusCell,
    pub(crate) pid: Option<Pid>,
    pub(crate) worker: Option<JoinHandle<StageOutcome>>,
    pub(crate) value: Option<String>,
}

impl Command {
    pub fn new(argv: Vec<String>, kind: CommandKind, wiring: Wiring) -> Self {
        Command {
            argv,
            kind: Some(kind),
            wiring,
            io: None,
            setup_error: None,
            status: StatusCell::default(),
            pid: None,
            worker: None,
            value: None,
        }
    }

    /// A stage that could not be set up. It still occupies its pipeline slot
    /// so its neighbours see EOF instead of hanging.
    pub fn failed(argv: Vec<String>, error: ShellError) -> Self {
        Command {
            kind: None,
            setup_error: Some(error),
            ..Command::new(argv, CommandKind::External(PathBuf::new()), Wiring::default())
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn kind(&self) -> Option<&CommandKind> {
        self.kind.as_ref()
    }

    pub fn status(&self) -> ExitStatus {
        self.status.get()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub(crate) fn set_status(&mut self, next: ExitStatus) {
        if let Err(e) = self.status.set(next) {
            log::debug!("{}: {e}", self.argv.first().map_or("", |s| s.as_str()));
        }
    }

    /// Collect a finished worker, if there is one and it is done
    /// (or unconditionally when `block`).
    pub(crate) fn reap_worker(&mut self, block: bool) -> Option<StageOutcome> {
        let ready = self.worker.as_ref()?.is_finished();
        if !ready && !block {
            return None;
        }
        let handle = self.worker.take()?;
        let outcome = handle.join().unwrap_or_else(|_| StageOutcome {
            code: 1,
            value: None,
            failure: Some(format!("{}: stage panicked", self.argv.join(" "))),
        });
        Some(outcome)
    }
}

/// Spawn an external stage.
///
/// With `group` set the child joins that process group (or starts its own
/// when `leader` is `None`). With `tty` set the child takes the terminal
/// before exec. Either way it restores default job-control signal handling.
pub(crate) fn spawn_process(
    path: &Path,
    argv: &[String],
    io: StageIo,
    group: bool,
    leader: Option<Pid>,
    tty: Option<RawFd>,
) -> std::io::Result<Pid> {
    let mut cmd = std::process::Command::new(path);
    if let Some((name, args)) = argv.split_first() {
        cmd.arg0(name).args(args);
    }
    cmd.stdin(io.stdin.into_stdio())
        .stdout(io.stdout.into_stdio())
        .stderr(io.stderr.into_stdio());

    if group {
        cmd.process_group(leader.map_or(0, |p| p.as_raw()));
        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe libc functions.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(fd) = tty {
                    libc::tcsetpgrp(fd, libc::getpgrp());
                }
                for sig in [
                    libc::SIGINT,
                    libc::SIGQUIT,
                    libc::SIGTSTP,
                    libc::SIGTTIN,
                    libc::SIGTTOU,
                ] {
                    libc::signal(sig, libc::SIG_DFL);
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);
    if group {
        // Also from the parent, so the group exists before we wait on it.
        let _ = nix::unistd::setpgid(pid, leader.unwrap_or(pid));
    }
    Ok(pid)
}

/// Exit code for a stage that could not be spawned.
pub(crate) fn spawn_failure_code(error: &ShellError) -> i32 {
    match error {
        ShellError::CommandNotFound { .. } => 127,
        ShellError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
        ShellError::Spawn { .. } => 126,
        _ => 1,
    }
}
