//! Jobs: pipelines of commands backed by a process group.

pub mod capture;
pub mod command;
pub mod status;

pub use capture::Capture;
pub use command::{
    Binding, Command, CommandKind, StageIo, StageOutcome, Streams, Wiring,
};
pub use status::{ExitStatus, InvalidTransition, StatusCell, StatusType};

use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::error::{Result, ShellError};
use command::{spawn_failure_code, spawn_process};

/// Why a line is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Typed or sourced by the user; output goes to the terminal.
    Direct,
    /// Inside `$(...)`; the last stage's stdout is captured.
    CommandSubstitution,
    /// Only checking whether a line looks like a command; nothing runs.
    Trial,
}

/// Runs the stages that live inside the shell process.
pub trait StageRunner {
    /// Run a builtin or script stage to completion on the calling thread.
    fn run_inline(&mut self, command: &Command, io: StageIo) -> StageOutcome;

    /// Package a builtin or script stage so it can run on a worker thread.
    fn detach(&mut self, command: &Command) -> Box<dyn FnOnce(StageIo) -> StageOutcome + Send>;
}

/// How a job's processes relate to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobControl {
    /// Put the job's processes in their own process group.
    pub process_group: bool,
    /// Terminal to hand to the group when the job runs in the foreground.
    pub tty: Option<RawFd>,
}

/// An executable pipeline.
#[derive(Debug)]
pub struct Job {
    description: String,
    commands: Vec<Command>,
    /// Process-group id; `None` until the first process is spawned.
    leader: Option<Pid>,
    control: JobControl,
    background: bool,
    mode: EvaluationMode,
    failures: Vec<String>,
    capture: Option<Capture>,
    output: String,
}

impl Job {
    /// Wire `commands` together: stage *i*'s stdout feeds stage *i+1*'s
    /// stdin through a pipe, explicit redirections win over the defaults,
    /// and in [`EvaluationMode::CommandSubstitution`] the last stage's
    /// stdout goes to a capture reader.
    pub fn new(
        description: impl Into<String>,
        mut commands: Vec<Command>,
        mode: EvaluationMode,
        control: JobControl,
    ) -> Result<Job> {
        if commands.is_empty() {
            return Err(ShellError::InvalidNullCommand);
        }
        let scripts = commands
            .iter()
            .filter(|c| matches!(c.kind, Some(CommandKind::Script(_))))
            .count();
        if scripts > 1 {
            return Err(ShellError::MultipleScriptStages);
        }

        let n = commands.len();
        let mut capture = None;
        let mut next_stdin: Option<Binding> = None;
        for (i, cmd) in commands.iter_mut().enumerate() {
            let wiring = std::mem::take(&mut cmd.wiring);
            let stdin = wiring
                .stdin
                .or_else(|| next_stdin.take())
                .unwrap_or(Binding::Inherit);
            let stdout = if i + 1 < n {
                let (read, write) = std::io::pipe()?;
                next_stdin = Some(Binding::PipeIn(read));
                Binding::PipeOut(write)
            } else if let Some(out) = wiring.stdout {
                out
            } else if mode == EvaluationMode::CommandSubstitution {
                let (c, write) = Capture::start()?;
                capture = Some(c);
                Binding::PipeOut(write)
            } else {
                Binding::Inherit
            };
            let stderr = if wiring.stderr_to_stdout {
                stdout.duplicate()?
            } else {
                wiring.stderr.unwrap_or(Binding::Inherit)
            };
            cmd.io = Some(StageIo {
                stdin,
                stdout,
                stderr,
            });
        }

        Ok(Job {
            description: description.into(),
            commands,
            leader: None,
            control,
            background: false,
            mode,
            failures: Vec::new(),
            capture,
            output: String::new(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn leader(&self) -> Option<Pid> {
        self.leader
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Spawn every stage front to back. Returns whether at least one stage
    /// is a real process.
    ///
    /// A builtin or script stage runs inline only when it is the whole
    /// foreground pipeline; otherwise it runs on a worker thread.
    pub fn start(&mut self, background: bool, runner: &mut dyn StageRunner) -> bool {
        self.background = background;
        let sole = self.commands.len() == 1 && !background;
        let tty = if background { None } else { self.control.tty };

        for i in 0..self.commands.len() {
            let cmd = &mut self.commands[i];
            let io = cmd.io.take().unwrap_or_else(StageIo::inherit);

            if let Some(error) = cmd.setup_error.take() {
                cmd.set_status(ExitStatus::finished(spawn_failure_code(&error)));
                self.failures.push(error.to_string());
                continue;
            }
            let Some(kind) = cmd.kind.clone() else {
                continue;
            };

            match kind {
                CommandKind::External(path) => {
                    match spawn_process(
                        &path,
                        &cmd.argv,
                        io,
                        self.control.process_group,
                        self.leader,
                        tty,
                    ) {
                        Ok(pid) => {
                            log::debug!("spawned {} as {pid}", cmd.argv.join(" "));
                            cmd.pid = Some(pid);
                            cmd.set_status(ExitStatus::running());
                            if self.leader.is_none() {
                                self.leader = Some(pid);
                                if let Some(fd) = tty {
                                    give_terminal(fd, pid);
                                }
                            }
                        }
                        Err(source) => {
                            let error = ShellError::Spawn {
                                command: cmd.argv.first().cloned().unwrap_or_default(),
                                source,
                            };
                            cmd.set_status(ExitStatus::finished(spawn_failure_code(&error)));
                            self.failures.push(error.to_string());
                        }
                    }
                }
                CommandKind::Builtin(_) | CommandKind::Script(_) if sole => {
                    cmd.set_status(ExitStatus::running());
                    let outcome = runner.run_inline(cmd, io);
                    Self::settle(cmd, outcome, &mut self.failures);
                }
                CommandKind::Builtin(_) | CommandKind::Script(_) => {
                    let task = runner.detach(cmd);
                    let spawned = std::thread::Builder::new()
                        .name(format!("stage-{}", cmd.argv.first().map_or("", |s| s.as_str())))
                        .spawn(move || task(io));
                    match spawned {
                        Ok(handle) => {
                            cmd.worker = Some(handle);
                            cmd.set_status(ExitStatus::running());
                        }
                        Err(e) => {
                            cmd.set_status(ExitStatus::finished(1));
                            self.failures.push(format!("{}: {e}", cmd.argv.join(" ")));
                        }
                    }
                }
            }
        }
        self.leader.is_some()
    }

    fn settle(cmd: &mut Command, outcome: StageOutcome, failures: &mut Vec<String>) {
        cmd.set_status(ExitStatus::finished(outcome.code));
        cmd.value = outcome.value;
        failures.extend(outcome.failure);
    }

    /// Block until every stage has finished or one process stops.
    ///
    /// Processes are waited on as a group; worker stages are joined once
    /// no process is left running. A stop ends the wait early with a
    /// [`StatusType::Paused`] status.
    pub fn wait_for_finish(&mut self) -> ExitStatus {
        loop {
            let running: Vec<Pid> = self.running_pids();
            let Some(&first) = running.first() else {
                break;
            };
            let target = match (self.control.process_group, self.leader) {
                (true, Some(leader)) => Pid::from_raw(-leader.as_raw()),
                _ => first,
            };
            match waitpid(target, Some(WaitPidFlag::WUNTRACED)) {
                Ok(status) => {
                    self.apply(status);
                    if self.is_paused() {
                        return self.status();
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    log::warn!("wait for {}: {e}", self.description);
                    for cmd in &mut self.commands {
                        if cmd.pid.is_some() && cmd.status().kind == StatusType::Running {
                            cmd.set_status(ExitStatus::finished(1));
                        }
                    }
                    break;
                }
            }
        }

        for cmd in &mut self.commands {
            if let Some(outcome) = cmd.reap_worker(true) {
                Self::settle(cmd, outcome, &mut self.failures);
            }
        }
        self.collect_output();
        self.status()
    }

    /// Non-blocking check of a background job. Returns the status so far.
    pub fn poll(&mut self) -> ExitStatus {
        for pid in self.running_pids() {
            loop {
                let target = match (self.control.process_group, self.leader) {
                    (true, Some(leader)) => Pid::from_raw(-leader.as_raw()),
                    _ => pid,
                };
                match waitpid(target, Some(WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => break,
                    Ok(status) => self.apply(status),
                    Err(Errno::EINTR) => continue,
                    Err(_) => break,
                }
            }
        }
        for cmd in &mut self.commands {
            if let Some(outcome) = cmd.reap_worker(false) {
                Self::settle(cmd, outcome, &mut self.failures);
            }
        }
        if self.is_finished() {
            self.collect_output();
        }
        self.status()
    }

    fn running_pids(&self) -> Vec<Pid> {
        self.commands
            .iter()
            .filter(|c| c.status().kind == StatusType::Running)
            .filter_map(|c| c.pid)
            .collect()
    }

    fn apply(&mut self, status: WaitStatus) {
        let (pid, next) = match status {
            WaitStatus::Exited(pid, code) => (pid, ExitStatus::finished(code)),
            WaitStatus::Signaled(pid, sig, _) => (pid, ExitStatus::aborted(sig as i32)),
            WaitStatus::Stopped(pid, sig) => (pid, ExitStatus::paused(sig as i32)),
            WaitStatus::Continued(pid) => (pid, ExitStatus::running()),
            _ => return,
        };
        log::debug!("{pid}: {:?} {}", next.kind, next.value);
        if let Some(cmd) = self.commands.iter_mut().find(|c| c.pid == Some(pid)) {
            cmd.set_status(next);
        }
    }

    fn collect_output(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        self.output = capture.finish();
        if let Some(last) = self.commands.last()
            && let Some(value) = &last.value
        {
            self.output.push_str(value);
        }
    }

    /// Send `SIGCONT` to the job's paused processes and mark them running.
    pub fn resume(&mut self, background: bool) -> Result<()> {
        self.background = background;
        match (self.control.process_group, self.leader) {
            (true, Some(leader)) => signal::killpg(leader, Signal::SIGCONT).map_err(io_error)?,
            _ => {
                for cmd in &self.commands {
                    if let Some(pid) = cmd.pid
                        && cmd.status().kind == StatusType::Paused
                    {
                        signal::kill(pid, Signal::SIGCONT).map_err(io_error)?;
                    }
                }
            }
        }
        for cmd in &mut self.commands {
            if cmd.status().kind == StatusType::Paused {
                cmd.set_status(ExitStatus::running());
            }
        }
        Ok(())
    }

    /// Deliver `signal` to every live process of the job.
    pub fn signal(&self, sig: Signal) -> Result<()> {
        match (self.control.process_group, self.leader) {
            (true, Some(leader)) => signal::killpg(leader, sig).map_err(io_error)?,
            _ => {
                for pid in self.commands.iter().filter(|c| !c.status().kind.is_terminal()).filter_map(|c| c.pid) {
                    signal::kill(pid, sig).map_err(io_error)?;
                }
            }
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.commands
            .iter()
            .any(|c| c.status().kind == StatusType::Paused)
    }

    pub fn is_finished(&self) -> bool {
        self.commands.iter().all(|c| c.status().kind.is_terminal())
    }

    /// The job's status: paused if any stage is paused, else the last stage's.
    pub fn status(&self) -> ExitStatus {
        if let Some(paused) = self
            .commands
            .iter()
            .find(|c| c.status().kind == StatusType::Paused)
        {
            return paused.status();
        }
        self.commands
            .last()
            .map(|c| c.status())
            .unwrap_or_default()
    }

    /// Failure messages collected so far; draining them marks them reported.
    pub fn take_failures(&mut self) -> Vec<String> {
        std::mem::take(&mut self.failures)
    }

    /// Captured text of a command-substitution job.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

fn io_error(e: Errno) -> ShellError {
    ShellError::Io(std::io::Error::from(e))
}

/// Make `pgid` the terminal's foreground process group.
pub(crate) fn give_terminal(fd: RawFd, pgid: Pid) {
    // SAFETY: tcsetpgrp only reads its arguments.
    if unsafe { libc::tcsetpgrp(fd, pgid.as_raw()) } != 0 {
        log::debug!(
            "tcsetpgrp({fd}, {pgid}): {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Runs builtin stages by writing their argv to stdout.
    struct Echo;

    impl StageRunner for Echo {
        fn run_inline(&mut self, command: &Command, io: StageIo) -> StageOutcome {
            let mut streams = io.into_streams();
            let _ = writeln!(streams.stdout, "{}", command.argv()[1..].join(" "));
            StageOutcome::default()
        }

        fn detach(&mut self, command: &Command) -> Box<dyn FnOnce(StageIo) -> StageOutcome + Send> {
            let words = command.argv()[1..].join(" ");
            Box::new(move |io| {
                let mut streams = io.into_streams();
                let _ = writeln!(streams.stdout, "{words}");
                StageOutcome::default()
            })
        }
    }

    fn external(argv: &[&str]) -> Command {
        let path = ["/bin", "/usr/bin"]
            .iter()
            .map(|d| PathBuf::from(d).join(argv[0]))
            .find(|p| p.exists())
            .unwrap();
        Command::new(
            argv.iter().map(|s| s.to_string()).collect(),
            CommandKind::External(path),
            Wiring::default(),
        )
    }

    #[test]
    fn empty_job_rejected() {
        assert!(matches!(
            Job::new("", vec![], EvaluationMode::Direct, JobControl::default()),
            Err(ShellError::InvalidNullCommand)
        ));
    }

    #[test]
    fn two_script_stages_rejected() {
        let script = |s: &str| {
            Command::new(
                vec![s.into()],
                CommandKind::Script(crate::engine::ScriptCall::Execute(s.into())),
                Wiring::default(),
            )
        };
        assert!(matches!(
            Job::new("", vec![script("a"), script("b")], EvaluationMode::Direct, JobControl::default()),
            Err(ShellError::MultipleScriptStages)
        ));
    }

    #[test]
    fn capture_pipeline_output() {
        let mut job = Job::new(
            "printf 1 | cat",
            vec![external(&["printf", "1\\n"]), external(&["cat"])],
            EvaluationMode::CommandSubstitution,
            JobControl::default(),
        )
        .unwrap();
        assert!(job.start(false, &mut Echo));
        let status = job.wait_for_finish();
        assert!(status.is_success());
        assert_eq!(job.take_output(), "1\n");
    }

    #[test]
    fn last_stage_status_wins() {
        let mut job = Job::new(
            "false | true",
            vec![external(&["false"]), external(&["true"])],
            EvaluationMode::Direct,
            JobControl::default(),
        )
        .unwrap();
        job.start(false, &mut Echo);
        assert!(job.wait_for_finish().is_success());

        let mut job = Job::new(
            "true | false",
            vec![external(&["true"]), external(&["false"])],
            EvaluationMode::Direct,
            JobControl::default(),
        )
        .unwrap();
        job.start(false, &mut Echo);
        assert_eq!(job.wait_for_finish(), ExitStatus::finished(1));
    }

    #[test]
    fn failed_stage_still_lets_pipeline_finish() {
        let missing = Command::failed(
            vec!["nope".into()],
            ShellError::CommandNotFound {
                name: "nope".into(),
                suggestion: None,
            },
        );
        let mut job = Job::new(
            "nope | cat",
            vec![missing, external(&["cat"])],
            EvaluationMode::CommandSubstitution,
            JobControl::default(),
        )
        .unwrap();
        job.start(false, &mut Echo);
        assert!(job.wait_for_finish().is_success());
        assert_eq!(job.take_failures(), vec!["nope: command not found!"]);
        assert_eq!(job.commands()[0].status(), ExitStatus::finished(127));
    }

    #[test]
    fn builtin_stage_runs_on_worker_in_pipeline() {
        let builtin = Command::new(
            vec!["say".into(), "hi".into()],
            CommandKind::Script(crate::engine::ScriptCall::Execute("say".into())),
            Wiring::default(),
        );
        let mut job = Job::new(
            "say hi | cat",
            vec![builtin, external(&["cat"])],
            EvaluationMode::CommandSubstitution,
            JobControl::default(),
        )
        .unwrap();
        assert!(job.start(false, &mut Echo));
        assert!(job.commands()[0].worker.is_some());
        job.wait_for_finish();
        assert_eq!(job.take_output(), "hi\n");
    }

    #[test]
    fn sole_stage_runs_inline() {
        let builtin = Command::new(
            vec!["say".into(), "x".into()],
            CommandKind::Script(crate::engine::ScriptCall::Execute("say".into())),
            Wiring::default(),
        );
        let mut job = Job::new(
            "say x",
            vec![builtin],
            EvaluationMode::CommandSubstitution,
            JobControl::default(),
        )
        .unwrap();
        assert!(!job.start(false, &mut Echo));
        assert!(job.is_finished());
        job.wait_for_finish();
        assert_eq!(job.take_output(), "x\n");
    }

    #[test]
    fn stop_then_continue() {
        let mut job = Job::new(
            "sleep 5",
            vec![external(&["sleep", "5"])],
            EvaluationMode::Direct,
            JobControl::default(),
        )
        .unwrap();
        job.start(true, &mut Echo);
        let pid = job.commands()[0].pid().unwrap();
        signal::kill(pid, Signal::SIGSTOP).unwrap();
        let status = job.wait_for_finish();
        assert_eq!(status.kind, StatusType::Paused);

        job.resume(false).unwrap();
        assert_eq!(job.commands()[0].status().kind, StatusType::Running);
        job.signal(Signal::SIGTERM).unwrap();
        let status = job.wait_for_finish();
        assert_eq!(status, ExitStatus::aborted(Signal::SIGTERM as i32));
    }
}
