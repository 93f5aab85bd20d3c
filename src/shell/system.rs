//! The job-control shell: runs lines as jobs of builtins, executables and
//! script stages.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builtins::{Builtin, CALL, Invocation, Noop, ShellAccess};
use crate::config::Config;
use crate::engine::{self, ScriptCall, ScriptEngine, SharedEngine};
use crate::error::{ErrorKind, Result, ShellError, suggest};
use crate::expand::{Expand, interpolate, interpolate_all, interpolate_target, resolve_aliases};
use crate::job::{
    Binding, Command, CommandKind, EvaluationMode, ExitStatus, Job, StageIo, StageOutcome,
    StageRunner, StatusType, Wiring, give_terminal,
};
use crate::parse::{
    Chain, ErrorTarget, OutputTarget, Redirections, Stage, expand_braces, split_chains,
    split_groups, split_pipeline,
};

use super::completion::{self, Snapshot};
use super::executables::is_executable;
use super::{Shell, ShellState, Terminal, environ};

/// Outcome of one line.
#[derive(Debug, Clone)]
pub struct LineResult {
    pub status: ExitStatus,
    /// Captured output, in [`EvaluationMode::CommandSubstitution`] only.
    pub output: String,
}

impl Default for LineResult {
    fn default() -> Self {
        LineResult {
            status: ExitStatus::success(),
            output: String::new(),
        }
    }
}

/// Position inside a script being sourced, for failure messages.
#[derive(Debug)]
struct SourceFrame {
    path: PathBuf,
    line: usize,
}

pub struct SystemShell {
    state: ShellState,
    /// Background and suspended jobs; job `n` is `jobs[n - 1]`.
    jobs: Vec<Job>,
    engine: SharedEngine,
    terminal: Terminal,
    interactive: bool,
    /// Mode of the job currently being started, for inline builtins.
    mode: EvaluationMode,
    sourcing: HashSet<PathBuf>,
    frames: Vec<SourceFrame>,
    last_status: ExitStatus,
    exit_code: Option<i32>,
}

impl SystemShell {
    /// Build a shell from `config`. An interactive shell takes the terminal,
    /// exports its session variables and loads history.
    pub fn new(config: &Config, engine: Box<dyn ScriptEngine>, interactive: bool) -> Self {
        let state = ShellState::from_config(config);
        state.rehash();
        let terminal = if interactive {
            Terminal::acquire()
        } else {
            Terminal::detached()
        };
        let mut shell = SystemShell {
            state,
            jobs: Vec::new(),
            engine: engine::shared(engine),
            terminal,
            interactive,
            mode: EvaluationMode::Direct,
            sourcing: HashSet::new(),
            frames: Vec::new(),
            last_status: ExitStatus::success(),
            exit_code: None,
        };
        if interactive {
            environ::export_session();
            shell.state.history.load();
            log::info!("session start, pid {}", std::process::id());
        }
        if let Ok(cwd) = std::env::current_dir() {
            shell.state.push_dir(cwd);
        }
        shell
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn last_status(&self) -> ExitStatus {
        self.last_status
    }

    /// Set `${0}`, `${1}`, ...
    pub fn set_positional(&mut self, args: Vec<String>) {
        self.state.positional = args;
    }

    /// Exit code requested by `exit`, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn request_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub fn record_history(&mut self, line: &str) {
        self.state.history.push(line);
    }

    pub fn save_history(&self) {
        if !self.interactive {
            return;
        }
        if let Err(e) = self.state.history.save() {
            log::warn!("saving history: {e}");
        }
    }

    /// Parse and run one line.
    ///
    /// Grammar errors in any chain abort the line before anything runs.
    /// Failures of individual stages are reported and do not abort.
    pub fn run_line(&mut self, line: &str, mode: EvaluationMode) -> Result<LineResult> {
        let chains = split_chains(line)?;
        if mode == EvaluationMode::CommandSubstitution && chains.iter().any(|c| c.background) {
            return Err(ShellError::Syntax(
                "Background jobs in command substitution are forbidden.".into(),
            ));
        }
        for chain in &chains {
            for group in split_groups(&chain.words)? {
                self.check_stages(&split_pipeline(&group.words)?)?;
            }
        }

        let mut result = LineResult::default();
        for chain in &chains {
            result.status = self.run_chain(chain, mode, &mut result.output)?;
            if self.exit_code.is_some() {
                break;
            }
        }
        self.last_status = result.status;
        Ok(result)
    }

    /// Checks that need no expansion: more than one `call` stage in a
    /// pipeline, and redirect targets that brace-expand to several words.
    fn check_stages(&self, stages: &[Stage]) -> Result<()> {
        let calls = stages
            .iter()
            .filter(|stage| {
                resolve_aliases(
                    &stage.words,
                    &self.state.aliases,
                    &self.state.options.prefix_commands,
                )
                .first()
                .is_some_and(|word| word == CALL)
            })
            .count();
        if calls > 1 {
            return Err(ShellError::MultipleScriptStages);
        }
        for stage in stages {
            let r = &stage.redirections;
            let output = match &r.output {
                Some(OutputTarget::File { path, .. }) => Some(path),
                _ => None,
            };
            let error = match &r.error {
                Some(ErrorTarget::File { path, .. }) => Some(path),
                _ => None,
            };
            for word in r.input.iter().chain(output).chain(error) {
                if expand_braces(word).len() > 1 {
                    return Err(ShellError::Syntax(format!("{word}: ambiguous redirect")));
                }
            }
        }
        Ok(())
    }

    fn run_chain(
        &mut self,
        chain: &Chain,
        mode: EvaluationMode,
        out: &mut String,
    ) -> Result<ExitStatus> {
        let groups = split_groups(&chain.words)?;
        let last = groups.len().saturating_sub(1);
        let mut status = ExitStatus::success();
        for (i, group) in groups.iter().enumerate() {
            if !group.connector.should_run(status.is_success()) {
                continue;
            }
            let background = chain.background && i == last;
            status = self.run_group(&group.words, background, mode, out)?;
            if self.exit_code.is_some() {
                break;
            }
        }
        Ok(status)
    }

    fn run_group(
        &mut self,
        words: &[String],
        background: bool,
        mode: EvaluationMode,
        out: &mut String,
    ) -> Result<ExitStatus> {
        let stages = split_pipeline(words)?;
        let mut commands = Vec::with_capacity(stages.len());
        for stage in &stages {
            commands.push(self.compile_stage(stage, mode)?);
        }
        let mut job = Job::new(words.join(" "), commands, mode, self.terminal.job_control())?;

        let saved = std::mem::replace(&mut self.mode, mode);
        job.start(background, self);
        self.mode = saved;

        if background {
            let failures = job.take_failures();
            self.report(&failures);
            self.jobs.push(job);
            if self.interactive
                && let Some(leader) = self.jobs.last().and_then(|j| j.leader())
            {
                eprintln!("[{}] {leader}", self.jobs.len());
            }
            return Ok(ExitStatus::success());
        }

        let status = job.wait_for_finish();
        self.terminal.reclaim();
        Ok(self.finish_foreground(job, status, out))
    }

    /// Report a foreground job's failures and keep it if it stopped.
    fn finish_foreground(&mut self, mut job: Job, status: ExitStatus, out: &mut String) -> ExitStatus {
        let failures = job.take_failures();
        self.report(&failures);
        out.push_str(&job.take_output());
        match status.kind {
            StatusType::Paused => {
                let description = job.description().to_string();
                self.jobs.push(job);
                eprintln!("[{}] {} {description}", self.jobs.len(), status.kind.as_str());
            }
            StatusType::Aborted => {
                if let Some(message) = status.message() {
                    eprintln!("{message}");
                }
            }
            _ => {}
        }
        status
    }

    /// Turn one stage into a command: aliases, interpolation, redirections
    /// and dispatch. Stages that cannot be resolved or opened become failed
    /// commands; interpolation errors abort the line.
    fn compile_stage(&mut self, stage: &Stage, mode: EvaluationMode) -> Result<Command> {
        let words = resolve_aliases(
            &stage.words,
            &self.state.aliases,
            &self.state.options.prefix_commands,
        );
        let argv = interpolate_all(&words, mode, self)?;
        let wiring = match self.open_redirections(&stage.redirections, mode) {
            Ok(wiring) => wiring,
            Err(e) if e.kind() == ErrorKind::Spawn => return Ok(Command::failed(argv, e)),
            Err(e) => return Err(e),
        };
        if argv.is_empty() {
            return Ok(Command::new(argv, CommandKind::Builtin(Arc::new(Noop)), wiring));
        }
        if self.state.options.trace {
            eprintln!("+ {}", argv.join(" "));
        }
        Ok(match self.resolve_kind(&argv, &words) {
            Ok(kind) => Command::new(argv, kind, wiring),
            Err(e) => Command::failed(argv, e),
        })
    }

    /// Builtin, then executable path, then `PATH` lookup, then the script
    /// engine.
    fn resolve_kind(&self, argv: &[String], words: &[String]) -> Result<CommandKind> {
        let Some(name) = argv.first() else {
            return Err(ShellError::InvalidNullCommand);
        };
        if name == CALL {
            let Some(function) = argv.get(1) else {
                return Err(ShellError::usage("call: missing function name"));
            };
            return Ok(CommandKind::Script(ScriptCall::Call {
                name: function.clone(),
                args: argv[2..].to_vec(),
            }));
        }
        if let Some(builtin) = self.state.builtins.get(name) {
            return Ok(CommandKind::Builtin(builtin));
        }
        if name.contains('/') {
            let path = PathBuf::from(name);
            if is_executable(&path) {
                return Ok(CommandKind::External(path));
            }
            let kind = if path.exists() {
                std::io::ErrorKind::PermissionDenied
            } else {
                std::io::ErrorKind::NotFound
            };
            return Err(ShellError::Spawn {
                command: name.clone(),
                source: kind.into(),
            });
        }
        if let Some(path) = self.state.executables.lookup(name) {
            return Ok(CommandKind::External(path));
        }
        let source = words.join(" ");
        if let Ok(mut engine) = self.engine.try_lock()
            && engine.compile(&source).is_ok()
        {
            return Ok(CommandKind::Script(ScriptCall::Execute(source)));
        }
        let names = self.state.command_names();
        Err(ShellError::CommandNotFound {
            name: name.clone(),
            suggestion: suggest(name, names.iter().map(String::as_str)),
        })
    }

    fn open_redirections(&mut self, redirections: &Redirections, mode: EvaluationMode) -> Result<Wiring> {
        let mut wiring = Wiring::default();
        if let Some(word) = &redirections.input {
            let path = PathBuf::from(interpolate_target(word, mode, self)?);
            let file = File::open(&path).map_err(|source| ShellError::Redirect { path, source })?;
            wiring.stdin = Some(Binding::File(file));
        }
        if let Some(OutputTarget::File { path, append }) = &redirections.output {
            wiring.stdout = Some(Binding::File(self.open_target(path, *append, mode)?));
        }
        match &redirections.error {
            Some(ErrorTarget::File { path, append }) => {
                wiring.stderr = Some(Binding::File(self.open_target(path, *append, mode)?));
            }
            Some(ErrorTarget::Stdout) => wiring.stderr_to_stdout = true,
            None => {}
        }
        Ok(wiring)
    }

    fn open_target(&mut self, word: &str, append: bool, mode: EvaluationMode) -> Result<File> {
        let path = PathBuf::from(interpolate_target(word, mode, self)?);
        OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|source| ShellError::Redirect { path, source })
    }

    /// Print failure messages, prefixed with the script position while
    /// sourcing.
    fn report(&self, failures: &[String]) {
        for message in failures {
            match self.frames.last() {
                Some(frame) => eprintln!("{}:{}: {message}", frame.path.display(), frame.line),
                None => eprintln!("{message}"),
            }
        }
    }

    /// Poll background jobs; announce and drop the finished ones.
    pub fn cleanup_jobs(&mut self) {
        let mut i = 0;
        while i < self.jobs.len() {
            self.jobs[i].poll();
            if self.jobs[i].is_finished() {
                let mut job = self.jobs.remove(i);
                eprintln!("[{}] Done {}", i + 1, job.description());
                let failures = job.take_failures();
                self.report(&failures);
            } else {
                i += 1;
            }
        }
    }

    /// Job number from a `fg`/`bg` argument, or the newest job matching
    /// `want` when there is none.
    pub fn job_number(&self, arg: Option<&str>, want: impl Fn(&Job) -> bool) -> Result<usize> {
        match arg {
            Some(text) => {
                let n: usize = text
                    .trim_start_matches('%')
                    .parse()
                    .map_err(|_| ShellError::usage("Invalid job number!"))?;
                match n.checked_sub(1).and_then(|i| self.jobs.get(i)) {
                    Some(job) if want(job) => Ok(n),
                    _ => Err(ShellError::usage("Invalid job number!")),
                }
            }
            None => self
                .jobs
                .iter()
                .rposition(want)
                .map(|i| i + 1)
                .ok_or_else(|| ShellError::usage("No current job!")),
        }
    }

    /// Bring job `n` to the foreground and wait for it.
    pub fn foreground(&mut self, n: usize) -> Result<ExitStatus> {
        let index = n - 1;
        let mut job = self.jobs.remove(index);
        eprintln!("{}", job.description());
        if let (Some(fd), Some(leader)) = (self.terminal.job_control().tty, job.leader()) {
            give_terminal(fd, leader);
        }
        if job.is_paused()
            && let Err(e) = job.resume(false)
        {
            self.terminal.reclaim();
            self.jobs.insert(index, job);
            return Err(e);
        }
        let status = job.wait_for_finish();
        self.terminal.reclaim();
        let mut discard = String::new();
        Ok(self.finish_foreground(job, status, &mut discard))
    }

    /// Let suspended job `n` continue in the background.
    pub fn background(&mut self, n: usize) -> Result<()> {
        let job = &mut self.jobs[n - 1];
        job.resume(true)?;
        eprintln!("[{n}] {} &", job.description());
        Ok(())
    }

    /// Replace the process with `argv`. Only returns on failure, with the
    /// terminal taken back.
    pub fn exec(&mut self, argv: &[String]) -> Result<()> {
        let Some(name) = argv.first() else {
            return Err(ShellError::usage("exec: missing command"));
        };
        let path = if name.contains('/') {
            PathBuf::from(name)
        } else {
            self.state
                .executables
                .lookup(name)
                .ok_or_else(|| ShellError::CommandNotFound {
                    name: name.clone(),
                    suggestion: None,
                })?
        };
        self.save_history();
        self.terminal.release();
        let error = std::process::Command::new(&path)
            .arg0(name)
            .args(&argv[1..])
            .exec();
        self.terminal.reacquire();
        Err(ShellError::Spawn {
            command: name.clone(),
            source: error,
        })
    }

    /// Run the lines of `path`. With `args`, they become `${1}`... for the
    /// duration of the script.
    pub fn source(&mut self, path: &Path, args: &[String], mode: EvaluationMode) -> Result<LineResult> {
        let canonical = std::fs::canonicalize(path).map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })?;
        if !self.sourcing.insert(canonical.clone()) {
            return Err(ShellError::RecursiveSource(path.to_path_buf()));
        }
        let result = self.source_lines(path, &canonical, args, mode);
        self.sourcing.remove(&canonical);
        result
    }

    fn source_lines(
        &mut self,
        path: &Path,
        canonical: &Path,
        args: &[String],
        mode: EvaluationMode,
    ) -> Result<LineResult> {
        let content = std::fs::read_to_string(canonical).map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })?;

        let previous_source = std::env::var_os("JOBSH_SOURCE");
        environ::set("JOBSH_SOURCE", canonical);
        let saved_positional = (!args.is_empty()).then(|| {
            let mut positional = vec![path.display().to_string()];
            positional.extend(args.iter().cloned());
            std::mem::replace(&mut self.state.positional, positional)
        });

        let mut result = LineResult::default();
        for (line_no, line) in logical_lines(&content) {
            self.frames.push(SourceFrame {
                path: path.to_path_buf(),
                line: line_no,
            });
            match self.run_line(&line, mode) {
                Ok(r) => {
                    result.status = r.status;
                    result.output.push_str(&r.output);
                }
                Err(e) => {
                    self.report(&[e.to_string()]);
                    result.status = error_status(&e);
                }
            }
            self.frames.pop();
            if self.exit_code.is_some() {
                break;
            }
        }

        if let Some(positional) = saved_positional {
            self.state.positional = positional;
        }
        match previous_source {
            Some(value) => environ::set("JOBSH_SOURCE", value),
            None => environ::unset("JOBSH_SOURCE"),
        }
        Ok(result)
    }

    pub fn completion_snapshot(&self) -> Snapshot {
        Snapshot {
            executables: self.state.executables.snapshot(),
            aliases: self.state.aliases.keys().cloned().collect(),
            builtins: self
                .state
                .builtins
                .names()
                .chain([CALL])
                .map(String::from)
                .collect(),
            ignore: self.state.options.ignore_filenames.clone(),
        }
    }

    fn is_command_name(&self, name: &str) -> bool {
        name == CALL
            || self.state.builtins.get(name).is_some()
            || self.state.executables.lookup(name).is_some()
            || (name.contains('/') && is_executable(Path::new(name)))
    }
}

/// Exit status reported for a line that failed before running.
fn error_status(error: &ShellError) -> ExitStatus {
    match error.kind() {
        ErrorKind::Syntax => ExitStatus::finished(2),
        _ => ExitStatus::finished(1),
    }
}

/// Script lines with `\`-continuations joined, numbered by their first line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending = String::new();
    let mut start = 0;
    for (i, line) in content.lines().enumerate() {
        if pending.is_empty() {
            start = i + 1;
        }
        match line.strip_suffix('\\') {
            Some(head) => pending.push_str(head),
            None => {
                pending.push_str(line);
                out.push((start, std::mem::take(&mut pending)));
            }
        }
    }
    if !pending.is_empty() {
        out.push((start, pending));
    }
    out
}

fn run_builtin(builtin: &dyn Builtin, mut invocation: Invocation<'_>) -> StageOutcome {
    let result = builtin.run(&mut invocation);
    let _ = invocation.streams.stdout.flush();
    let _ = invocation.streams.stderr.flush();
    StageOutcome::from_result(result)
}

fn run_script(engine: &SharedEngine, call: &ScriptCall, io: StageIo) -> StageOutcome {
    let mut guard = match engine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let streams = io.into_streams();
    match call.run(&mut **guard, streams.stdin, streams.stdout, streams.stderr) {
        Ok(value) => StageOutcome {
            code: 0,
            value: Some(engine::stringify(&value)).filter(|s| !s.is_empty()),
            failure: None,
        },
        Err(e) => StageOutcome::from_result(Err(e)),
    }
}

impl StageRunner for SystemShell {
    fn run_inline(&mut self, command: &Command, io: StageIo) -> StageOutcome {
        match command.kind() {
            Some(CommandKind::Builtin(builtin)) => {
                let builtin = Arc::clone(builtin);
                let mode = self.mode;
                let invocation = Invocation {
                    argv: command.argv(),
                    streams: io.into_streams(),
                    shell: ShellAccess::Attached(self),
                    mode,
                };
                run_builtin(builtin.as_ref(), invocation)
            }
            Some(CommandKind::Script(call)) => run_script(&self.engine, call, io),
            _ => StageOutcome::default(),
        }
    }

    fn detach(&mut self, command: &Command) -> Box<dyn FnOnce(StageIo) -> StageOutcome + Send> {
        match command.kind() {
            Some(CommandKind::Builtin(builtin)) => {
                let builtin = Arc::clone(builtin);
                let argv = command.argv().to_vec();
                let mut state = self.state.clone();
                let mode = self.mode;
                Box::new(move |io| {
                    let invocation = Invocation {
                        argv: &argv,
                        streams: io.into_streams(),
                        shell: ShellAccess::Detached(&mut state),
                        mode,
                    };
                    run_builtin(builtin.as_ref(), invocation)
                })
            }
            Some(CommandKind::Script(call)) => {
                let engine = Arc::clone(&self.engine);
                let call = call.clone();
                Box::new(move |io| run_script(&engine, &call, io))
            }
            _ => Box::new(|_| StageOutcome::default()),
        }
    }
}

impl Expand for SystemShell {
    /// Environment first, then the script engine's variables.
    fn variable(&self, name: &str) -> Option<String> {
        if let Some(value) = std::env::var_os(name) {
            return Some(value.to_string_lossy().into_owned());
        }
        let engine = self.engine.try_lock().ok()?;
        engine
            .local_variables()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn positional(&self) -> &[String] {
        &self.state.positional
    }

    /// `$(line)`: run it capturing stdout; trailing newlines are dropped.
    /// An `exit` inside only ends the substitution.
    fn substitute(&mut self, line: &str) -> Result<String> {
        let saved_exit = self.exit_code.take();
        let result = self.run_line(line, EvaluationMode::CommandSubstitution);
        self.exit_code = saved_exit;
        Ok(result?.output.trim_end_matches('\n').to_string())
    }
}

impl Shell for SystemShell {
    /// Checks the command word of every stage without running anything.
    fn is_valid_command(&mut self, line: &str) -> bool {
        let Ok(chains) = split_chains(line) else {
            return false;
        };
        for chain in &chains {
            let Ok(groups) = split_groups(&chain.words) else {
                return false;
            };
            for group in &groups {
                let Ok(stages) = split_pipeline(&group.words) else {
                    return false;
                };
                for stage in &stages {
                    let Some(first) = stage.words.first() else {
                        continue;
                    };
                    if first.starts_with("$(") || self.state.aliases.contains_key(first) {
                        continue;
                    }
                    let words = resolve_aliases(
                        &stage.words,
                        &self.state.aliases,
                        &self.state.options.prefix_commands,
                    );
                    let Some(head) = words.first() else {
                        continue;
                    };
                    let Ok(argv) = interpolate(head, EvaluationMode::Trial, self) else {
                        return false;
                    };
                    match argv.first() {
                        Some(name) if self.is_command_name(name) => {}
                        _ => return false,
                    }
                }
            }
        }
        true
    }

    fn try_command(&mut self, line: &str) -> bool {
        self.is_valid_command(line) && self.run(line).is_success()
    }

    fn run(&mut self, line: &str) -> ExitStatus {
        self.cleanup_jobs();
        match self.run_line(line, EvaluationMode::Direct) {
            Ok(result) => result.status,
            Err(e) => {
                self.report(&[e.to_string()]);
                self.last_status = error_status(&e);
                self.last_status
            }
        }
    }

    fn gen_completions(&self, context: &str, prefix: &str) -> Vec<String> {
        completion::complete(&self.completion_snapshot(), context, prefix)
    }
}

impl Drop for SystemShell {
    fn drop(&mut self) {
        self.save_history();
        if self.interactive {
            log::info!("session end");
        }
    }
}
