//! Commands implemented inside the shell.
//!
//! A builtin that is the whole foreground pipeline runs on the shell's
//! thread with full access to the shell. Inside a larger pipeline or in the
//! background it runs on a worker thread against a copy of the shell state,
//! so its changes do not outlive the stage. Builtins that must change the
//! shell itself (`cd`, `fg`, `exit`, ...) refuse to run that way.

mod alias;
mod dirs;
mod env;
mod help;
mod jobs;
mod options;
mod script;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use crate::error::{Result, ShellError};
use crate::job::{EvaluationMode, Streams};
use crate::shell::{ShellState, SystemShell};

/// Name of the script-function call stage. Resolved before builtins and
/// run by the script engine, so it is not in the registry.
pub const CALL: &str = "call";

pub trait Builtin: Send + Sync {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32>;

    /// One-line synopsis.
    fn usage(&self) -> &'static str;

    /// What the builtin does, shown by `help <name>`.
    fn summary(&self) -> &'static str;
}

/// How much of the shell a running builtin can reach.
pub enum ShellAccess<'a> {
    /// Running on the shell's thread.
    Attached(&'a mut SystemShell),
    /// Running on a worker thread with its own copy of the state.
    Detached(&'a mut ShellState),
}

/// One run of a builtin.
pub struct Invocation<'a> {
    pub argv: &'a [String],
    pub streams: Streams,
    pub shell: ShellAccess<'a>,
    pub mode: EvaluationMode,
}

impl<'a> Invocation<'a> {
    pub fn name(&self) -> &'a str {
        self.argv.first().map_or("", |s| s.as_str())
    }

    pub fn args(&self) -> &'a [String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    pub fn state(&mut self) -> &mut ShellState {
        match &mut self.shell {
            ShellAccess::Attached(shell) => shell.state_mut(),
            ShellAccess::Detached(state) => &mut **state,
        }
    }

    /// The live shell, or an error when running detached.
    pub fn shell(&mut self) -> Result<&mut SystemShell> {
        let name = self.name();
        match &mut self.shell {
            ShellAccess::Attached(shell) => Ok(&mut **shell),
            ShellAccess::Detached(_) => Err(ShellError::usage(format!(
                "{name}: cannot run in a pipeline or in the background"
            ))),
        }
    }

    pub fn out(&mut self) -> &mut dyn Write {
        self.streams.stdout.as_mut()
    }

    /// Reject calls with fewer than `min` or more than `max` arguments.
    pub fn expect_args(&self, min: usize, max: usize) -> Result<&'a [String]> {
        let args = self.args();
        if args.len() < min {
            return Err(ShellError::usage(format!("{}: missing argument", self.name())));
        }
        if args.len() > max {
            return Err(ShellError::usage(format!("{}: too many arguments", self.name())));
        }
        Ok(args)
    }
}

/// Stage whose words all expanded to nothing; only its redirections act.
#[derive(Debug)]
pub struct Noop;

impl Builtin for Noop {
    fn run(&self, _inv: &mut Invocation<'_>) -> Result<i32> {
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        ""
    }

    fn summary(&self) -> &'static str {
        ""
    }
}

/// Builtins by name. Fixed once the shell starts.
pub struct Registry {
    builtins: BTreeMap<&'static str, Arc<dyn Builtin>>,
}

impl Registry {
    pub fn standard() -> Self {
        let entries: [(&'static str, Arc<dyn Builtin>); 18] = [
            ("alias", Arc::new(alias::Alias)),
            ("unalias", Arc::new(alias::Unalias)),
            ("cd", Arc::new(dirs::Cd)),
            ("dirs", Arc::new(dirs::Dirs)),
            ("setenv", Arc::new(env::Setenv)),
            ("unsetenv", Arc::new(env::Unsetenv)),
            ("bindkey", Arc::new(options::Bindkey)),
            ("rehash", Arc::new(options::Rehash)),
            ("setopt", Arc::new(options::Setopt)),
            ("history", Arc::new(options::History)),
            ("jobs", Arc::new(jobs::Jobs)),
            ("bg", Arc::new(jobs::Bg)),
            ("fg", Arc::new(jobs::Fg)),
            ("source", Arc::new(script::Source)),
            ("eval", Arc::new(script::Eval)),
            ("exec", Arc::new(script::Exec)),
            ("exit", Arc::new(script::Exit)),
            ("help", Arc::new(help::Help)),
        ];
        Registry {
            builtins: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(name).cloned()
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.builtins.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Arc<dyn Builtin>)> {
        self.builtins.iter().map(|(k, v)| (*k, v))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.builtins.keys()).finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Run builtins against a detached state and collect their output.

    use super::*;
    use std::io::{self, Read};
    use std::sync::Mutex;

    use crate::config::Config;

    #[derive(Clone, Default)]
    pub struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub fn state() -> ShellState {
        ShellState::from_config(&Config::default_config())
    }

    /// Run `line` (split on spaces) as a detached builtin; returns the
    /// result and stdout.
    pub fn run(state: &mut ShellState, line: &str) -> (Result<i32>, String) {
        let argv: Vec<String> = line.split_whitespace().map(String::from).collect();
        let registry = Registry::standard();
        let builtin = registry.get(&argv[0]).unwrap();
        let out = Sink::default();
        let stdin: Box<dyn Read + Send> = Box::new(io::empty());
        let mut inv = Invocation {
            argv: &argv,
            streams: Streams {
                terminal: false,
                stdin,
                stdout: Box::new(out.clone()),
                stderr: Box::new(io::sink()),
            },
            shell: ShellAccess::Detached(state),
            mode: EvaluationMode::Direct,
        };
        let result = builtin.run(&mut inv);
        (result, out.text())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn registry_has_every_builtin() {
        let names: Vec<&str> = Registry::standard().names().collect();
        for name in [
            "cd", "alias", "unalias", "setenv", "unsetenv", "bindkey", "dirs", "rehash",
            "setopt", "history", "jobs", "bg", "fg", "source", "eval", "exec", "exit", "help",
        ] {
            assert!(names.contains(&name), "{name}");
        }
        assert!(!names.contains(&CALL));
    }

    #[test]
    fn detached_cannot_reach_shell() {
        let mut s = state();
        let (result, _) = run(&mut s, "fg");
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "fg: cannot run in a pipeline or in the background");
    }

    #[test]
    fn argument_counts() {
        let mut s = state();
        let (result, _) = run(&mut s, "rehash now");
        assert_eq!(result.unwrap_err().to_string(), "rehash: too many arguments");
    }
}
