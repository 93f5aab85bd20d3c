//! The shell: capability interface and its implementations.

pub mod completion;
pub mod environ;
pub mod executables;
pub mod forwarding;
pub mod history;
pub mod state;
pub mod system;
pub mod terminal;

pub use forwarding::ForwardingShell;
pub use state::{KeyAction, Options, ShellState};
pub use system::{LineResult, SystemShell};
pub use terminal::Terminal;

use crate::job::ExitStatus;

/// What a line editor front end needs from a shell.
pub trait Shell {
    /// Whether `line` looks like something this shell can run. Never
    /// spawns anything.
    fn is_valid_command(&mut self, line: &str) -> bool;

    /// Run `line` if it is a valid command; returns whether it ran and
    /// succeeded.
    fn try_command(&mut self, line: &str) -> bool;

    fn run(&mut self, line: &str) -> ExitStatus;

    /// Completion candidates for `prefix`, where `context` is the line
    /// before it.
    fn gen_completions(&self, context: &str, prefix: &str) -> Vec<String>;
}
