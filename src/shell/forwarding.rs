//! Shell that hands every line to another shell.

use std::path::PathBuf;

use crate::job::ExitStatus;
use crate::parse::split_words;

use super::Shell;
use super::completion;
use super::executables::{Table, is_executable};

/// Runs lines with `$SHELL -c` (or `/bin/sh`); offers only file completion.
#[derive(Debug)]
pub struct ForwardingShell {
    program: PathBuf,
    executables: Table,
    ignore: Vec<glob::Pattern>,
}

impl ForwardingShell {
    pub fn new(ignore: Vec<glob::Pattern>) -> Self {
        let program = std::env::var_os("SHELL")
            .map(PathBuf::from)
            .filter(|p| is_executable(p))
            .unwrap_or_else(|| PathBuf::from("/bin/sh"));
        let path = std::env::var_os("PATH").unwrap_or_default();
        ForwardingShell {
            program,
            executables: Table::build(&path, &[]),
            ignore,
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl Shell for ForwardingShell {
    fn is_valid_command(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return true;
        }
        let Ok(words) = split_words(line) else {
            return false;
        };
        match words.first() {
            Some(name) if name.contains('/') => is_executable(std::path::Path::new(name)),
            Some(name) => self.executables.lookup(name).is_some(),
            None => true,
        }
    }

    fn try_command(&mut self, line: &str) -> bool {
        self.is_valid_command(line) && self.run(line).is_success()
    }

    fn run(&mut self, line: &str) -> ExitStatus {
        match std::process::Command::new(&self.program)
            .arg("-c")
            .arg(line)
            .status()
        {
            Ok(status) => match status.code() {
                Some(code) => ExitStatus::finished(code),
                None => {
                    use std::os::unix::process::ExitStatusExt;
                    ExitStatus::aborted(status.signal().unwrap_or(0))
                }
            },
            Err(e) => {
                eprintln!("{}: {e}", self.program.display());
                ExitStatus::finished(127)
            }
        }
    }

    fn gen_completions(&self, _context: &str, prefix: &str) -> Vec<String> {
        completion::filenames(prefix, &self.ignore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_exit_status() {
        let mut shell = ForwardingShell {
            program: PathBuf::from("/bin/sh"),
            executables: Table::default(),
            ignore: Vec::new(),
        };
        assert!(shell.run("true").is_success());
        assert_eq!(shell.run("exit 3"), ExitStatus::finished(3));
    }

    #[test]
    fn blank_lines_are_valid() {
        let mut shell = ForwardingShell::new(Vec::new());
        assert!(shell.is_valid_command(""));
        assert!(shell.is_valid_command("# note"));
        assert!(!shell.is_valid_command("definitely-not-a-command-xyz"));
    }
}
