//! Mutable shell state that builtins read and change.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builtins::Registry;
use crate::config::Config;

use super::executables::ExecutableIndex;
use super::history::History;

/// Options changed with `setopt`.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Glob patterns of file names hidden from completion.
    pub ignore_filenames: Vec<glob::Pattern>,
    /// Directories holding administrative commands.
    pub super_user_paths: Vec<PathBuf>,
    /// Commands after which the next word is alias-expanded too.
    pub prefix_commands: Vec<String>,
    /// Print each expanded stage before it runs.
    pub trace: bool,
}

/// What a key is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// A line-editor action, by name.
    Internal(String),
    /// A command line run by the shell.
    System(String),
}

impl KeyAction {
    pub fn describe(&self) -> String {
        match self {
            KeyAction::Internal(action) => format!("--internal {action}"),
            KeyAction::System(line) => line.clone(),
        }
    }
}

/// Everything a builtin may need, cloneable so a builtin running on a
/// worker thread can get its own copy.
#[derive(Debug, Clone)]
pub struct ShellState {
    pub aliases: HashMap<String, Vec<String>>,
    /// Visited directories, oldest first.
    pub dir_stack: Vec<PathBuf>,
    pub previous_dir: Option<PathBuf>,
    pub key_bindings: BTreeMap<String, KeyAction>,
    pub options: Options,
    pub history: History,
    /// `${0}`, `${1}`, ...
    pub positional: Vec<String>,
    pub executables: Arc<ExecutableIndex>,
    pub builtins: Arc<Registry>,
}

impl ShellState {
    pub fn from_config(config: &Config) -> Self {
        let mut state = ShellState {
            aliases: HashMap::new(),
            dir_stack: Vec::new(),
            previous_dir: None,
            key_bindings: BTreeMap::new(),
            options: Options {
                ignore_filenames: Vec::new(),
                super_user_paths: config.paths.super_user.iter().map(expand_path).collect(),
                prefix_commands: config.prefix.commands.clone(),
                trace: config.settings.trace,
            },
            history: History::new(
                Some(expand_path(&config.settings.history_path)),
                config.settings.history_max_size,
            ),
            positional: Vec::new(),
            executables: Arc::new(ExecutableIndex::new()),
            builtins: Arc::new(Registry::standard()),
        };
        for pattern in &config.filenames.ignore {
            state.add_ignore_pattern(pattern);
        }
        for (name, line) in &config.aliases {
            match shlex::split(line) {
                Some(words) => {
                    state.aliases.insert(name.clone(), words);
                }
                None => log::warn!("config: alias {name}: unbalanced quotes"),
            }
        }
        for (key, line) in &config.keys {
            state
                .key_bindings
                .insert(key.clone(), KeyAction::System(line.clone()));
        }
        state
    }

    /// Rebuild the executable index from the current `PATH`.
    pub fn rehash(&self) {
        let path = std::env::var_os("PATH").unwrap_or_default();
        self.executables
            .rebuild(&path, &self.options.super_user_paths);
    }

    /// Record a directory change on the stack, moving a revisited
    /// directory to the top.
    pub fn push_dir(&mut self, dir: PathBuf) {
        self.dir_stack.retain(|d| d != &dir);
        self.dir_stack.push(dir);
    }

    /// Stack entry `n`, counting from the newest (0).
    pub fn dir_at(&self, n: usize) -> Option<&Path> {
        let len = self.dir_stack.len();
        n.checked_add(1)
            .and_then(|k| len.checked_sub(k))
            .map(|i| self.dir_stack[i].as_path())
    }

    pub fn add_ignore_pattern(&mut self, pattern: &str) -> bool {
        match glob::Pattern::new(pattern) {
            Ok(p) => {
                self.options.ignore_filenames.push(p);
                true
            }
            Err(e) => {
                log::warn!("ignore pattern {pattern:?}: {e}");
                false
            }
        }
    }

    /// Names a mistyped command may have meant.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.aliases.keys().cloned().collect();
        names.extend(self.builtins.names().map(String::from));
        names.extend(self.executables.snapshot().names().map(String::from));
        names.sort();
        names.dedup();
        names
    }
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(path: impl AsRef<str>) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path.as_ref()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ShellState {
        ShellState::from_config(&Config::default_config())
    }

    #[test]
    fn aliases_from_config_are_split() {
        let s = state();
        assert_eq!(
            s.aliases.get("ll"),
            Some(&vec!["ls".to_string(), "-l".to_string()])
        );
    }

    #[test]
    fn revisited_dir_moves_to_top() {
        let mut s = state();
        s.push_dir("/a".into());
        s.push_dir("/b".into());
        s.push_dir("/a".into());
        assert_eq!(s.dir_stack, vec![PathBuf::from("/b"), PathBuf::from("/a")]);
        assert_eq!(s.dir_at(0), Some(Path::new("/a")));
        assert_eq!(s.dir_at(1), Some(Path::new("/b")));
        assert_eq!(s.dir_at(2), None);
        assert_eq!(s.dir_at(usize::MAX), None);
    }

    #[test]
    fn bad_ignore_pattern_rejected() {
        let mut s = state();
        let before = s.options.ignore_filenames.len();
        assert!(!s.add_ignore_pattern("[unclosed"));
        assert_eq!(s.options.ignore_filenames.len(), before);
    }

    #[test]
    fn command_names_include_builtins() {
        let names = state().command_names();
        assert!(names.iter().any(|n| n == "cd"));
        assert!(names.iter().any(|n| n == "ll"));
    }
}
